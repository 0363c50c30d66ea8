//! Mock HTTP server setup for integration tests

#![allow(dead_code)]

use langbase::{Client, ClientBuilder, RetryConfig};
use mockito::{Mock, Server, ServerGuard};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const API_KEY: &str = "test-api-key";

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: ServerGuard,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        init_tracing();
        let server = Server::new_async().await;
        let base_url = server.url();
        Self { server, base_url }
    }

    /// Builder pointed at the mock server with millisecond, jitter-free retries.
    pub fn builder(&self) -> ClientBuilder {
        Client::builder()
            .api_key(API_KEY)
            .base_url(&self.base_url)
            .timeout(Duration::from_secs(5))
            .retry_config(fast_retry(3))
    }

    pub fn client(&self) -> Client {
        self.builder().build().expect("client")
    }

    /// Mock an SSE response; each chunk becomes one `data:` event.
    pub async fn mock_sse_stream(&mut self, path: &str, thread_id: &str, chunks: &[&str]) -> Mock {
        let body = chunks
            .iter()
            .map(|chunk| {
                if chunk.starts_with("data:") {
                    format!("{}\n\n", chunk)
                } else {
                    format!("data: {}\n\n", chunk)
                }
            })
            .collect::<String>();

        self.server
            .mock("POST", path)
            .match_header("authorization", format!("Bearer {API_KEY}").as_str())
            .match_header("accept", "text/event-stream")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_header("lb-thread-id", thread_id)
            .with_body(body)
            .create_async()
            .await
    }

    pub async fn mock_json(&mut self, method: &str, path: &str, status: usize, body: &str) -> Mock {
        self.server
            .mock(method, path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }
}

/// Route library logs through the test harness; `RUST_LOG=langbase=debug` shows retries.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fast_retry(attempts: u32) -> RetryConfig {
    RetryConfig::new()
        .with_max_attempts(attempts)
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(10))
        .with_jitter(false)
}

pub fn content_chunk(text: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": text}}]
    })
    .to_string()
}

pub fn finish_chunk(reason: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "delta": {}, "finish_reason": reason}]
    })
    .to_string()
}
