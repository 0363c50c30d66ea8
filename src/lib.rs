//! # langbase
//!
//! Resilient HTTP and Server-Sent-Events core for the Langbase AI platform.
//!
//! ## Overview
//!
//! The crate treats the remote platform as an opaque HTTP/SSE endpoint. It
//! focuses on the parts that are hard to get right in every caller:
//!
//! - **Retries**: fixed, linear, exponential and fibonacci backoff with jitter
//!   and `Retry-After` support
//! - **Circuit breaking**: a per-client breaker that fails fast while the
//!   upstream is unhealthy
//! - **Streaming**: SSE framing, chunk decoding, text collection and a typed
//!   event runner with handler registration
//! - **Tool calls**: reassembly of tool-call arguments fragmented across chunks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use langbase::{Client, RunResponse, StreamEventKind, StreamEvent};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> langbase::Result<()> {
//!     let client = Client::builder().api_key("your-api-key").build()?;
//!
//!     let response = client
//!         .run(
//!             "/v1/pipes/run",
//!             json!({
//!                 "name": "summary-agent",
//!                 "stream": true,
//!                 "messages": [{"role": "user", "content": "Hello!"}],
//!             }),
//!         )
//!         .await?;
//!
//!     if let RunResponse::Streaming(stream) = response {
//!         let mut runner = langbase::get_typed_runner(stream);
//!         runner.on(StreamEventKind::Content, |event| {
//!             if let StreamEvent::Content { content } = event {
//!                 print!("{content}");
//!             }
//!         });
//!         runner.process().await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`resilience`] | Backoff calculation, circuit breaker, retry executor |
//! | [`transport`] | Single-attempt HTTP transport and response metadata |
//! | [`client`] | Client facade, builder and run responses |
//! | [`pipeline`] | SSE decoding, text collection, typed runner, tool-call assembly |
//! | [`types`] | Stream chunks, events and tool calls |
//! | [`workflow`] | Step runner with timeouts and retries |

pub mod client;
pub mod error;
pub mod pipeline;
pub mod resilience;
pub mod transport;
pub mod types;

#[cfg(feature = "workflow")]
pub mod workflow;

// Re-export main types for convenience
pub use client::{Client, ClientBuilder, ClientConfig, ResponseMode, RunResponse, RunStream};
pub use error::{Error, ErrorContext, ErrorKind};
pub use pipeline::accumulate::{get_tools_from_run, get_tools_from_run_stream, get_tools_from_stream};
pub use pipeline::decode::parse_chunk;
pub use pipeline::runner::{get_typed_runner, TypedRunner};
pub use pipeline::text::{collect_stream_text, get_text_part, stream_text};
pub use pipeline::StreamProcessor;
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ResilienceConfig, ResilientRequest,
    RetryCalculator, RetryConfig, RetryStrategy,
};
pub use types::{
    chunk::{Choice, Delta, StreamChunk, ToolCallFragment},
    events::{StreamEvent, StreamEventKind},
    tool::{FunctionCall, ToolCall},
};

#[cfg(feature = "workflow")]
pub use workflow::{StepConfig, StepRetry, Workflow};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;
