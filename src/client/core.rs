use crate::client::builder::{ClientBuilder, ClientConfig};
use crate::client::types::{ResponseMode, RunResponse, RunStream};
use crate::resilience::ResilientRequest;
use crate::transport::{HttpTransport, ResponseMeta};
use crate::{Error, Result};
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Endpoints whose buffered responses carry a thread id and a `raw` payload.
pub const GENERATION_ENDPOINTS: &[&str] = &[
    "/v1/pipes/run",
    "/beta/chat",
    "/beta/generate",
    "/v1/agent/run",
];

/// Outcome of one successful attempt.
enum Fetched {
    Json(Value),
    Stream(reqwest::Response),
}

/// Client for the platform API.
///
/// Cloning is cheap; clones share the connection pool and the circuit breaker.
#[derive(Debug, Clone)]
pub struct Client {
    transport: Arc<HttpTransport>,
    resilience: Option<Arc<ResilientRequest>>,
    config: Arc<ClientConfig>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Client with the given key and every other setting from the environment or defaults.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        ClientBuilder::new().api_key(api_key).build()
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        let resilience = config.resilience.build().map(Arc::new);
        info!(
            base_url = transport.base_url(),
            resilience = resilience.is_some(),
            circuit_breaker = resilience
                .as_ref()
                .map(|r| r.circuit_breaker().is_some())
                .unwrap_or(false),
            "langbase client initialized"
        );
        Ok(Self {
            transport: Arc::new(transport),
            resilience,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The retry executor, when resilience is enabled.
    pub fn resilience(&self) -> Option<&ResilientRequest> {
        self.resilience.as_deref()
    }

    /// Send a request to `path`, retrying per the resilience configuration.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: Option<HeaderMap>,
        mode: ResponseMode,
    ) -> Result<RunResponse> {
        let stream = mode == ResponseMode::Streaming;
        let (transport, method, body, headers) =
            (&self.transport, &method, body.as_ref(), headers.as_ref());

        // One attempt covers reading and decoding a buffered body, so failures
        // mid-body are retried and reported to the breaker like send failures.
        let send = move |attempt: u32| async move {
            debug!(method = method.as_str(), endpoint = path, attempt, "sending request");
            let resp = transport
                .execute(method.clone(), path, body, headers, stream)
                .await?;
            let meta = ResponseMeta::from_response(&resp);
            if stream {
                return Ok::<_, Error>((meta, Fetched::Stream(resp)));
            }
            let text = resp.text().await.map_err(Error::from_reqwest)?;
            let value = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text)?
            };
            Ok::<_, Error>((meta, Fetched::Json(value)))
        };

        let (meta, fetched) = match &self.resilience {
            Some(resilience) => resilience.execute(path, send).await?,
            None => send(1).await?,
        };

        match fetched {
            Fetched::Stream(resp) => {
                let body = resp.bytes_stream().map(|r| r.map_err(Error::from_reqwest));
                Ok(RunResponse::Streaming(RunStream::from_body(
                    body,
                    meta.thread_id(),
                    meta.headers,
                )))
            }
            Fetched::Json(value) if is_generation_endpoint(path) => Ok(RunResponse::Buffered(
                merge_run_response(value, meta.thread_id()),
            )),
            Fetched::Json(value) => Ok(RunResponse::Buffered(value)),
        }
    }

    async fn json(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let resp = self
            .request(method, path, body, None, ResponseMode::Buffered)
            .await?;
        Ok(resp.into_json().unwrap_or(Value::Null))
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.json(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.json(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value> {
        self.json(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.json(Method::DELETE, path, None).await
    }

    /// POST a run body; streams when the body sets `"stream": true`.
    pub async fn run(&self, path: &str, body: Value) -> Result<RunResponse> {
        let mode = ResponseMode::from_body(&body);
        self.request(Method::POST, path, Some(body), None, mode).await
    }
}

pub(crate) fn is_generation_endpoint(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');
    GENERATION_ENDPOINTS.contains(&path)
}

/// Lift the fields of a nested `raw` object to the top level (existing
/// top-level keys win) and attach `threadId`.
pub(crate) fn merge_run_response(value: Value, thread_id: Option<String>) -> Value {
    let mut map = match value {
        Value::Object(map) => map,
        other => return other,
    };
    if let Some(Value::Object(raw)) = map.remove("raw") {
        for (key, val) in raw {
            map.entry(key).or_insert(val);
        }
    }
    if let Some(thread_id) = thread_id {
        map.insert("threadId".to_string(), Value::String(thread_id));
    }
    Value::Object(map)
}
