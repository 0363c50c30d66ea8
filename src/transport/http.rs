use crate::client::ClientConfig;
use crate::transport::{ResponseMeta, CLIENT_REQUEST_ID_HEADER};
use crate::{Error, ErrorContext, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Proxy};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Performs exactly one HTTP attempt per call.
///
/// Non-success statuses are turned into [`Error::Api`] with the response
/// metadata attached, so the retry layer can inspect status and headers.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        // The overall timeout is applied per buffered request in `execute`;
        // a client-wide one would also cut off long-lived SSE bodies.
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy url: {}", e),
                    ErrorContext::new()
                        .with_field_path("proxy_url")
                        .with_source("http_transport"),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            Error::configuration_with_context(
                format!("failed to build HTTP client: {}", e),
                ErrorContext::new().with_source("http_transport"),
            )
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Default headers (JSON content type and bearer auth) merged with `extra`.
    pub fn build_headers(&self, extra: Option<&HeaderMap>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|_| {
            Error::configuration_with_context(
                "API key contains characters not allowed in a header",
                ErrorContext::new()
                    .with_field_path("api_key")
                    .with_source("http_transport"),
            )
        })?;
        headers.insert(AUTHORIZATION, auth);
        if let Some(extra) = extra {
            for (name, value) in extra {
                headers.insert(name.clone(), value.clone());
            }
        }
        Ok(headers)
    }

    /// Execute one attempt and return the successful response.
    ///
    /// When `stream` is set the body is left unread for the caller and no
    /// overall timeout is applied.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        headers: Option<&HeaderMap>,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let url = self.build_url(path);
        let client_request_id = Uuid::new_v4().to_string();

        let mut headers = self.build_headers(headers)?;
        if let Ok(v) = HeaderValue::from_str(&client_request_id) {
            headers.insert(CLIENT_REQUEST_ID_HEADER, v);
        }
        if stream {
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        }

        let mut req = self.client.request(method.clone(), &url).headers(headers);
        if let Some(body) = body {
            req = req.json(body);
        }
        if !stream {
            req = req.timeout(self.timeout);
        }

        let start = Instant::now();
        let resp = req.send().await.map_err(Error::from_reqwest)?;
        let meta = ResponseMeta::from_response(&resp);

        debug!(
            method = method.as_str(),
            endpoint = path,
            http_status = meta.status.as_u16(),
            client_request_id = client_request_id.as_str(),
            duration_ms = start.elapsed().as_millis() as u64,
            "langbase request completed"
        );

        if !meta.status.is_success() {
            let text = match resp.text().await {
                Ok(text) => text,
                Err(e) => {
                    debug!(endpoint = path, error = %e, "failed to read error response body");
                    format!("status code (body could not be read: {e})")
                }
            };
            return Err(Error::from_response(meta, &text, Some(path)));
        }

        Ok(resp)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
