//! Transport layer: single-attempt HTTP execution and response metadata.
//!
//! Retry and circuit breaking are not handled here; see [`crate::resilience`].

pub mod http;

pub use http::HttpTransport;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;

/// Header carrying the conversation thread of a generation request.
pub const THREAD_ID_HEADER: &str = "lb-thread-id";
/// Header carrying the server-side request id.
pub const REQUEST_ID_HEADER: &str = "lb-request-id";
/// Correlation id we attach to every attempt.
pub const CLIENT_REQUEST_ID_HEADER: &str = "lb-client-request-id";

/// Status and headers of a response, detached from its body.
///
/// Header lookups are case-insensitive.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseMeta {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    pub fn from_response(resp: &reqwest::Response) -> Self {
        Self::new(resp.status(), resp.headers().clone())
    }

    /// Trimmed, non-empty value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Extract the first matching header value from a list of header names.
    pub fn header_first(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .find_map(|name| self.header(name))
            .map(str::to_string)
    }

    pub fn thread_id(&self) -> Option<String> {
        self.header(THREAD_ID_HEADER).map(str::to_string)
    }

    pub fn request_id(&self) -> Option<String> {
        self.header_first(&[REQUEST_ID_HEADER, "x-request-id"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("LB-Thread-Id", HeaderValue::from_static("thread_123"));
        headers.insert("Retry-After", HeaderValue::from_static(" 30 "));
        let meta = ResponseMeta::new(StatusCode::OK, headers);

        assert_eq!(meta.thread_id().as_deref(), Some("thread_123"));
        assert_eq!(meta.header("retry-after"), Some("30"));
        assert_eq!(meta.request_id(), None);
    }

    #[test]
    fn header_first_skips_blank_values() {
        let mut headers = HeaderMap::new();
        headers.insert("lb-request-id", HeaderValue::from_static("   "));
        headers.insert("x-request-id", HeaderValue::from_static("up_1"));
        let meta = ResponseMeta::new(StatusCode::OK, headers);

        assert_eq!(meta.request_id().as_deref(), Some("up_1"));
    }
}
