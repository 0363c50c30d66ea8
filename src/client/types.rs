use crate::pipeline::decode::sse_lines;
use crate::{BoxStream, Result};
use bytes::Bytes;
use futures::Stream;
use reqwest::header::HeaderMap;

/// How the response body of a request is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Read the whole body and decode it as JSON.
    #[default]
    Buffered,
    /// Hand the body back as a stream of SSE lines.
    Streaming,
}

impl ResponseMode {
    /// Mode requested by a run body's `stream` flag.
    pub fn from_body(body: &serde_json::Value) -> Self {
        match body.get("stream").and_then(|v| v.as_bool()) {
            Some(true) => ResponseMode::Streaming,
            _ => ResponseMode::Buffered,
        }
    }
}

/// Result of a request: a decoded JSON body or a live stream.
#[derive(Debug)]
pub enum RunResponse {
    Buffered(serde_json::Value),
    Streaming(RunStream),
}

impl RunResponse {
    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            RunResponse::Buffered(v) => Some(v),
            RunResponse::Streaming(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<RunStream> {
        match self {
            RunResponse::Buffered(_) => None,
            RunResponse::Streaming(s) => Some(s),
        }
    }
}

/// Body of a streaming run, one SSE line per item, plus response metadata.
pub struct RunStream {
    pub stream: BoxStream<'static, Bytes>,
    /// Value of the `lb-thread-id` response header.
    pub thread_id: Option<String>,
    pub headers: HeaderMap,
}

impl RunStream {
    /// Wrap a stream that already yields one line per item.
    pub fn new<S>(lines: S, thread_id: Option<String>) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            stream: Box::pin(lines),
            thread_id,
            headers: HeaderMap::new(),
        }
    }

    /// Wrap a raw body stream whose chunks are not aligned to lines.
    pub fn from_body<S>(body: S, thread_id: Option<String>, headers: HeaderMap) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            stream: sse_lines(body),
            thread_id,
            headers,
        }
    }
}

impl std::fmt::Debug for RunStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStream")
            .field("thread_id", &self.thread_id)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
