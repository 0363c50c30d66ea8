//! # Streaming Pipeline
//!
//! Turns the SSE body of a run into text, typed events or tool calls.
//!
//! ```text
//! Raw Bytes → sse_lines → parse_chunk → StreamChunk ─┬─ text: stream_text / collect_stream_text
//!                                                    ├─ events: TypedRunner
//!                                                    └─ tools: ToolCallAccumulator
//! ```
//!
//! All consumers are pull-based: nothing happens unless the caller polls.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`decode`] | SSE line framing and [`parse_chunk`](decode::parse_chunk) |
//! | [`text`] | Text extraction and collection |
//! | [`accumulate`] | Tool-call reassembly |
//! | [`runner`] | [`TypedRunner`](runner::TypedRunner) event dispatch |

pub mod accumulate;
pub mod decode;
pub mod runner;
pub mod text;

#[cfg(test)]
mod tests;

use crate::client::RunStream;
use crate::types::chunk::StreamChunk;
use crate::types::tool::ToolCall;
use crate::{BoxStream, Result};
use bytes::Bytes;
use futures::{future, Stream, StreamExt};

/// Convenience wrapper over a line stream offering each way of consuming it.
///
/// Every method consumes the processor: the underlying stream can be read
/// only once.
pub struct StreamProcessor<'a> {
    lines: BoxStream<'a, Bytes>,
}

impl<'a> StreamProcessor<'a> {
    pub fn new<S>(lines: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'a,
    {
        Self {
            lines: Box::pin(lines),
        }
    }

    /// Parsed chunks in arrival order. Undecodable lines are skipped,
    /// transport errors are passed through.
    pub fn process_chunks(self) -> BoxStream<'a, StreamChunk> {
        Box::pin(self.lines.filter_map(|item| {
            future::ready(match item {
                Ok(line) => decode::parse_chunk(&line).map(Ok),
                Err(e) => Some(Err(e)),
            })
        }))
    }

    pub fn text(self) -> BoxStream<'a, String> {
        text::stream_text(self.lines)
    }

    pub async fn collect_text(self) -> Result<String> {
        text::collect_stream_text(self.lines).await
    }

    pub async fn tool_calls(self) -> Result<Vec<ToolCall>> {
        accumulate::get_tools_from_stream(self.lines).await
    }
}

impl From<RunStream> for StreamProcessor<'static> {
    fn from(run: RunStream) -> Self {
        Self { lines: run.stream }
    }
}
