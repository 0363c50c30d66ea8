//! Plain-text consumption of a run stream.

use crate::pipeline::decode::parse_chunk;
use crate::types::chunk::StreamChunk;
use crate::{BoxStream, Result};
use bytes::Bytes;
use futures::{future, Stream, StreamExt};

/// Text content of the first choice's delta, or `""`.
pub fn get_text_part(chunk: &StreamChunk) -> &str {
    chunk
        .choices
        .first()
        .and_then(|c| c.delta.content.as_deref())
        .unwrap_or("")
}

/// Yield one text fragment per chunk that carries non-empty content.
///
/// Lines that do not decode are skipped. Transport errors are yielded as
/// `Err` items without ending the stream.
pub fn stream_text<'a, S>(lines: S) -> BoxStream<'a, String>
where
    S: Stream<Item = Result<Bytes>> + Send + 'a,
{
    Box::pin(lines.filter_map(|item| {
        future::ready(match item {
            Ok(line) => parse_chunk(&line)
                .map(|chunk| get_text_part(&chunk).to_string())
                .filter(|text| !text.is_empty())
                .map(Ok),
            Err(e) => Some(Err(e)),
        })
    }))
}

/// Concatenate all text fragments. Stops at the first transport error.
pub async fn collect_stream_text<S>(lines: S) -> Result<String>
where
    S: Stream<Item = Result<Bytes>> + Send,
{
    let mut text = stream_text(lines);
    let mut out = String::new();
    while let Some(part) = text.next().await {
        out.push_str(&part?);
    }
    Ok(out)
}
