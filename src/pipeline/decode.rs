//! SSE framing and chunk decoding (Bytes -> lines -> StreamChunk)

use crate::types::chunk::StreamChunk;
use crate::BoxStream;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use tracing::trace;

/// Payload marking the end of a completion stream.
pub const DONE_SIGNAL: &str = "[DONE]";

/// Decode one SSE line into a chunk.
///
/// Only `data:` lines carry chunks; the single optional space after the
/// colon is ignored. Comments, other fields, empty payloads, `[DONE]` and
/// undecodable JSON all yield `None`.
pub fn parse_chunk(raw_line: &[u8]) -> Option<StreamChunk> {
    let line = String::from_utf8_lossy(raw_line);
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == DONE_SIGNAL {
        return None;
    }
    match serde_json::from_str(payload) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            trace!(error = %e, "skipping undecodable SSE payload");
            None
        }
    }
}

/// Re-frame an arbitrary byte stream into SSE lines.
///
/// Transport chunks need not align with lines: partial lines are buffered
/// across chunks and the tail is flushed at EOF. Line terminators (`\n` or
/// `\r\n`) are stripped and blank lines dropped. Transport errors are passed
/// through in order.
pub fn sse_lines<'a, S>(input: S) -> BoxStream<'a, Bytes>
where
    S: Stream<Item = crate::Result<Bytes>> + Send + 'a,
{
    let input = Box::pin(input);
    let lines = stream::unfold(
        (input, Vec::<u8>::new(), false),
        |(mut input, mut buf, mut eof)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let mut line: Vec<u8> = buf.drain(..=pos).collect();
                    line.pop();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.is_empty() {
                        continue;
                    }
                    return Some((Ok(Bytes::from(line)), (input, buf, eof)));
                }

                if eof {
                    let mut line = std::mem::take(&mut buf);
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.is_empty() {
                        return None;
                    }
                    return Some((Ok(Bytes::from(line)), (input, buf, eof)));
                }

                match input.next().await {
                    Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), (input, buf, eof))),
                    None => eof = true,
                }
            }
        },
    );
    Box::pin(lines)
}
