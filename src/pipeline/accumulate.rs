//! Tool-call reassembly.
//!
//! Tool calls arrive split across chunks: the first fragment for an index
//! usually carries id, type and function name, later ones only pieces of
//! the arguments string.

use crate::client::RunStream;
use crate::pipeline::decode::parse_chunk;
use crate::types::chunk::{StreamChunk, ToolCallFragment};
use crate::types::tool::ToolCall;
use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};

/// Collects fragments into complete [`ToolCall`]s, keyed by fragment index.
///
/// Calls are returned in the order their index was first seen. Identifying
/// fields are taken from the first fragment that carries a non-empty value;
/// arguments are concatenated in arrival order.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<(u32, ToolCall)>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &ToolCallFragment) {
        let pos = match self.calls.iter().position(|(i, _)| *i == fragment.index) {
            Some(pos) => pos,
            None => {
                self.calls.push((fragment.index, ToolCall::default()));
                self.calls.len() - 1
            }
        };
        let call = &mut self.calls[pos].1;

        fill_if_empty(&mut call.id, fragment.id.as_deref());
        fill_if_empty(&mut call.kind, fragment.kind.as_deref());
        fill_if_empty(&mut call.function.name, fragment.function.name.as_deref());
        call.function.arguments.push_str(fragment.arguments());
    }

    /// Feed every tool-call fragment of every choice in `chunk`.
    pub fn push_chunk(&mut self, chunk: &StreamChunk) {
        for choice in &chunk.choices {
            for fragment in choice.delta.tool_calls.iter().flatten() {
                self.push(fragment);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Snapshot of the calls assembled so far.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.calls.iter().map(|(_, c)| finalize(c.clone())).collect()
    }

    pub fn finish(self) -> Vec<ToolCall> {
        self.calls.into_iter().map(|(_, c)| finalize(c)).collect()
    }
}

fn fill_if_empty(slot: &mut String, value: Option<&str>) {
    if slot.is_empty() {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            *slot = v.to_string();
        }
    }
}

fn finalize(mut call: ToolCall) -> ToolCall {
    if call.kind.is_empty() {
        call.kind = "function".to_string();
    }
    call
}

/// Consume a line stream and return the tool calls it carried.
///
/// The stream is consumed once; callers that also need the text must buffer
/// and replay the lines themselves.
pub async fn get_tools_from_stream<S>(lines: S) -> Result<Vec<ToolCall>>
where
    S: Stream<Item = Result<Bytes>>,
{
    futures::pin_mut!(lines);
    let mut acc = ToolCallAccumulator::new();
    while let Some(line) = lines.next().await {
        if let Some(chunk) = parse_chunk(&line?) {
            acc.push_chunk(&chunk);
        }
    }
    Ok(acc.finish())
}

/// [`get_tools_from_stream`] over the body of a streaming run.
pub async fn get_tools_from_run_stream(run: RunStream) -> Result<Vec<ToolCall>> {
    get_tools_from_stream(run.stream).await
}

/// Tool calls of a buffered run response (`choices[0].message.tool_calls`).
///
/// A response without tool calls yields an empty list.
pub fn get_tools_from_run(response: &serde_json::Value) -> Result<Vec<ToolCall>> {
    let tool_calls = response
        .pointer("/choices/0/message/tool_calls")
        .or_else(|| response.pointer("/raw/choices/0/message/tool_calls"));

    match tool_calls {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(value @ serde_json::Value::Array(_)) => {
            serde_json::from_value(value.clone()).map_err(Error::from)
        }
        Some(other) => Err(Error::validation_with_context(
            "tool_calls must be an array",
            ErrorContext::new()
                .with_field_path("choices[0].message.tool_calls")
                .with_details(other.to_string())
                .with_source("get_tools_from_run"),
        )),
    }
}
