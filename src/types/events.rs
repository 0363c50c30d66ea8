//! Typed events dispatched by the stream runner

use crate::types::chunk::ToolCallFragment;
use serde::Serialize;
use std::time::Duration;

/// Event emitted while processing a run stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// First chunk arrived. Emitted once, before any content.
    Connect { thread_id: Option<String> },

    /// Non-empty text delta of a choice.
    Content { content: String },

    /// Tool-call fragment, as received.
    ToolCall { tool_call: ToolCallFragment },

    /// A choice finished.
    Completion { reason: String },

    /// Transport failure or handler failure. Processing continues.
    Error { message: String },

    /// Stream exhausted. Always the last event, emitted exactly once.
    End { duration: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEventKind {
    Connect,
    Content,
    ToolCall,
    Completion,
    Error,
    End,
}

impl StreamEvent {
    pub fn kind(&self) -> StreamEventKind {
        match self {
            StreamEvent::Connect { .. } => StreamEventKind::Connect,
            StreamEvent::Content { .. } => StreamEventKind::Content,
            StreamEvent::ToolCall { .. } => StreamEventKind::ToolCall,
            StreamEvent::Completion { .. } => StreamEventKind::Completion,
            StreamEvent::Error { .. } => StreamEventKind::Error,
            StreamEvent::End { .. } => StreamEventKind::End,
        }
    }
}

impl StreamEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEventKind::Connect => "connect",
            StreamEventKind::Content => "content",
            StreamEventKind::ToolCall => "tool_call",
            StreamEventKind::Completion => "completion",
            StreamEventKind::Error => "error",
            StreamEventKind::End => "end",
        }
    }
}

impl std::fmt::Display for StreamEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
