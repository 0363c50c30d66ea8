//! # Types Module
//!
//! Data types flowing through the streaming pipeline.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`chunk`] | One decoded SSE chunk: choices, deltas, tool-call fragments |
//! | [`events`] | Typed events dispatched by the runner |
//! | [`tool`] | Fully assembled tool calls |

pub mod chunk;
pub mod events;
pub mod tool;

pub use chunk::{Choice, Delta, FunctionFragment, StreamChunk, ToolCallFragment};
pub use events::{StreamEvent, StreamEventKind};
pub use tool::{FunctionCall, ToolCall};
