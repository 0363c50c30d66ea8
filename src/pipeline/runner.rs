//! Typed event runner: dispatches stream events to registered handlers.

use crate::client::RunStream;
use crate::pipeline::accumulate::ToolCallAccumulator;
use crate::pipeline::decode::parse_chunk;
use crate::types::events::{StreamEvent, StreamEventKind};
use crate::types::tool::ToolCall;
use crate::BoxStream;
use bytes::Bytes;
use futures::StreamExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, warn};

type Handler = Box<dyn FnMut(&StreamEvent) -> anyhow::Result<()> + Send>;

/// Drives a run stream and calls the handlers registered per event kind.
///
/// Event order for a stream is `Connect`, then per chunk `Content`,
/// `ToolCall` and `Completion` as the chunk's choices carry them, and
/// finally a single `End`. Handlers for one event run in registration
/// order, and all of them return before the next line is pulled.
///
/// Handler failures (an `Err` or a panic) are reported as `Error` events and
/// do not stop processing. A failing `Error` handler is only logged.
pub struct TypedRunner {
    stream: Option<BoxStream<'static, Bytes>>,
    thread_id: Option<String>,
    handlers: HashMap<StreamEventKind, Vec<Handler>>,
    tool_calls: ToolCallAccumulator,
}

/// Wrap a streaming run response in a [`TypedRunner`].
pub fn get_typed_runner(stream: RunStream) -> TypedRunner {
    TypedRunner::new(stream)
}

impl TypedRunner {
    pub fn new(stream: RunStream) -> Self {
        Self {
            stream: Some(stream.stream),
            thread_id: stream.thread_id,
            handlers: HashMap::new(),
            tool_calls: ToolCallAccumulator::new(),
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Register a handler. Multiple handlers per kind are called in order.
    pub fn on<F>(&mut self, kind: StreamEventKind, mut handler: F) -> &mut Self
    where
        F: FnMut(&StreamEvent) + Send + 'static,
    {
        self.on_fallible(kind, move |event| {
            handler(event);
            Ok(())
        })
    }

    /// Register a handler whose errors are turned into `Error` events.
    pub fn on_fallible<F>(&mut self, kind: StreamEventKind, handler: F) -> &mut Self
    where
        F: FnMut(&StreamEvent) -> anyhow::Result<()> + Send + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
        self
    }

    /// Consume the stream, dispatching events until it is exhausted.
    ///
    /// Calling this again after the stream was consumed does nothing.
    pub async fn process(&mut self) {
        let Some(mut lines) = self.stream.take() else {
            debug!("typed runner already processed its stream");
            return;
        };

        let start = Instant::now();
        let mut connected = false;

        while let Some(item) = lines.next().await {
            let line = match item {
                Ok(line) => line,
                Err(e) => {
                    self.dispatch(&StreamEvent::Error {
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            let Some(chunk) = parse_chunk(&line) else {
                continue;
            };

            if !connected {
                connected = true;
                self.dispatch(&StreamEvent::Connect {
                    thread_id: self.thread_id.clone(),
                });
            }

            for choice in &chunk.choices {
                if let Some(content) = choice.delta.content.as_deref().filter(|c| !c.is_empty()) {
                    self.dispatch(&StreamEvent::Content {
                        content: content.to_string(),
                    });
                }
                for fragment in choice.delta.tool_calls.iter().flatten() {
                    self.tool_calls.push(fragment);
                    self.dispatch(&StreamEvent::ToolCall {
                        tool_call: fragment.clone(),
                    });
                }
                if let Some(reason) = &choice.finish_reason {
                    self.dispatch(&StreamEvent::Completion {
                        reason: reason.clone(),
                    });
                }
            }
        }

        self.dispatch(&StreamEvent::End {
            duration: start.elapsed(),
        });
    }

    /// Tool calls assembled from the fragments seen so far.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls.tool_calls()
    }

    fn dispatch(&mut self, event: &StreamEvent) {
        let kind = event.kind();
        let mut failures = Vec::new();

        if let Some(handlers) = self.handlers.get_mut(&kind) {
            for handler in handlers.iter_mut() {
                match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => failures.push(format!("{kind} handler failed: {e:#}")),
                    Err(panic) => failures.push(format!(
                        "{kind} handler panicked: {}",
                        panic_message(panic.as_ref())
                    )),
                }
            }
        }

        for message in failures {
            if kind == StreamEventKind::Error {
                warn!(error = %message, "error handler failed");
            } else {
                self.dispatch(&StreamEvent::Error { message });
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

impl std::fmt::Debug for TypedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("TypedRunner")
            .field("thread_id", &self.thread_id)
            .field("handlers", &kinds)
            .field("processed", &self.stream.is_none())
            .finish()
    }
}
