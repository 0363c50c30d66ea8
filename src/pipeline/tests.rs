#[cfg(test)]
mod tests {
    use crate::client::RunStream;
    use crate::pipeline::runner::TypedRunner;
    use crate::pipeline::StreamProcessor;
    use crate::pipeline::text::{collect_stream_text, get_text_part, stream_text};
    use crate::types::events::{StreamEvent, StreamEventKind};
    use crate::{Error, Result};
    use bytes::Bytes;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn data_line(value: serde_json::Value) -> Result<Bytes> {
        Ok(Bytes::from(format!("data: {}\n\n", value)))
    }

    fn content_line(text: &str) -> Result<Bytes> {
        data_line(json!({"choices": [{"index": 0, "delta": {"content": text}}]}))
    }

    fn finish_line(reason: &str) -> Result<Bytes> {
        data_line(json!({"choices": [{"index": 0, "delta": {}, "finish_reason": reason}]}))
    }

    fn recorder(runner: &mut TypedRunner) -> Arc<Mutex<Vec<StreamEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            StreamEventKind::Connect,
            StreamEventKind::Content,
            StreamEventKind::ToolCall,
            StreamEventKind::Completion,
            StreamEventKind::Error,
            StreamEventKind::End,
        ] {
            let seen = Arc::clone(&seen);
            runner.on(kind, move |event| seen.lock().unwrap().push(event.clone()));
        }
        seen
    }

    #[tokio::test]
    async fn test_collect_text_concatenates_fragments() {
        let lines = futures::stream::iter(vec![
            content_line("Hello"),
            content_line(", "),
            Ok(Bytes::from_static(b": keep-alive")),
            content_line("world"),
            data_line(json!({"choices": [{"delta": {}}]})),
            content_line("!"),
            Ok(Bytes::from_static(b"data: [DONE]")),
        ]);
        assert_eq!(collect_stream_text(lines).await.unwrap(), "Hello, world!");
    }

    #[tokio::test]
    async fn test_stream_text_surfaces_transport_errors() {
        let lines = futures::stream::iter(vec![
            content_line("a"),
            Err(Error::connection("connection reset")),
            content_line("b"),
        ]);
        let items: Vec<_> = stream_text(lines).collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_deref().unwrap(), "a");
        assert!(items[1].is_err());
        assert_eq!(items[2].as_deref().unwrap(), "b");

        let lines = futures::stream::iter(vec![
            content_line("a"),
            Err(Error::connection("connection reset")),
        ]);
        assert!(collect_stream_text(lines).await.is_err());
    }

    #[test]
    fn test_get_text_part() {
        let chunk = crate::pipeline::decode::parse_chunk(
            br#"data: {"choices":[{"delta":{"content":"first"}},{"delta":{"content":"second"}}]}"#,
        )
        .unwrap();
        assert_eq!(get_text_part(&chunk), "first");
        assert_eq!(get_text_part(&Default::default()), "");
    }

    #[tokio::test]
    async fn test_stream_processor_chunks_and_text() {
        let lines = || {
            futures::stream::iter(vec![
                content_line("Hello"),
                content_line(" World"),
                finish_line("stop"),
            ])
        };

        let chunks: Vec<_> = StreamProcessor::new(lines())
            .process_chunks()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].choices[0].finish_reason.as_deref(), Some("stop"));

        let text = StreamProcessor::new(lines()).collect_text().await.unwrap();
        assert_eq!(text, "Hello World");
    }

    #[tokio::test]
    async fn test_runner_event_order() {
        let lines = futures::stream::iter(vec![
            content_line("Hel"),
            content_line("lo"),
            finish_line("stop"),
            Ok(Bytes::from_static(b"data: [DONE]")),
        ]);
        let mut runner = TypedRunner::new(RunStream::new(lines, Some("t1".to_string())));
        let seen = recorder(&mut runner);

        runner.process().await;

        let events = seen.lock().unwrap().clone();
        let kinds: Vec<_> = events.iter().map(StreamEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                StreamEventKind::Connect,
                StreamEventKind::Content,
                StreamEventKind::Content,
                StreamEventKind::Completion,
                StreamEventKind::End,
            ]
        );
        assert_eq!(
            events[0],
            StreamEvent::Connect {
                thread_id: Some("t1".to_string())
            }
        );
        assert_eq!(
            events[3],
            StreamEvent::Completion {
                reason: "stop".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_runner_tool_call_events_and_assembly() {
        let lines = futures::stream::iter(vec![
            data_line(json!({"choices": [{"delta": {"tool_calls": [{
                "index": 0, "id": "call_1", "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"loc"}
            }]}}]})),
            data_line(json!({"choices": [{"delta": {"tool_calls": [{
                "index": 0, "function": {"arguments": "ation\":\"SF\"}"}
            }]}}]})),
            finish_line("tool_calls"),
        ]);
        let mut runner = TypedRunner::new(RunStream::new(lines, None));
        let seen = recorder(&mut runner);

        runner.process().await;

        let events = seen.lock().unwrap().clone();
        let fragments: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolCall { tool_call } => Some(tool_call.arguments().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(fragments, vec!["{\"loc", "ation\":\"SF\"}"]);

        let calls = runner.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.arguments, r#"{"location":"SF"}"#);
    }

    #[tokio::test]
    async fn test_runner_reports_failures_and_ends_once() {
        let lines = futures::stream::iter(vec![
            content_line("a"),
            Err(Error::connection("connection reset")),
            content_line("b"),
        ]);
        let mut runner = TypedRunner::new(RunStream::new(lines, None));
        let seen = recorder(&mut runner);
        runner.on_fallible(StreamEventKind::Content, |event| match event {
            StreamEvent::Content { content } if content == "b" => anyhow::bail!("cannot render"),
            _ => Ok(()),
        });

        runner.process().await;
        runner.process().await;

        let events = seen.lock().unwrap().clone();
        let errors: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("connection reset"));
        assert!(errors[1].contains("cannot render"));

        let ends = events
            .iter()
            .filter(|e| e.kind() == StreamEventKind::End)
            .count();
        assert_eq!(ends, 1);
        assert_eq!(events.last().map(StreamEvent::kind), Some(StreamEventKind::End));
    }

    #[tokio::test]
    async fn test_runner_survives_panicking_handlers() {
        let lines = futures::stream::iter(vec![content_line("x"), finish_line("stop")]);
        let mut runner = TypedRunner::new(RunStream::new(lines, None));
        runner.on(StreamEventKind::Content, |_| panic!("boom"));
        runner.on(StreamEventKind::Error, |_| panic!("error handler boom"));
        let seen = recorder(&mut runner);

        runner.process().await;

        let kinds: Vec<_> = seen.lock().unwrap().iter().map(StreamEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                StreamEventKind::Connect,
                StreamEventKind::Content,
                StreamEventKind::Error,
                StreamEventKind::Completion,
                StreamEventKind::End,
            ]
        );
    }
}
