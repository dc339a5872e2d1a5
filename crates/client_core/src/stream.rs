use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use shared::{domain::RunId, protocol::RunEvent};
use tracing::{debug, info, warn};

use crate::error::RunClientError;

#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<SseEvent, RunClientError>> + Send>>;

pub fn parse_sse_stream<S, B, E>(byte_stream: S) -> SseStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + 'static,
{
    let event_stream = byte_stream
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())))
        .eventsource()
        .map(|result| {
            result
                .map(|event| SseEvent {
                    event_type: (!event.event.is_empty()).then_some(event.event),
                    data: event.data,
                    id: (!event.id.is_empty()).then_some(event.id),
                })
                .map_err(|e| RunClientError::Transport(e.to_string()))
        });

    Box::pin(event_stream)
}

/// The event stream of one run.
///
/// Yields events in arrival order and closes itself after the first terminal
/// event or the first transport error. It never reconnects.
pub struct RunEventStream {
    run_id: RunId,
    inner: Option<SseStream>,
}

impl RunEventStream {
    pub fn new(run_id: RunId, inner: SseStream) -> Self {
        Self {
            run_id,
            inner: Some(inner),
        }
    }

    pub fn from_bytes<S, B, E>(run_id: RunId, byte_stream: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        Self::new(run_id, parse_sse_stream(byte_stream))
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    pub async fn next(&mut self) -> Option<Result<RunEvent, RunClientError>> {
        loop {
            let inner = self.inner.as_mut()?;
            match inner.next().await {
                None => {
                    debug!(run_id = %self.run_id, "event stream ended by server");
                    self.inner = None;
                    return None;
                }
                Some(Err(err)) => {
                    warn!(run_id = %self.run_id, error = %err, "event stream transport error; not retrying");
                    self.inner = None;
                    return Some(Err(err));
                }
                Some(Ok(message)) => {
                    if message.data.trim().is_empty() {
                        continue;
                    }
                    let event = match serde_json::from_str::<RunEvent>(&message.data) {
                        Ok(event) => event,
                        Err(err) => {
                            warn!(
                                run_id = %self.run_id,
                                error = %err,
                                sse_id = ?message.id,
                                "skipping malformed run event"
                            );
                            continue;
                        }
                    };
                    if event.is_terminal() {
                        info!(
                            run_id = %self.run_id,
                            seq = event.seq,
                            event_type = %event.event_type,
                            "terminal event received; closing stream"
                        );
                        self.inner = None;
                    }
                    return Some(Ok(event));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn frame(seq: u64, event_type: &str, payload: &str) -> String {
        format!(
            "event: message\ndata: {{\"v\":1,\"runId\":\"run_1\",\"seq\":{seq},\"ts\":0,\"type\":\"{event_type}\",\"spanId\":null,\"payload\":{payload}}}\n\n"
        )
    }

    fn stream_of(chunks: Vec<String>) -> RunEventStream {
        let bytes = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
        RunEventStream::from_bytes(RunId::from("run_1"), bytes)
    }

    #[tokio::test]
    async fn parses_message_frames() {
        let mut sse = parse_sse_stream(stream::once(async {
            Ok::<_, std::io::Error>("event: message\ndata: {\"a\":1}\n\n")
        }));
        let event = sse.next().await.expect("item").expect("event");
        assert_eq!(event.event_type.as_deref(), Some("message"));
        assert_eq!(event.data, "{\"a\":1}");
        assert!(event.id.is_none());
    }

    #[tokio::test]
    async fn skips_comments_and_yields_events_in_order() {
        let mut events = stream_of(vec![
            ": connected\n\n".to_string(),
            frame(1, "run.started", "{\"name\":\"demo\"}"),
            frame(2, "step.started", "{\"stepId\":\"s1\",\"title\":\"Draft\"}"),
        ]);

        let first = events.next().await.expect("first").expect("ok");
        let second = events.next().await.expect("second").expect("ok");
        assert_eq!((first.seq, second.seq), (1, 2));
        assert!(events.next().await.is_none());
        assert!(events.is_closed());
    }

    #[tokio::test]
    async fn terminal_event_stops_consumption() {
        let mut events = stream_of(vec![
            frame(1, "step.started", "{\"stepId\":\"s1\",\"title\":\"Draft\"}"),
            frame(2, "run.completed", "{\"summary\":\"ok\"}"),
            frame(3, "step.started", "{\"stepId\":\"s2\",\"title\":\"Late\"}"),
        ]);

        assert_eq!(events.next().await.expect("1").expect("ok").seq, 1);
        let terminal = events.next().await.expect("2").expect("ok");
        assert!(terminal.is_terminal());
        assert!(events.is_closed());
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn each_terminal_type_closes_the_stream() {
        for event_type in ["run.completed", "run.failed", "run.canceled"] {
            let mut events = stream_of(vec![
                frame(1, event_type, "{}"),
                frame(2, "log.appended", "{\"message\":\"late\"}"),
            ]);
            events.next().await.expect("terminal").expect("ok");
            assert!(events.next().await.is_none(), "{event_type} must close");
        }
    }

    #[tokio::test]
    async fn envelope_without_timestamp_is_delivered() {
        let mut events = stream_of(vec![
            "data: {\"v\":1,\"runId\":\"run_1\",\"seq\":1,\"type\":\"step.started\",\"payload\":{\"stepId\":\"s1\",\"title\":\"Draft\"}}\n\n".to_string(),
        ]);
        let event = events.next().await.expect("event").expect("ok");
        assert_eq!(event.event_type, "step.started");
        assert!(event.ts.is_none());
    }

    #[tokio::test]
    async fn malformed_message_is_skipped() {
        let mut events = stream_of(vec![
            "data: not json\n\n".to_string(),
            frame(4, "log.appended", "{\"message\":\"hi\"}"),
        ]);
        let event = events.next().await.expect("event").expect("ok");
        assert_eq!(event.seq, 4);
    }

    #[tokio::test]
    async fn transport_error_closes_without_retry() {
        let chunks: Vec<Result<String, std::io::Error>> = vec![
            Ok(frame(1, "log.appended", "{\"message\":\"hi\"}")),
            Err(std::io::Error::other("connection reset")),
            Ok(frame(2, "log.appended", "{\"message\":\"after\"}")),
        ];
        let mut events = RunEventStream::from_bytes(RunId::from("run_1"), stream::iter(chunks));

        events.next().await.expect("first").expect("ok");
        let err = events.next().await.expect("error item").expect_err("transport error");
        assert!(matches!(err, RunClientError::Transport(_)));
        assert!(events.next().await.is_none());
    }
}
