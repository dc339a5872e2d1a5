use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ButtonId, PendingInteraction, RequestId, RunId, SpanId, StepId};

pub const PROTOCOL_VERSION: u32 = 1;

pub mod event_types {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_FAILED: &str = "run.failed";
    pub const RUN_CANCELED: &str = "run.canceled";
    pub const STEP_STARTED: &str = "step.started";
    pub const STEP_PROGRESS: &str = "step.progress";
    pub const STEP_COMPLETED: &str = "step.completed";
    pub const STEP_FAILED: &str = "step.failed";
    pub const UI_REQUEST: &str = "ui.request";
    pub const LOG_APPENDED: &str = "log.appended";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retriable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStartedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCompletedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCanceledPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStartedPayload {
    pub step_id: StepId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgressPayload {
    pub step_id: StepId,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCompletedPayload {
    pub step_id: StepId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailedPayload {
    pub step_id: StepId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogAppendedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub message: String,
}

/// Typed view of an event's `(type, payload)` pair.
///
/// Anything the client does not recognize, including a known type whose
/// payload is missing required fields, decodes to [`EventKind::Other`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    RunStarted(RunStartedPayload),
    RunCompleted(RunCompletedPayload),
    RunFailed(RunFailedPayload),
    RunCanceled(RunCanceledPayload),
    StepStarted(StepStartedPayload),
    StepProgress(StepProgressPayload),
    StepCompleted(StepCompletedPayload),
    StepFailed(StepFailedPayload),
    UiRequest(PendingInteraction),
    LogAppended(LogAppendedPayload),
    Other { event_type: String },
}

fn decode_payload<T: DeserializeOwned>(payload: &Value) -> Option<T> {
    T::deserialize(payload).ok()
}

impl EventKind {
    pub fn decode(event_type: &str, payload: &Value) -> Self {
        use event_types::*;

        // Producers may send `null` for events that carry no data.
        let empty = Value::Object(serde_json::Map::new());
        let payload = if payload.is_null() { &empty } else { payload };

        let decoded = match event_type {
            RUN_STARTED => decode_payload(payload).map(Self::RunStarted),
            RUN_COMPLETED => decode_payload(payload).map(Self::RunCompleted),
            RUN_FAILED => decode_payload(payload).map(Self::RunFailed),
            RUN_CANCELED => decode_payload(payload).map(Self::RunCanceled),
            STEP_STARTED => decode_payload(payload).map(Self::StepStarted),
            STEP_PROGRESS => decode_payload(payload).map(Self::StepProgress),
            STEP_COMPLETED => decode_payload(payload).map(Self::StepCompleted),
            STEP_FAILED => decode_payload(payload).map(Self::StepFailed),
            UI_REQUEST => decode_payload(payload).map(Self::UiRequest),
            LOG_APPENDED => decode_payload(payload).map(Self::LogAppended),
            _ => None,
        };

        decoded.unwrap_or_else(|| Self::Other {
            event_type: event_type.to_string(),
        })
    }

    pub fn event_type(&self) -> &str {
        use event_types::*;

        match self {
            Self::RunStarted(_) => RUN_STARTED,
            Self::RunCompleted(_) => RUN_COMPLETED,
            Self::RunFailed(_) => RUN_FAILED,
            Self::RunCanceled(_) => RUN_CANCELED,
            Self::StepStarted(_) => STEP_STARTED,
            Self::StepProgress(_) => STEP_PROGRESS,
            Self::StepCompleted(_) => STEP_COMPLETED,
            Self::StepFailed(_) => STEP_FAILED,
            Self::UiRequest(_) => UI_REQUEST,
            Self::LogAppended(_) => LOG_APPENDED,
            Self::Other { event_type } => event_type,
        }
    }

    pub fn to_payload(&self) -> Value {
        let encoded = match self {
            Self::RunStarted(p) => serde_json::to_value(p),
            Self::RunCompleted(p) => serde_json::to_value(p),
            Self::RunFailed(p) => serde_json::to_value(p),
            Self::RunCanceled(p) => serde_json::to_value(p),
            Self::StepStarted(p) => serde_json::to_value(p),
            Self::StepProgress(p) => serde_json::to_value(p),
            Self::StepCompleted(p) => serde_json::to_value(p),
            Self::StepFailed(p) => serde_json::to_value(p),
            Self::UiRequest(p) => serde_json::to_value(p),
            Self::LogAppended(p) => serde_json::to_value(p),
            Self::Other { .. } => Ok(Value::Null),
        };
        encoded.unwrap_or(Value::Null)
    }

    /// `run.completed`, `run.failed` and `run.canceled` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunCompleted(_) | Self::RunFailed(_) | Self::RunCanceled(_)
        )
    }
}

pub fn is_terminal_event_type(event_type: &str) -> bool {
    matches!(
        event_type,
        event_types::RUN_COMPLETED | event_types::RUN_FAILED | event_types::RUN_CANCELED
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(rename = "v", default = "default_protocol_version")]
    protocol_version: u32,
    run_id: RunId,
    #[serde(default)]
    seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ts: Option<i64>,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    span_id: Option<SpanId>,
    #[serde(default)]
    payload: Value,
}

fn default_protocol_version() -> u32 {
    PROTOCOL_VERSION
}

/// One message of a run's event stream.
///
/// `payload` keeps the raw JSON for the event log; `kind` is decoded once on
/// receipt. `seq` and `ts` are informational and may be absent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireEvent", into = "WireEvent")]
pub struct RunEvent {
    pub protocol_version: u32,
    pub run_id: RunId,
    pub seq: u64,
    pub ts: Option<i64>,
    pub span_id: Option<SpanId>,
    pub event_type: String,
    pub payload: Value,
    pub kind: EventKind,
}

impl RunEvent {
    pub fn new(run_id: RunId, seq: u64, ts: i64, span_id: Option<SpanId>, kind: EventKind) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            run_id,
            seq,
            ts: Some(ts),
            span_id,
            event_type: kind.event_type().to_string(),
            payload: kind.to_payload(),
            kind,
        }
    }

    pub fn is_terminal(&self) -> bool {
        is_terminal_event_type(&self.event_type)
    }
}

impl From<WireEvent> for RunEvent {
    fn from(wire: WireEvent) -> Self {
        let kind = EventKind::decode(&wire.event_type, &wire.payload);
        Self {
            protocol_version: wire.protocol_version,
            run_id: wire.run_id,
            seq: wire.seq,
            ts: wire.ts,
            span_id: wire.span_id,
            event_type: wire.event_type,
            payload: wire.payload,
            kind,
        }
    }
}

impl From<RunEvent> for WireEvent {
    fn from(event: RunEvent) -> Self {
        Self {
            protocol_version: event.protocol_version,
            run_id: event.run_id,
            seq: event.seq,
            ts: event.ts,
            event_type: event.event_type,
            span_id: event.span_id,
            payload: event.payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunRequest {
    pub user_input: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunResponse {
    pub run_id: RunId,
}

/// Answer to a pending interaction, correlated by `requestId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiResponse {
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_id: Option<ButtonId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_step_started_envelope() {
        let raw = json!({
            "v": 1,
            "runId": "run_1",
            "seq": 3,
            "ts": 1_700_000_000_000_i64,
            "type": "step.started",
            "spanId": "plan",
            "payload": {"stepId": "plan", "title": "Plan", "kind": "planning"}
        });
        let event: RunEvent = serde_json::from_value(raw).expect("event");
        assert_eq!(event.seq, 3);
        assert_eq!(event.span_id, Some(SpanId::from("plan")));
        match event.kind {
            EventKind::StepStarted(payload) => {
                assert_eq!(payload.step_id, StepId::from("plan"));
                assert_eq!(payload.title, "Plan");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn null_span_id_is_accepted() {
        let raw = r#"{"v":1,"runId":"r","seq":1,"ts":0,"type":"run.canceled","spanId":null,"payload":{"reason":"User canceled"}}"#;
        let event: RunEvent = serde_json::from_str(raw).expect("event");
        assert!(event.span_id.is_none());
        assert!(event.is_terminal());
        assert_eq!(
            event.kind,
            EventKind::RunCanceled(RunCanceledPayload {
                reason: Some("User canceled".into())
            })
        );
    }

    #[test]
    fn envelope_without_seq_or_ts_still_decodes() {
        let raw = r#"{"v":1,"runId":"r","type":"step.started","payload":{"stepId":"s1","title":"Draft"}}"#;
        let event: RunEvent = serde_json::from_str(raw).expect("event");
        assert_eq!(event.seq, 0);
        assert!(event.ts.is_none());
        assert!(matches!(event.kind, EventKind::StepStarted(_)));

        let value = serde_json::to_value(&event).expect("serialize");
        assert!(value.get("ts").is_none());
    }

    #[test]
    fn ui_request_without_title_or_labels_decodes() {
        let payload = json!({"requestId": "r1", "ui": {"buttons": [{"id": "a"}, {"id": "b", "label": "B"}]}});
        let EventKind::UiRequest(pending) = EventKind::decode("ui.request", &payload) else {
            panic!("expected ui.request");
        };
        assert_eq!(pending.request_id, RequestId::from("r1"));
        assert!(pending.ui.title.is_empty());
        assert_eq!(pending.ui.buttons[0].label, "");
        assert_eq!(pending.ui.buttons[1].label, "B");
    }

    #[test]
    fn unknown_type_falls_back_to_other() {
        let kind = EventKind::decode("tool.called", &json!({"name": "search"}));
        assert_eq!(
            kind,
            EventKind::Other {
                event_type: "tool.called".into()
            }
        );
        assert!(!kind.is_terminal());
    }

    #[test]
    fn known_type_with_missing_step_id_falls_back_to_other() {
        let kind = EventKind::decode("step.progress", &json!({"progress": 0.5}));
        assert!(matches!(kind, EventKind::Other { .. }));
    }

    #[test]
    fn ui_request_decodes_optional_button_fields() {
        let payload = json!({
            "requestId": "rq_1",
            "ui": {
                "kind": "buttons",
                "title": "Proceed with execution?",
                "description": "Click Approve to continue or Cancel to stop.",
                "buttons": [
                    {"id": "approve", "label": "Approve", "style": "primary"},
                    {"id": "cancel", "label": "Cancel", "style": "danger", "confirm": {"title": "Cancel run?"}}
                ]
            },
            "blocking": true,
            "timeoutMs": 60000
        });
        let EventKind::UiRequest(pending) = EventKind::decode("ui.request", &payload) else {
            panic!("expected ui.request");
        };
        assert_eq!(pending.timeout_ms, Some(60_000));
        assert_eq!(pending.ui.buttons.len(), 2);
        assert_eq!(
            pending.ui.buttons[1].confirm.as_ref().map(|c| c.title.as_str()),
            Some("Cancel run?")
        );
    }

    #[test]
    fn built_event_serializes_with_wire_field_names() {
        let event = RunEvent::new(
            RunId::from("run_1"),
            1,
            42,
            None,
            EventKind::StepFailed(StepFailedPayload {
                step_id: StepId::from("approval"),
                error: Some(ErrorDetail {
                    message: "UI response timeout".into(),
                    retriable: None,
                }),
            }),
        );
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["v"], 1);
        assert_eq!(value["runId"], "run_1");
        assert_eq!(value["type"], "step.failed");
        assert_eq!(value["payload"]["stepId"], "approval");
        assert_eq!(value["payload"]["error"]["message"], "UI response timeout");
    }

    #[test]
    fn ui_response_uses_camel_case_keys() {
        let body = UiResponse {
            request_id: RequestId::from("r1"),
            button_id: Some(ButtonId::from("a")),
        };
        assert_eq!(
            serde_json::to_value(body).expect("serialize"),
            json!({"requestId": "r1", "buttonId": "a"})
        );
    }
}
