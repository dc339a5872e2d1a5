use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use serde_json::json;
use shared::{
    domain::{ButtonId, ConfirmSpec, PendingInteraction, RequestId, RunId, SpanId, UiButton, UiSpec},
    protocol::{
        ErrorDetail, EventKind, LogAppendedPayload, RunCanceledPayload, RunCompletedPayload,
        RunEvent, RunFailedPayload, RunStartedPayload, StepCompletedPayload, StepFailedPayload,
        StepProgressPayload, StepStartedPayload, UiResponse,
    },
};
use tokio::{
    sync::{mpsc, oneshot, Mutex, RwLock},
    time::{sleep, timeout},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

const RUN_NAME: &str = "Scripted approval run";

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub step_delay: Duration,
    pub ui_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStoreError {
    NotFound,
    StreamAttached,
    NoPendingRequest,
}

type UiWaiter = Mutex<Option<oneshot::Sender<UiResponse>>>;

struct RunEntry {
    events: Mutex<Option<mpsc::UnboundedReceiver<RunEvent>>>,
    ui_waiter: Arc<UiWaiter>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

/// In-memory registry of live runs. A run is dropped once its runner ends.
#[derive(Clone, Default)]
pub struct RunStore {
    runs: Arc<RwLock<HashMap<RunId, Arc<RunEntry>>>>,
}

fn short_hex(len: usize) -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.truncate(len);
    hex
}

impl RunStore {
    pub async fn create(&self, user_input: String, settings: RunnerSettings) -> RunId {
        let run_id = RunId(format!("run_{}", short_hex(10)));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let ui_waiter = Arc::new(Mutex::new(None));

        let entry = Arc::new(RunEntry {
            events: Mutex::new(Some(events_rx)),
            ui_waiter: Arc::clone(&ui_waiter),
            cancel: Mutex::new(Some(cancel_tx)),
        });
        self.runs.write().await.insert(run_id.clone(), entry);

        let emitter = Emitter::new(run_id.clone(), events_tx);
        let runs = Arc::clone(&self.runs);
        let finished = run_id.clone();
        tokio::spawn(async move {
            drive_run(emitter, user_input, ui_waiter, cancel_rx, settings).await;
            // An attached subscriber already owns its receiver and drains the rest.
            runs.write().await.remove(&finished);
            debug!(run_id = %finished, "run removed from store");
        });
        info!(run_id = %run_id, "run started");
        run_id
    }

    async fn entry(&self, run_id: &RunId) -> Result<Arc<RunEntry>, RunStoreError> {
        self.runs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or(RunStoreError::NotFound)
    }

    /// Hands out the run's event queue. Only one subscriber may attach.
    pub async fn take_events(
        &self,
        run_id: &RunId,
    ) -> Result<mpsc::UnboundedReceiver<RunEvent>, RunStoreError> {
        let entry = self.entry(run_id).await?;
        let mut events = entry.events.lock().await;
        events.take().ok_or(RunStoreError::StreamAttached)
    }

    pub async fn respond(&self, run_id: &RunId, response: UiResponse) -> Result<(), RunStoreError> {
        let entry = self.entry(run_id).await?;
        let waiter = entry
            .ui_waiter
            .lock()
            .await
            .take()
            .ok_or(RunStoreError::NoPendingRequest)?;
        waiter
            .send(response)
            .map_err(|_| RunStoreError::NoPendingRequest)
    }

    pub async fn cancel(&self, run_id: &RunId) -> Result<(), RunStoreError> {
        let entry = self.entry(run_id).await?;
        if let Some(cancel) = entry.cancel.lock().await.take() {
            let _ = cancel.send(());
            info!(run_id = %run_id, "run cancel requested");
        }
        Ok(())
    }
}

struct Emitter {
    run_id: RunId,
    seq: AtomicU64,
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl Emitter {
    fn new(run_id: RunId, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self {
            run_id,
            seq: AtomicU64::new(0),
            tx,
        }
    }

    fn emit(&self, span_id: Option<&str>, kind: EventKind) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let event = RunEvent::new(
            self.run_id.clone(),
            seq,
            Utc::now().timestamp_millis(),
            span_id.map(SpanId::from),
            kind,
        );
        debug!(run_id = %self.run_id, seq, event_type = %event.event_type, "emit");
        if self.tx.send(event).is_err() {
            debug!(run_id = %self.run_id, seq, "event subscriber gone; dropping event");
        }
    }
}

async fn drive_run(
    emitter: Emitter,
    user_input: String,
    ui_waiter: Arc<UiWaiter>,
    cancel_rx: oneshot::Receiver<()>,
    settings: RunnerSettings,
) {
    let canceled = async {
        if cancel_rx.await.is_err() {
            futures::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = canceled => {
            emitter.emit(
                None,
                EventKind::RunCanceled(RunCanceledPayload {
                    reason: Some("canceled by client".into()),
                }),
            );
        }
        () = run_script(&emitter, &user_input, &ui_waiter, &settings) => {}
    }
    debug!(run_id = %emitter.run_id, "runner finished");
}

fn step_started(step_id: &str, title: &str, kind: &str) -> EventKind {
    EventKind::StepStarted(StepStartedPayload {
        step_id: step_id.into(),
        title: title.into(),
        kind: Some(kind.into()),
    })
}

fn step_progress(step_id: &str, progress: f64, message: &str) -> EventKind {
    EventKind::StepProgress(StepProgressPayload {
        step_id: step_id.into(),
        progress: Some(progress),
        message: Some(message.into()),
    })
}

fn step_completed(step_id: &str, output: Option<serde_json::Value>) -> EventKind {
    EventKind::StepCompleted(StepCompletedPayload {
        step_id: step_id.into(),
        output,
    })
}

fn log_info(message: &str) -> EventKind {
    EventKind::LogAppended(LogAppendedPayload {
        level: Some("info".into()),
        message: message.into(),
    })
}

fn approval_request(request_id: RequestId, ui_timeout: Duration) -> PendingInteraction {
    let mut approve = UiButton::new("approve", "Approve");
    approve.style = Some("primary".into());
    let mut cancel = UiButton::new("cancel", "Cancel");
    cancel.style = Some("danger".into());
    cancel.confirm = Some(ConfirmSpec {
        title: "Cancel run?".into(),
    });

    PendingInteraction {
        request_id,
        ui: UiSpec {
            kind: Some("buttons".into()),
            title: "Proceed with execution?".into(),
            description: "Click Approve to continue or Cancel to stop.".into(),
            buttons: vec![approve, cancel],
        },
        blocking: Some(true),
        timeout_ms: Some(ui_timeout.as_millis() as u64),
    }
}

async fn run_script(
    emitter: &Emitter,
    user_input: &str,
    ui_waiter: &UiWaiter,
    settings: &RunnerSettings,
) {
    emitter.emit(
        None,
        EventKind::RunStarted(RunStartedPayload {
            name: Some(RUN_NAME.into()),
            input: Some(json!({ "user_input": user_input })),
        }),
    );

    emitter.emit(Some("plan"), step_started("plan", "Plan", "planning"));
    emitter.emit(Some("plan"), log_info("Planning..."));
    sleep(settings.step_delay).await;
    emitter.emit(Some("plan"), step_completed("plan", None));

    emitter.emit(Some("approval"), step_started("approval", "Approval", "custom"));
    let request_id = RequestId(format!("rq_{}", short_hex(8)));
    let (answer_tx, answer_rx) = oneshot::channel();
    *ui_waiter.lock().await = Some(answer_tx);
    emitter.emit(
        Some("approval"),
        EventKind::UiRequest(approval_request(request_id.clone(), settings.ui_timeout)),
    );
    emitter.emit(Some("approval"), log_info("Waiting for user action..."));

    let response = match timeout(settings.ui_timeout, answer_rx).await {
        Ok(Ok(response)) => response,
        _ => {
            ui_waiter.lock().await.take();
            warn!(run_id = %emitter.run_id, %request_id, "no ui response before timeout");
            emitter.emit(
                Some("approval"),
                EventKind::StepFailed(StepFailedPayload {
                    step_id: "approval".into(),
                    error: Some(ErrorDetail {
                        message: "UI response timeout".into(),
                        retriable: None,
                    }),
                }),
            );
            emitter.emit(
                None,
                EventKind::RunFailed(RunFailedPayload {
                    error: Some(ErrorDetail {
                        message: "UI response timeout".into(),
                        retriable: Some(false),
                    }),
                }),
            );
            return;
        }
    };
    if response.request_id != request_id {
        warn!(
            run_id = %emitter.run_id,
            expected = %request_id,
            received = %response.request_id,
            "ui response carries a different request id"
        );
    }

    let cancel_button = ButtonId::from("cancel");
    if response.button_id.as_ref() == Some(&cancel_button) {
        emitter.emit(
            Some("approval"),
            step_completed("approval", Some(json!({ "approved": false }))),
        );
        emitter.emit(
            None,
            EventKind::RunCanceled(RunCanceledPayload {
                reason: Some("User canceled".into()),
            }),
        );
        return;
    }

    let approved = response.button_id.as_ref() == Some(&ButtonId::from("approve"));
    emitter.emit(
        Some("approval"),
        step_completed("approval", Some(json!({ "approved": approved }))),
    );

    emitter.emit(Some("execute"), step_started("execute", "Execute", "generation"));
    emitter.emit(Some("execute"), step_progress("execute", 0.2, "Starting..."));
    sleep(settings.step_delay * 3 / 5).await;
    emitter.emit(Some("execute"), step_progress("execute", 0.6, "Working..."));
    sleep(settings.step_delay).await;
    let result = format!("Done. You asked: {user_input}. Approved={approved}");
    emitter.emit(Some("execute"), step_progress("execute", 1.0, "Done."));
    emitter.emit(
        Some("execute"),
        step_completed("execute", Some(json!({ "result": result }))),
    );

    emitter.emit(
        None,
        EventKind::RunCompleted(RunCompletedPayload {
            output: Some(json!({
                "user_input": user_input,
                "approved": approved,
                "result": result,
            })),
            summary: Some(result),
        }),
    );
}

#[cfg(test)]
#[path = "tests/runs_tests.rs"]
mod tests;
