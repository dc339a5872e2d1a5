use shared::{
    domain::{ButtonId, PendingInteraction, RunId},
    protocol::{EventKind, RunEvent, UiResponse},
};
use tracing::{debug, info, warn};

use crate::{
    api::RunApi,
    error::RunClientError,
    reducer::{reduce, RunView},
    render::render_run,
    stream::RunEventStream,
};

/// Client-side state of the current run.
///
/// A session is owned by a single driver loop; nothing in it is shared.
pub struct RunSession<A: RunApi> {
    api: A,
    run_id: Option<RunId>,
    log: Vec<RunEvent>,
    view: RunView,
}

impl<A: RunApi> RunSession<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            run_id: None,
            log: Vec::new(),
            view: RunView::default(),
        }
    }

    pub fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    pub fn log(&self) -> &[RunEvent] {
        &self.log
    }

    pub fn view(&self) -> &RunView {
        &self.view
    }

    pub fn pending(&self) -> Option<&PendingInteraction> {
        self.view.pending.as_ref()
    }

    pub fn render(&self) -> String {
        render_run(self.run_id.as_ref(), &self.view, &self.log)
    }

    fn reset(&mut self) {
        self.run_id = None;
        self.log.clear();
        self.view = RunView::default();
    }

    /// Clears all state from any previous run, creates a new run and opens its
    /// event stream.
    ///
    /// A stream returned by an earlier call is not closed here; dropping it is
    /// up to the caller.
    pub async fn start(&mut self, user_input: &str) -> Result<RunEventStream, RunClientError> {
        self.reset();
        let run_id = self.api.create_run(user_input).await?;
        self.run_id = Some(run_id.clone());
        info!(run_id = %run_id, "opening run event stream");
        self.api.open_events(&run_id).await
    }

    /// Appends the event to the log and folds it into the view.
    pub fn ingest(&mut self, event: RunEvent) {
        if self.run_id.as_ref() != Some(&event.run_id) {
            debug!(
                expected = ?self.run_id,
                run_id = %event.run_id,
                seq = event.seq,
                "event run id differs from active run"
            );
        }
        self.log.push(event);

        if let Some(event) = self.log.last() {
            if let EventKind::Other { event_type } = &event.kind {
                debug!(seq = event.seq, %event_type, "ignoring unrecognized event");
            }
            self.view = reduce(std::mem::take(&mut self.view), &event.kind);
        }
    }

    /// Drains the stream into the session until it closes.
    pub async fn consume(&mut self, events: &mut RunEventStream) -> Result<(), RunClientError> {
        while let Some(event) = events.next().await {
            self.ingest(event?);
        }
        Ok(())
    }

    /// Sends `{requestId, buttonId}` for the pending interaction, then clears
    /// it whether or not delivery succeeded.
    ///
    /// Returns `false` without sending anything when there is no active run or
    /// nothing is pending.
    pub async fn answer(&mut self, button_id: ButtonId) -> bool {
        let Some(run_id) = self.run_id.clone() else {
            return false;
        };
        let Some(pending) = self.view.pending.as_ref() else {
            return false;
        };

        let response = UiResponse {
            request_id: pending.request_id.clone(),
            button_id: Some(button_id),
        };
        match self.api.send_ui_response(&run_id, &response).await {
            Ok(()) => info!(
                run_id = %run_id,
                request_id = %response.request_id,
                "interaction response delivered"
            ),
            Err(err) => warn!(
                run_id = %run_id,
                request_id = %response.request_id,
                error = %err,
                "interaction response failed; dismissing prompt anyway"
            ),
        }
        self.view.pending = None;
        true
    }

    /// Asks the run owner to cancel the active run. The stream reports the
    /// outcome.
    pub async fn cancel(&self) -> Result<bool, RunClientError> {
        let Some(run_id) = &self.run_id else {
            return Ok(false);
        };
        self.api.cancel_run(run_id).await?;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
