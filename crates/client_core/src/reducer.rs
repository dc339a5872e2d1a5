//! Pure folding of run events into the step map, the pending interaction slot
//! and the run outcome.
//!
//! Every function takes its slot by value and returns the next value. Events
//! that reference an unknown step are ignored, and repeated `step.progress` /
//! `step.completed` events overwrite rather than accumulate.

use indexmap::IndexMap;
use shared::{
    domain::{PendingInteraction, RunOutcome, Step, StepId, StepStatus},
    protocol::EventKind,
};

pub type StepMap = IndexMap<StepId, Step>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunView {
    pub steps: StepMap,
    pub pending: Option<PendingInteraction>,
    pub outcome: RunOutcome,
}

pub fn reduce(view: RunView, event: &EventKind) -> RunView {
    RunView {
        steps: reduce_steps(view.steps, event),
        pending: reduce_pending(view.pending, event),
        outcome: reduce_outcome(view.outcome, event),
    }
}

pub fn reduce_steps(mut steps: StepMap, event: &EventKind) -> StepMap {
    match event {
        EventKind::StepStarted(payload) => {
            steps.insert(
                payload.step_id.clone(),
                Step::started(payload.step_id.clone(), payload.title.clone()),
            );
        }
        EventKind::StepProgress(payload) => {
            if let Some(step) = steps.get_mut(&payload.step_id) {
                step.progress = payload.progress;
                step.message = payload.message.clone();
            }
        }
        EventKind::StepCompleted(payload) => {
            if let Some(step) = steps.get_mut(&payload.step_id) {
                step.status = StepStatus::Completed;
                step.progress = Some(1.0);
                step.output = payload.output.clone();
            }
        }
        EventKind::StepFailed(payload) => {
            if let Some(step) = steps.get_mut(&payload.step_id) {
                step.status = StepStatus::Failed;
                if let Some(error) = &payload.error {
                    step.error = Some(error.message.clone());
                }
            }
        }
        _ => {}
    }
    steps
}

pub fn reduce_pending(
    pending: Option<PendingInteraction>,
    event: &EventKind,
) -> Option<PendingInteraction> {
    match event {
        EventKind::UiRequest(request) => Some(request.clone()),
        _ => pending,
    }
}

pub fn reduce_outcome(outcome: RunOutcome, event: &EventKind) -> RunOutcome {
    match event {
        EventKind::RunCompleted(payload) => RunOutcome::Completed {
            summary: payload.summary.clone(),
        },
        EventKind::RunFailed(payload) => RunOutcome::Failed {
            message: payload.error.as_ref().map(|error| error.message.clone()),
        },
        EventKind::RunCanceled(payload) => RunOutcome::Canceled {
            reason: payload.reason.clone(),
        },
        _ => outcome,
    }
}

#[cfg(test)]
#[path = "tests/reducer_tests.rs"]
mod tests;
