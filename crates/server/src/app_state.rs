use crate::runs::{RunStore, RunnerSettings};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) runs: RunStore,
    pub(crate) runner: RunnerSettings,
}
