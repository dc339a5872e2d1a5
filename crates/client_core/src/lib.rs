//! Client-side reconciliation of a run's event stream: open a run, fold its
//! events into step and interaction state, and answer pending prompts.

pub mod api;
pub mod error;
pub mod reducer;
pub mod render;
pub mod session;
pub mod stream;

pub use api::{HttpRunApi, RunApi};
pub use error::RunClientError;
pub use reducer::{reduce, RunView, StepMap};
pub use session::RunSession;
pub use stream::RunEventStream;

