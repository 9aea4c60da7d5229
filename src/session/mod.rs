//! Mode session controller.

mod controller;
mod types;

pub use controller::{
    Completion, PendingRun, RunOutcome, RunOutput, RunRequest, SessionController,
    LAST_GENERATED_FILE_NAME,
};
pub use types::{Mode, RunState, Session, SessionId};
