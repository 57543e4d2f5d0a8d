//! Polling remote tasks to a terminal state.

mod polling;
mod status;

pub use polling::{
    FailureKind, NoopObserver, PollEvent, PollObserver, PollOutcome, PollerConfig, PollingLoop,
};
pub use status::{failure_detail, progress_of, CanonicalStatus};
