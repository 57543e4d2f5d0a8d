//! Pipeline orchestrator.
//!
//! Runs the two-stage generation pipeline per entity:
//! - **Base**: source image (uploaded if local) plus prompt, polled to a clip
//! - **Derived**: the base clip fed to a second generation, polled likewise
//!
//! In-progress stages survive restarts: `resume_all` re-enters polling for
//! records owned by an earlier session without submitting again.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::{PipelineOrchestrator, UpdateCallback};
pub use types::{
    BaseStageRequest, DerivedStageRequest, OrchestratorError, SourceImage, StageHandle,
};
