//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poller::PollerConfig;

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Delay between status polls (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Consecutive poll call failures tolerated before a stage fails.
    #[serde(default = "default_max_failures")]
    pub max_consecutive_poll_failures: u32,

    /// Provider for the base stage. Falls back to the video default.
    #[serde(default)]
    pub base_provider: Option<String>,

    /// Provider for the derived stage. Falls back to the video default.
    #[serde(default)]
    pub derived_provider: Option<String>,

    /// Dot-path the base asset URL is sent under in the derived request.
    #[serde(default = "default_derived_input_key")]
    pub derived_input_key: String,

    /// Dot-path the source image URL is sent under in the base request.
    #[serde(default = "default_source_image_key")]
    pub source_image_key: String,

    /// Resume in-progress stages when the orchestrator starts.
    #[serde(default = "default_true")]
    pub resume_on_start: bool,
}

fn default_poll_interval() -> u64 {
    5000 // 5 seconds
}

fn default_max_failures() -> u32 {
    3
}

fn default_derived_input_key() -> String {
    "metadata.character_url".to_string()
}

fn default_source_image_key() -> String {
    "image_url".to_string()
}

fn default_true() -> bool {
    true
}

impl OrchestratorConfig {
    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_consecutive_failures: self.max_consecutive_poll_failures,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_consecutive_poll_failures: default_max_failures(),
            base_provider: None,
            derived_provider: None,
            derived_input_key: default_derived_input_key(),
            source_image_key: default_source_image_key(),
            resume_on_start: true,
        }
    }
}
