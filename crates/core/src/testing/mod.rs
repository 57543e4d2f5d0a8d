//! Testing utilities and mock implementations.
//!
//! Mocks for the two external seams of the core (provider HTTP APIs and
//! resource downloads), so pipelines can run end to end without a network.
//!
//! # Example
//!
//! ```rust,ignore
//! use genloom_core::testing::{MockPoll, MockProviderAdapter, MockResourceFetcher};
//!
//! let adapter = Arc::new(MockProviderAdapter::new("sora"));
//! adapter.push_poll(MockPoll::completed("https://cdn.example/clip.mp4")).await;
//!
//! let fetcher = Arc::new(MockResourceFetcher::new());
//! // Build a PipelineOrchestrator around them...
//! ```

mod mock_fetcher;
mod mock_provider;

pub use mock_fetcher::MockResourceFetcher;
pub use mock_provider::{MockPoll, MockProviderAdapter};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;

    use crate::descriptor::EndpointPreset;
    use crate::provider::{ProviderConfig, ToolKind};
    use crate::task::{Stage, TaskRecord, TaskStatus};

    /// A Sora-preset video provider pointing at `base_url`.
    pub fn video_provider(id: &str, base_url: &str) -> ProviderConfig {
        ProviderConfig::new(id, ToolKind::VideoGen, base_url)
            .with_api_key("test-key")
            .with_preset(EndpointPreset::Sora)
            .with_model("sora-2")
    }

    /// An in-progress record as a previous process would have left it.
    pub fn orphaned_record(entity_id: &str, provider_id: &str, task_id: &str) -> TaskRecord {
        let mut record = TaskRecord::new(entity_id, Stage::Base, provider_id, task_id);
        record.poller_session = Some("previous-session".to_string());
        record.append_log(format!("submitted to {} as task {}", provider_id, task_id), Some(0.0));
        record
    }

    /// A completed base record with a remote video URL.
    pub fn completed_base(entity_id: &str, provider_id: &str, video_url: &str) -> TaskRecord {
        let mut record = TaskRecord::new(
            entity_id,
            Stage::Base,
            provider_id,
            format!("done-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default()),
        );
        record.video_url = Some(video_url.to_string());
        record.status = TaskStatus::Completed;
        record.append_log("completed", Some(100.0));
        record
    }
}
