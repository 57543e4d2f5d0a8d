use std::sync::Arc;

use genloom_core::{Config, PipelineOrchestrator, SanitizedConfig, UsageStore};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: PipelineOrchestrator,
    usage_store: Arc<dyn UsageStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: PipelineOrchestrator,
        usage_store: Arc<dyn UsageStore>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            usage_store,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    pub fn usage_store(&self) -> &dyn UsageStore {
        self.usage_store.as_ref()
    }
}
