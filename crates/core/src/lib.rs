pub mod cache;
pub mod config;
pub mod credentials;
pub mod descriptor;
pub mod metrics;
pub mod orchestrator;
pub mod poller;
pub mod provider;
pub mod task;
pub mod testing;
pub mod usage;

pub use cache::{
    ArtifactCache, HttpResourceFetcher, ResourceFetcher, SqliteUploadRecordStore, UploadRecordStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    SanitizedConfig,
};
pub use orchestrator::{
    BaseStageRequest, DerivedStageRequest, OrchestratorConfig, OrchestratorError,
    PipelineOrchestrator, SourceImage, StageHandle,
};
pub use provider::{
    HttpProviderAdapter, ProviderAdapter, ProviderConfig, ProviderRegistry, ToolKind,
};
pub use task::{SqliteTaskStore, Stage, TaskRecord, TaskStatus, TaskStore};
pub use usage::{
    create_usage_log, SqliteUsageStore, UsageEvent, UsageFilter, UsageHandle, UsageRecord,
    UsageStore,
};
