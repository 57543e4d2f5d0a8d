use thiserror::Error;

use super::UsageRecord;

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for querying usage records
#[derive(Debug, Clone, Default)]
pub struct UsageFilter {
    pub task_id: Option<String>,
    pub entity_id: Option<String>,
    pub event_type: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl UsageFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Storage for usage records
pub trait UsageStore: Send + Sync {
    /// Insert a record, returns the assigned ID
    fn insert(&self, record: &UsageRecord) -> Result<i64, UsageError>;

    /// Newest first
    fn query(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>, UsageError>;

    fn count(&self, filter: &UsageFilter) -> Result<i64, UsageError>;
}
