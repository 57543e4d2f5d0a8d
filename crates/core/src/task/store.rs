//! Task storage trait.

use std::fmt;

use super::{Stage, TaskRecord};

/// Error type for task storage.
#[derive(Debug)]
pub enum TaskError {
    /// Record not found.
    NotFound(String),
    /// The write would break a record invariant.
    InvalidState {
        record_id: String,
        current_state: String,
        operation: String,
    },
    /// Database error.
    Database(String),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::NotFound(id) => write!(f, "Task record not found: {}", id),
            TaskError::InvalidState {
                record_id,
                current_state,
                operation,
            } => write!(
                f,
                "Cannot {} task record {}: current state is {}",
                operation, record_id, current_state
            ),
            TaskError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for TaskError {}

/// Persistence for task records.
///
/// `save` is an upsert keyed by record id. Implementations reject writes
/// that move the status backwards or drop log lines.
pub trait TaskStore: Send + Sync {
    /// Newest record for the entity, optionally limited to one stage.
    fn load_latest(&self, entity_id: &str, stage: Option<Stage>)
        -> Result<Option<TaskRecord>, TaskError>;

    /// The entity's in-progress record, if any.
    fn load_in_progress(&self, entity_id: &str) -> Result<Option<TaskRecord>, TaskError>;

    fn save(&self, record: &TaskRecord) -> Result<(), TaskError>;

    fn get(&self, id: &str) -> Result<Option<TaskRecord>, TaskError>;

    /// All records for the entity, newest first.
    fn list_for_entity(&self, entity_id: &str) -> Result<Vec<TaskRecord>, TaskError>;

    /// Every in-progress record, oldest first.
    fn list_in_progress(&self) -> Result<Vec<TaskRecord>, TaskError>;
}

/// Check that `next` may replace `current`.
pub fn check_update(current: &TaskRecord, next: &TaskRecord) -> Result<(), TaskError> {
    if !current.status.can_transition_to(next.status) {
        return Err(TaskError::InvalidState {
            record_id: current.id.clone(),
            current_state: current.status.to_string(),
            operation: format!("move to {}", next.status),
        });
    }
    let kept = next.logs.len() >= current.logs.len()
        && current
            .logs
            .iter()
            .zip(&next.logs)
            .all(|(a, b)| a.message == b.message && a.time == b.time);
    if !kept {
        return Err(TaskError::InvalidState {
            record_id: current.id.clone(),
            current_state: format!("{} log entries", current.logs.len()),
            operation: "rewrite logs of".to_string(),
        });
    }
    Ok(())
}
