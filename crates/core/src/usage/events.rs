use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::ToolKind;
use crate::task::Stage;

/// Longest request/response excerpt kept in a usage event.
pub const MAX_BODY_EXCERPT: usize = 2048;

/// Cut `text` to at most [`MAX_BODY_EXCERPT`] characters.
pub fn excerpt(text: &str) -> String {
    if text.chars().count() <= MAX_BODY_EXCERPT {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_BODY_EXCERPT).collect();
    cut.push_str("...");
    cut
}

/// Which adapter operation a call was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOperation {
    Generate,
    PollStatus,
    Upload,
}

impl CallOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOperation::Generate => "generate",
            CallOperation::PollStatus => "poll_status",
            CallOperation::Upload => "upload",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Failure,
}

/// Usage event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UsageEvent {
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    /// One HTTP call to a provider.
    ProviderCall {
        provider_id: String,
        tool_kind: ToolKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        operation: CallOperation,
        outcome: CallOutcome,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        http_status: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Remote task id, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<String>,
    },

    // Task lifecycle
    TaskSubmitted {
        record_id: String,
        entity_id: String,
        stage: Stage,
        provider_id: String,
        task_id: String,
    },
    TaskResumed {
        record_id: String,
        entity_id: String,
        stage: Stage,
        task_id: String,
        session: String,
    },
    TaskCompleted {
        record_id: String,
        entity_id: String,
        stage: Stage,
        task_id: String,
        video_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_ref: Option<String>,
    },
    TaskFailed {
        record_id: String,
        entity_id: String,
        stage: Stage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        error: String,
    },

    ArtifactCached {
        cache_key: String,
        remote_url: String,
        local_ref: String,
        /// False when an existing local copy was reused.
        downloaded: bool,
    },
}

impl UsageEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::ProviderCall { .. } => "provider_call",
            Self::TaskSubmitted { .. } => "task_submitted",
            Self::TaskResumed { .. } => "task_resumed",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskFailed { .. } => "task_failed",
            Self::ArtifactCached { .. } => "artifact_cached",
        }
    }

    /// Remote task id the event concerns, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::ProviderCall { task_id, .. } | Self::TaskFailed { task_id, .. } => {
                task_id.as_deref()
            }
            Self::TaskSubmitted { task_id, .. }
            | Self::TaskResumed { task_id, .. }
            | Self::TaskCompleted { task_id, .. } => Some(task_id),
            Self::ArtifactCached { cache_key, .. } => Some(cache_key),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }

    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::TaskSubmitted { entity_id, .. }
            | Self::TaskResumed { entity_id, .. }
            | Self::TaskCompleted { entity_id, .. }
            | Self::TaskFailed { entity_id, .. } => Some(entity_id),
            _ => None,
        }
    }
}

/// A stored usage event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub task_id: Option<String>,
    pub entity_id: Option<String>,
    pub data: UsageEvent,
}
