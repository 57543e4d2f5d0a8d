//! Task record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Stage and Status
// ============================================================================

/// Step of the two-stage generation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reference clip generated from a source image.
    Base,
    /// Asset extracted from the base clip.
    Derived,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Base => "base",
            Stage::Derived => "derived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "base" => Some(Stage::Base),
            "derived" => Some(Stage::Derived),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a task record. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::InProgress)
    }

    /// Staying put is allowed; leaving a terminal status is not.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        *self == next || *self == TaskStatus::InProgress
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Task Record
// ============================================================================

/// One progress/transcript line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub message: String,
    /// Percent complete, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

/// Persisted state of one orchestration unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    /// Owning entity (a character).
    pub entity_id: String,
    pub stage: Stage,
    pub provider_id: String,
    /// Remote task id returned by `generate`.
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Local reference produced by the artifact cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Orchestrator session whose polling loop owns this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poller_session: Option<String>,
    /// When the record was last picked up again after a restart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(
        entity_id: impl Into<String>,
        stage: Stage,
        provider_id: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            stage,
            provider_id: provider_id.into(),
            task_id: task_id.into(),
            status: TaskStatus::InProgress,
            video_url: None,
            thumbnail_url: None,
            local_ref: None,
            error: None,
            created_at: now,
            updated_at: now,
            logs: Vec::new(),
            poller_session: None,
            resumed_at: None,
        }
    }

    /// Append a log line. Timestamps never go backwards.
    pub fn append_log(&mut self, message: impl Into<String>, progress: Option<f64>) {
        let mut time = Utc::now();
        if let Some(last) = self.logs.last() {
            if time < last.time {
                time = last.time;
            }
        }
        self.logs.push(LogEntry {
            time,
            message: message.into(),
            progress: progress.map(|p| p.clamp(0.0, 100.0)),
        });
        self.updated_at = time.max(self.updated_at);
    }

    pub fn last_log(&self) -> Option<&LogEntry> {
        self.logs.last()
    }

    /// Most recent progress value reported.
    pub fn progress(&self) -> Option<f64> {
        if self.status == TaskStatus::Completed {
            return Some(100.0);
        }
        self.logs.iter().rev().find_map(|l| l.progress)
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == TaskStatus::InProgress
    }

    /// The best reference to the artifact: local copy first, then remote URL.
    pub fn artifact_ref(&self) -> Option<&str> {
        self.local_ref.as_deref().or(self.video_url.as_deref())
    }
}
