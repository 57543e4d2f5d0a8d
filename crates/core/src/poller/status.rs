//! Provider status vocabulary normalization and raw-body helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::get_by_path;

/// The tri-state every provider status is mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    Running,
    Succeeded,
    Failed,
}

impl CanonicalStatus {
    /// Case-insensitive; unknown or missing statuses are still running.
    pub fn from_provider(status: Option<&str>) -> Self {
        let Some(status) = status else {
            return CanonicalStatus::Running;
        };
        match status.trim().to_ascii_lowercase().as_str() {
            "completed" | "complete" | "success" | "succeeded" => CanonicalStatus::Succeeded,
            "failed" | "failure" | "error" | "cancelled" | "canceled" => CanonicalStatus::Failed,
            _ => CanonicalStatus::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CanonicalStatus::Running)
    }
}

/// Progress percentage at `progress` or `result.progress`, clamped to 0-100.
pub fn progress_of(raw: &Value) -> Option<f64> {
    ["progress", "result.progress"]
        .iter()
        .find_map(|path| get_by_path(raw, path).and_then(as_percent))
        .map(|p| p.clamp(0.0, 100.0))
}

fn as_percent(value: &Value) -> Option<f64> {
    let percent: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    percent.filter(|p| p.is_finite())
}

/// Best human-readable failure detail from a terminal response.
pub fn failure_detail(raw: &Value, status: Option<&str>) -> String {
    let text = |path: &str| {
        get_by_path(raw, path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    text("error.message")
        .or_else(|| text("fail_reason"))
        .or_else(|| text("error"))
        .or_else(|| text("message"))
        .or_else(|| status.map(String::from))
        .unwrap_or_else(|| "provider reported failure".to_string())
}
