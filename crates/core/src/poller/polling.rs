//! The poll-until-terminal loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::provider::ProviderAdapter;

use super::status::{failure_detail, progress_of, CanonicalStatus};

/// Loop timing and failure tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Consecutive call failures swallowed before the loop gives up.
    pub max_consecutive_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            max_consecutive_failures: 3,
        }
    }
}

/// Something the loop saw on a non-terminal tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// The provider's status string changed.
    StatusChanged { status: String },
    /// The provider reported progress on a running tick.
    Progress { progress: f64 },
    /// A poll call failed and will be retried.
    TransientFailure {
        attempt: u32,
        max: u32,
        error: String,
    },
}

/// Receives loop events as they happen.
#[async_trait]
pub trait PollObserver: Send + Sync {
    async fn on_event(&self, event: PollEvent);
}

/// Observer that ignores everything.
pub struct NoopObserver;

#[async_trait]
impl PollObserver for NoopObserver {
    async fn on_event(&self, _event: PollEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The provider said the job failed or was cancelled.
    ProviderReported,
    /// Too many consecutive poll calls failed.
    Transport,
    /// A poll call failed in a way retrying cannot fix (bad credentials,
    /// malformed descriptor, client error).
    Permanent,
}

/// How a loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Succeeded {
        video_url: Option<String>,
        thumbnail_url: Option<String>,
        raw: Value,
    },
    Failed {
        reason: String,
        kind: FailureKind,
    },
}

/// Polls one remote task until it reaches a terminal state.
///
/// There is no cancel signal: the loop ends on a terminal status, on
/// exhausting the failure budget, or with the process.
pub struct PollingLoop {
    adapter: Arc<dyn ProviderAdapter>,
    config: PollerConfig,
}

impl PollingLoop {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, config: PollerConfig) -> Self {
        Self { adapter, config }
    }

    pub async fn run(&self, task_id: &str, observer: &dyn PollObserver) -> PollOutcome {
        let provider = self.adapter.provider_id().to_string();
        let mut consecutive_failures = 0u32;
        let mut last_status: Option<String> = None;

        info!(provider = %provider, task_id = %task_id, "Polling started");

        loop {
            match self.adapter.poll_status(task_id).await {
                Ok(snapshot) => {
                    consecutive_failures = 0;
                    let canonical = CanonicalStatus::from_provider(snapshot.status.as_deref());
                    debug!(
                        task_id = %task_id,
                        status = ?snapshot.status,
                        canonical = ?canonical,
                        "Poll tick"
                    );

                    match canonical {
                        CanonicalStatus::Succeeded => {
                            metrics::POLL_TICKS.with_label_values(&["succeeded"]).inc();
                            info!(task_id = %task_id, "Remote task succeeded");
                            return PollOutcome::Succeeded {
                                video_url: snapshot.video_url,
                                thumbnail_url: snapshot.thumbnail_url,
                                raw: snapshot.raw,
                            };
                        }
                        CanonicalStatus::Failed => {
                            metrics::POLL_TICKS.with_label_values(&["failed"]).inc();
                            let reason =
                                failure_detail(&snapshot.raw, snapshot.status.as_deref());
                            info!(task_id = %task_id, reason = %reason, "Remote task failed");
                            return PollOutcome::Failed {
                                reason,
                                kind: FailureKind::ProviderReported,
                            };
                        }
                        CanonicalStatus::Running => {
                            metrics::POLL_TICKS.with_label_values(&["running"]).inc();
                            if let Some(status) = snapshot.status {
                                if last_status.as_deref() != Some(status.as_str()) {
                                    last_status = Some(status.clone());
                                    observer.on_event(PollEvent::StatusChanged { status }).await;
                                }
                            }
                            if let Some(progress) = progress_of(&snapshot.raw) {
                                observer.on_event(PollEvent::Progress { progress }).await;
                            }
                        }
                    }
                }
                Err(e) if !e.is_transient() => {
                    metrics::POLL_TICKS
                        .with_label_values(&["permanent_error"])
                        .inc();
                    warn!(task_id = %task_id, error = %e, "Status poll rejected");
                    return PollOutcome::Failed {
                        reason: format!("status polling failed: {}", e),
                        kind: FailureKind::Permanent,
                    };
                }
                Err(e) => {
                    metrics::POLL_TICKS
                        .with_label_values(&["transient_error"])
                        .inc();
                    consecutive_failures += 1;
                    if consecutive_failures > self.config.max_consecutive_failures {
                        warn!(
                            task_id = %task_id,
                            failures = consecutive_failures,
                            error = %e,
                            "Polling gave up"
                        );
                        return PollOutcome::Failed {
                            reason: format!(
                                "status polling failed {} times in a row: {}",
                                consecutive_failures, e
                            ),
                            kind: FailureKind::Transport,
                        };
                    }
                    warn!(
                        task_id = %task_id,
                        attempt = consecutive_failures,
                        error = %e,
                        "Status poll failed, will retry"
                    );
                    observer
                        .on_event(PollEvent::TransientFailure {
                            attempt: consecutive_failures,
                            max: self.config.max_consecutive_failures,
                            error: e.to_string(),
                        })
                        .await;
                }
            }

            tokio::time::sleep(self.config.interval).await;
        }
    }
}
