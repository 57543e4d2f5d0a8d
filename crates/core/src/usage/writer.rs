use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{UsageEnvelope, UsageHandle, UsageRecord, UsageStore};

impl From<UsageEnvelope> for UsageRecord {
    /// Index columns are lifted from the event; the store assigns `id`.
    fn from(envelope: UsageEnvelope) -> Self {
        let UsageEnvelope { timestamp, event } = envelope;
        UsageRecord {
            id: 0,
            timestamp,
            event_type: event.event_type().to_string(),
            task_id: event.task_id().map(String::from),
            entity_id: event.entity_id().map(String::from),
            data: event,
        }
    }
}

/// Totals reported once the writer has drained its channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub stored: u64,
    pub failed: u64,
}

/// Consumer side of the usage log. Owns the receiver and the store.
pub struct UsageWriter {
    rx: mpsc::Receiver<UsageEnvelope>,
    store: Arc<dyn UsageStore>,
}

impl UsageWriter {
    pub fn new(rx: mpsc::Receiver<UsageEnvelope>, store: Arc<dyn UsageStore>) -> Self {
        Self { rx, store }
    }

    /// Persist envelopes in arrival order. Returns when the last
    /// [`UsageHandle`] is gone and the queue is empty.
    ///
    /// A failed insert is logged and skipped; it never stops the drain.
    pub async fn run(mut self) -> DrainSummary {
        info!("Usage writer started");
        let mut summary = DrainSummary::default();

        while let Some(envelope) = self.rx.recv().await {
            let record = UsageRecord::from(envelope);
            match self.store.insert(&record) {
                Ok(id) => {
                    summary.stored += 1;
                    debug!(id, event_type = %record.event_type, "Usage event stored");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(event_type = %record.event_type, error = %e, "Usage event lost");
                }
            }
        }

        info!(
            stored = summary.stored,
            failed = summary.failed,
            "Usage channel closed"
        );
        summary
    }
}

/// Wire a bounded channel between a new [`UsageHandle`] and its writer.
///
/// `buffer_size` bounds the queue; `emit` waits once it is full.
pub fn create_usage_log(store: Arc<dyn UsageStore>, buffer_size: usize) -> (UsageHandle, UsageWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (UsageHandle::new(tx), UsageWriter::new(rx, store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::{SqliteUsageStore, UsageError, UsageEvent, UsageFilter};

    struct BrokenStore;

    impl UsageStore for BrokenStore {
        fn insert(&self, _record: &UsageRecord) -> Result<i64, UsageError> {
            Err(UsageError::Database("disk full".to_string()))
        }

        fn query(&self, _filter: &UsageFilter) -> Result<Vec<UsageRecord>, UsageError> {
            Ok(Vec::new())
        }

        fn count(&self, _filter: &UsageFilter) -> Result<i64, UsageError> {
            Ok(0)
        }
    }

    fn stopped() -> UsageEvent {
        UsageEvent::ServiceStopped {
            reason: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_writer_persists_until_handles_drop() {
        let store = Arc::new(SqliteUsageStore::in_memory().unwrap());
        let (handle, writer) = create_usage_log(store.clone(), 8);
        let task = tokio::spawn(writer.run());

        handle
            .emit(UsageEvent::ServiceStarted {
                version: "0.1.0".to_string(),
                config_hash: "abc".to_string(),
            })
            .await;
        let second = handle.clone();
        second.emit(stopped()).await;

        drop(handle);
        assert!(!task.is_finished());
        drop(second);
        let summary = task.await.unwrap();
        assert_eq!(summary, DrainSummary { stored: 2, failed: 0 });

        let records = store.query(&UsageFilter::new()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, "service_stopped");
        assert_eq!(records[1].event_type, "service_started");
    }

    #[tokio::test]
    async fn test_writer_keeps_draining_after_insert_errors() {
        let (handle, writer) = create_usage_log(Arc::new(BrokenStore), 8);
        let task = tokio::spawn(writer.run());

        for _ in 0..3 {
            handle.emit(stopped()).await;
        }
        drop(handle);

        let summary = task.await.unwrap();
        assert_eq!(summary, DrainSummary { stored: 0, failed: 3 });
    }

    #[test]
    fn test_record_from_envelope_lifts_index_columns() {
        let event = UsageEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc".to_string(),
        };
        let record = UsageRecord::from(UsageEnvelope {
            timestamp: chrono::Utc::now(),
            event: event.clone(),
        });

        assert_eq!(record.id, 0);
        assert_eq!(record.event_type, "service_started");
        assert_eq!(record.task_id, None);
        assert_eq!(record.data, event);
    }
}
