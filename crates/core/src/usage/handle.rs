use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, warn};

use super::UsageEvent;

/// What travels over the usage channel: the event plus its emit time.
#[derive(Debug, Clone)]
pub struct UsageEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: UsageEvent,
}

impl From<UsageEvent> for UsageEnvelope {
    fn from(event: UsageEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Producer side of the usage log, held by adapters, runners and `main`.
///
/// A lost event is logged here and never surfaces as an error to the
/// component that emitted it.
#[derive(Clone)]
pub struct UsageHandle {
    tx: mpsc::Sender<UsageEnvelope>,
}

impl UsageHandle {
    pub fn new(tx: mpsc::Sender<UsageEnvelope>) -> Self {
        Self { tx }
    }

    /// Queue `event`, applying backpressure while the writer catches up.
    pub async fn emit(&self, event: UsageEvent) {
        if let Err(mpsc::error::SendError(lost)) = self.tx.send(event.into()).await {
            error!(event_type = lost.event.event_type(), "Usage writer gone, event lost");
        }
    }

    /// Queue `event` only if there is room right now.
    pub fn try_emit(&self, event: UsageEvent) -> bool {
        match self.tx.try_send(event.into()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(lost)) => {
                warn!(event_type = lost.event.event_type(), "Usage queue full, event dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(lost)) => {
                error!(event_type = lost.event.event_type(), "Usage writer gone, event lost");
                false
            }
        }
    }
}
