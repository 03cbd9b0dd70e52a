//! Typed event channel between the scheduler and downstream subscribers
//! (alerting, notifications, websockets). Delivery is fire-and-forget.
use tokio::sync::broadcast;
use tracing::debug;

use crate::db::models::SpeedTestResult;

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    MonitoringStarted {
        target_id: String,
        interval_ms: i64,
    },
    MonitoringStopped {
        target_id: String,
    },
    SpeedTestCompleted {
        target_id: String,
        result: SpeedTestResult,
    },
    MonitoringError {
        target_id: String,
        error: String,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes without awaiting acknowledgment. An event with no
    /// subscribers is dropped silently.
    pub fn publish(&self, event: MonitorEvent) {
        if self.tx.send(event).is_err() {
            debug!("no event subscribers, dropping event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
