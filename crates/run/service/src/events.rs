//! Run lifecycle events
//!
//! Every accepted lifecycle operation is published on a broadcast channel.
//! Publishing never blocks and never fails: with no subscribers the event is
//! simply dropped.

use chrono::{DateTime, Utc};
use run_types::RunId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// A lifecycle change of one run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Created { run_id: RunId },
    Opened { run_id: RunId },
    Started { run_id: RunId },
    Paused { run_id: RunId },
    Resumed { run_id: RunId },
    Cancelled { run_id: RunId },
    Deleted { run_id: RunId },
}

impl RunEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::Created { run_id }
            | Self::Opened { run_id }
            | Self::Started { run_id }
            | Self::Paused { run_id }
            | Self::Resumed { run_id }
            | Self::Cancelled { run_id }
            | Self::Deleted { run_id } => run_id,
        }
    }
}

/// Event with delivery metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunEventEnvelope {
    pub id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: RunEvent,
}

/// Fan-out channel for run events
pub struct RunEventBus {
    tx: broadcast::Sender<RunEventEnvelope>,
}

impl RunEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish(&self, event: RunEvent) {
        let envelope = RunEventEnvelope {
            id: uuid::Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        };
        debug!(event_id = %envelope.id, run_id = %envelope.event.run_id(), "Publishing run event");
        // Ignore errors: no subscribers is fine
        let _ = self.tx.send(envelope);
    }
}

impl Default for RunEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = RunEventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(RunEvent::Created {
            run_id: RunId::new("r1"),
        });
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = RunEventBus::new(4);
        let mut rx = bus.subscribe();
        bus.publish(RunEvent::Started {
            run_id: RunId::new("r1"),
        });
        let envelope = rx.recv().await.unwrap();
        assert_eq!(
            envelope.event,
            RunEvent::Started {
                run_id: RunId::new("r1")
            }
        );
        assert_eq!(envelope.event.run_id().as_str(), "r1");
    }

    #[test]
    fn test_event_serialization() {
        let event = RunEvent::Paused {
            run_id: RunId::new("r1"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "paused");
        assert_eq!(json["run_id"], "r1");
    }
}
