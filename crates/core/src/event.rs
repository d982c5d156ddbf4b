//! Domain event system: observe the engine without callbacks.
//!
//! The engine publishes an event whenever something interesting happens to
//! a thread's context. Hosts subscribe to drive progress indicators or
//! metrics; nothing inside the engine depends on a subscriber existing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContextEvent {
    /// A build was answered from the cache
    CacheHit {
        thread_id: String,
        version: u64,
        timestamp: DateTime<Utc>,
    },

    /// Older turns were replaced by a summary or truncated
    CompressionApplied {
        thread_id: String,
        tokens_before: usize,
        tokens_after: usize,
        timestamp: DateTime<Utc>,
    },

    /// A fresh snapshot was assembled and cached
    SnapshotBuilt {
        thread_id: String,
        version: u64,
        current_tokens: usize,
        memories: usize,
        timestamp: DateTime<Utc>,
    },

    /// Cached snapshots for a thread were dropped
    CacheInvalidated {
        thread_id: String,
        entries_removed: usize,
        timestamp: DateTime<Utc>,
    },

    /// A handoff package was written to the shared store
    HandoffPublished {
        source_thread_id: String,
        target_thread_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for context events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<ContextEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: ContextEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ContextEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(ContextEvent::SnapshotBuilt {
            thread_id: "t1".into(),
            version: 3,
            current_tokens: 120,
            memories: 2,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            ContextEvent::SnapshotBuilt {
                thread_id, version, ..
            } => {
                assert_eq!(thread_id, "t1");
                assert_eq!(*version, 3);
            }
            _ => panic!("Expected SnapshotBuilt event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(ContextEvent::CacheInvalidated {
            thread_id: "t1".into(),
            entries_removed: 0,
            timestamp: Utc::now(),
        });
    }
}
