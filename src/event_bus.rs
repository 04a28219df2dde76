//! Event Bus (C9): three non-blocking outputs per emitted event —
//! persist, broadcast to WebSocket subscribers, optional callback
//! (§4.8). No producer ever blocks on a slow subscriber.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::event_store::EventStore;
use crate::models::{AlarmEvent, AlarmStatus};

/// Bounded per-subscriber outbound queue depth; overflow drops the
/// oldest non-firing events first and logs a warning (§5 backpressure).
const SUBSCRIBER_QUEUE_DEPTH: usize = 1024;

type Callback = Arc<dyn Fn(&AlarmEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<AlarmEvent>,
}

pub struct EventBus {
    event_store: Arc<EventStore>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_subscriber_id: AtomicU64,
    callback: RwLock<Option<Callback>>,
}

impl EventBus {
    pub fn new(event_store: Arc<EventStore>) -> Arc<Self> {
        Arc::new(Self {
            event_store,
            subscribers: RwLock::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(1),
            callback: RwLock::new(None),
        })
    }

    pub async fn set_callback(&self, callback: impl Fn(&AlarmEvent) + Send + Sync + 'static) {
        *self.callback.write().await = Some(Arc::new(callback));
    }

    /// Registers a new WebSocket subscriber and returns the receiving
    /// end of its bounded queue.
    pub async fn subscribe(&self) -> (u64, mpsc::Receiver<AlarmEvent>) {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.subscribers.write().await.push(Subscriber { id, sender: tx });
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.subscribers.write().await.retain(|s| s.id != id);
    }

    /// Persist → broadcast → callback, in order, none of which blocks
    /// the caller on a slow subscriber.
    pub async fn publish(&self, event: AlarmEvent) {
        if let Err(e) = self.event_store.process(&event).await {
            tracing::error!(fingerprint = %event.fingerprint, error = %e, "failed to persist alarm event");
        }

        self.broadcast(&event).await;

        if let Some(callback) = self.callback.read().await.clone() {
            callback(&event);
        }
    }

    async fn broadcast(&self, event: &AlarmEvent) {
        let subscribers = self.subscribers.read().await;
        for sub in subscribers.iter() {
            match sub.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if event.status == AlarmStatus::Firing {
                        // Firing events are never silently dropped: evict
                        // the oldest queued event for this subscriber and
                        // retry once. If the oldest was itself firing, the
                        // subscriber simply misses a stale notification in
                        // favor of the newest one, which is still delivered.
                        let _ = sub.sender.try_recv();
                        if let Err(e) = sub.sender.try_send(event.clone()) {
                            tracing::warn!(subscriber = sub.id, error = %e, "subscriber queue still full after eviction, dropping firing event");
                        }
                    } else {
                        tracing::warn!(subscriber = sub.id, "subscriber queue full, dropping non-firing event");
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Reaped on next unsubscribe(); the connection handler drives that.
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{MySqlConnector, Pool, PoolConfig};

    async fn fake_event_store() -> Arc<EventStore> {
        // No real MySQL in this environment; construct a pool whose
        // connector never succeeds so `process` logs and moves on,
        // exercising the "persistence failure never blocks" path.
        let pool = Pool::new(MySqlConnector::new("mysql://unused@localhost/unused"), PoolConfig {
            initial_connections: 0,
            min_connections: 0,
            acquire_timeout: std::time::Duration::from_millis(10),
            ..PoolConfig::default()
        })
        .await
        .unwrap();
        Arc::new(EventStore::new(pool))
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let bus = EventBus::new(fake_event_store().await);
        let (_id, mut rx) = bus.subscribe().await;

        let event = AlarmEvent {
            fingerprint: "alertname=Test".to_string(),
            status: crate::models::AlarmStatus::Firing,
            labels: Default::default(),
            annotations: Default::default(),
            starts_at: chrono::Utc::now(),
            ends_at: None,
            generator_url: "test".to_string(),
        };
        bus.broadcast(&event).await;

        let received = rx.try_recv().unwrap();
        assert_eq!(received.fingerprint, "alertname=Test");
    }

    #[tokio::test]
    async fn callback_is_invoked() {
        let bus = EventBus::new(fake_event_store().await);
        let seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen_clone = seen.clone();
        bus.set_callback(move |_event| {
            seen_clone.store(true, Ordering::SeqCst);
        })
        .await;

        let event = AlarmEvent {
            fingerprint: "alertname=Test".to_string(),
            status: crate::models::AlarmStatus::Firing,
            labels: Default::default(),
            annotations: Default::default(),
            starts_at: chrono::Utc::now(),
            ends_at: None,
            generator_url: "test".to_string(),
        };
        bus.publish(event).await;
        assert!(seen.load(Ordering::SeqCst));
    }
}
