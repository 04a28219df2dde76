//! Liveness Monitor (C8): derives `online`/`offline` from heartbeat
//! age and emits synthetic `NodeOffline` alarm events on transition
//! (§4.6).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;

use crate::event_bus::EventBus;
use crate::models::{AlarmEvent, AlarmStatus, NodeStatus};
use crate::node_registry::NodeRegistry;
use crate::rule_engine::fingerprint::fingerprint;

/// Online iff time since last heartbeat is at most this.
pub const OFFLINE_THRESHOLD: std::time::Duration = std::time::Duration::from_secs(20);

pub struct LivenessMonitor {
    registry: Arc<NodeRegistry>,
    event_bus: Arc<EventBus>,
    generator_url: String,
}

impl LivenessMonitor {
    pub fn new(registry: Arc<NodeRegistry>, event_bus: Arc<EventBus>, generator_url: impl Into<String>) -> Self {
        Self { registry, event_bus, generator_url: generator_url.into() }
    }

    /// Runs at a fixed 1 s cadence until `running` clears.
    pub async fn run(&self, running: Arc<AtomicBool>) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        while running.load(Ordering::Acquire) {
            ticker.tick().await;
            if !running.load(Ordering::Acquire) {
                break;
            }
            self.tick().await;
        }
    }

    async fn tick(&self) {
        let now = Instant::now();
        for (host_ip, last_heartbeat, status) in self.registry.heartbeat_snapshot().await {
            let dt = now.saturating_duration_since(last_heartbeat);
            let expected = if dt <= OFFLINE_THRESHOLD { NodeStatus::Online } else { NodeStatus::Offline };
            if expected == status {
                continue;
            }

            self.registry.update_status(&host_ip, expected).await;

            let mut labels = BTreeMap::new();
            labels.insert("alertname".to_string(), "NodeOffline".to_string());
            labels.insert("host_ip".to_string(), host_ip.clone());
            let fp = fingerprint("NodeOffline", &labels);
            let now_utc = Utc::now();

            let event = match expected {
                NodeStatus::Offline => AlarmEvent {
                    fingerprint: fp,
                    status: AlarmStatus::Firing,
                    labels,
                    annotations: BTreeMap::new(),
                    starts_at: now_utc,
                    ends_at: None,
                    generator_url: self.generator_url.clone(),
                },
                NodeStatus::Online => AlarmEvent {
                    fingerprint: fp,
                    status: AlarmStatus::Resolved,
                    labels,
                    annotations: BTreeMap::new(),
                    starts_at: now_utc,
                    ends_at: Some(now_utc),
                    generator_url: self.generator_url.clone(),
                },
            };
            self.event_bus.publish(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_boundary_is_inclusive() {
        // `dt <= 20s` is still online; `20s + epsilon` is offline (§8).
        assert!(std::time::Duration::from_secs(20) <= OFFLINE_THRESHOLD);
        assert!(std::time::Duration::from_millis(20_001) > OFFLINE_THRESHOLD);
    }
}
