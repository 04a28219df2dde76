//! Per-fingerprint state machine and reconciliation (§4.3).

use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::models::{AlarmEvent, AlarmInstance, AlarmStatus, InstanceState};
use crate::rule_engine::fingerprint::rule_prefix;
use crate::rule_engine::template;

use super::AlarmRule;

/// One matched row for a tick: its label set (tag columns + `host_ip`)
/// and the primary metric's last observed value.
pub struct ActiveRow {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Thread-safe map of fingerprint → transient instance, mutated only
/// by the evaluator (§5: "only the evaluator mutates").
#[derive(Default)]
pub struct InstanceMap {
    instances: Mutex<HashMap<String, AlarmInstance>>,
}

impl InstanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile one rule's active set against the map, returning any
    /// events that should be emitted this tick (§4.3 algorithm).
    pub async fn reconcile(
        &self,
        rule: &AlarmRule,
        active: HashMap<String, ActiveRow>,
        for_duration: std::time::Duration,
        now: DateTime<Utc>,
        generator_url: &str,
    ) -> Vec<AlarmEvent> {
        let mut events = Vec::new();
        let mut instances = self.instances.lock().await;

        for (fingerprint, row) in &active {
            match instances.get_mut(fingerprint) {
                None => {
                    instances.insert(
                        fingerprint.clone(),
                        AlarmInstance {
                            fingerprint: fingerprint.clone(),
                            alert_name: rule.alert_name.clone(),
                            state: InstanceState::Pending,
                            state_changed_at: now,
                            pending_start_at: now,
                            labels: row.labels.clone(),
                            annotations: BTreeMap::new(),
                            value: row.value,
                        },
                    );
                }
                Some(instance) => {
                    instance.value = row.value;
                    instance.labels = row.labels.clone();
                    if instance.state == InstanceState::Pending {
                        let elapsed = now.signed_duration_since(instance.pending_start_at);
                        if elapsed >= chrono::Duration::from_std(for_duration).unwrap_or_default() {
                            instance.state = InstanceState::Firing;
                            instance.state_changed_at = now;
                            let (labels, annotations) =
                                build_labels_and_annotations(rule, &instance.labels, instance.value);
                            instance.annotations = annotations.clone();
                            events.push(AlarmEvent {
                                fingerprint: fingerprint.clone(),
                                status: AlarmStatus::Firing,
                                labels,
                                annotations,
                                starts_at: instance.pending_start_at,
                                ends_at: None,
                                generator_url: generator_url.to_string(),
                            });
                        }
                    }
                }
            }
        }

        let prefix = rule_prefix(&rule.alert_name);
        let stale: Vec<String> = instances
            .keys()
            .filter(|fp| fp.starts_with(&prefix) && !active.contains_key(*fp))
            .cloned()
            .collect();

        for fingerprint in stale {
            if let Some(instance) = instances.remove(&fingerprint) {
                if instance.state == InstanceState::Firing {
                    let (labels, annotations) =
                        build_labels_and_annotations(rule, &instance.labels, instance.value);
                    events.push(AlarmEvent {
                        fingerprint,
                        status: AlarmStatus::Resolved,
                        labels,
                        annotations,
                        starts_at: instance.pending_start_at,
                        ends_at: Some(now),
                        generator_url: generator_url.to_string(),
                    });
                }
                // PENDING-only instances drop silently, per §4.3.
            }
        }

        events
    }

    pub async fn snapshot(&self) -> Vec<AlarmInstance> {
        self.instances.lock().await.values().cloned().collect()
    }
}

fn build_labels_and_annotations(
    rule: &AlarmRule,
    base_labels: &BTreeMap<String, String>,
    value: f64,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut labels = base_labels.clone();
    labels.insert("alertname".to_string(), rule.alert_name.clone());
    labels.insert("severity".to_string(), rule.severity.clone());
    labels.insert("alert_type".to_string(), rule.alert_type.clone());
    labels.insert("value".to_string(), value.to_string());

    let mut annotations = BTreeMap::new();
    annotations.insert("summary".to_string(), template::expand(&rule.summary, &labels));
    annotations.insert("description".to_string(), template::expand(&rule.description, &labels));
    (labels, annotations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_engine::expression::{CompareOp, Expr};

    fn test_rule(for_duration: &str) -> AlarmRule {
        AlarmRule {
            id: "r1".to_string(),
            alert_name: "HighCpu".to_string(),
            expression: Expr::MetricLeaf {
                stable: "cpu".into(),
                metric: "usage_percent".into(),
                operator: CompareOp::Gt,
                threshold: 90.0,
            },
            for_duration: for_duration.to_string(),
            severity: "critical".to_string(),
            summary: "{{host_ip}} is hot".to_string(),
            description: "cpu at {{value}}%".to_string(),
            alert_type: "resource".to_string(),
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn row(host_ip: &str, value: f64) -> ActiveRow {
        let mut labels = BTreeMap::new();
        labels.insert("host_ip".to_string(), host_ip.to_string());
        ActiveRow { labels, value }
    }

    #[tokio::test]
    async fn first_tick_goes_pending_with_no_event() {
        let map = InstanceMap::new();
        let rule = test_rule("1m");
        let mut active = HashMap::new();
        active.insert("alertname=HighCpu,host_ip=10.0.0.1".to_string(), row("10.0.0.1", 95.0));

        let events = map
            .reconcile(&rule, active, std::time::Duration::from_secs(60), Utc::now(), "test")
            .await;
        assert!(events.is_empty());
        assert_eq!(map.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn zero_duration_fires_on_first_tick() {
        let map = InstanceMap::new();
        let rule = test_rule("0s");
        let mut active = HashMap::new();
        active.insert("alertname=HighCpu,host_ip=10.0.0.1".to_string(), row("10.0.0.1", 95.0));

        // Tick 1: goes PENDING.
        map.reconcile(&rule, active.clone(), std::time::Duration::ZERO, Utc::now(), "test").await;
        // Tick 2: with for_duration zero, elapsed >= 0 is immediately true.
        let events = map
            .reconcile(&rule, active, std::time::Duration::ZERO, Utc::now(), "test")
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, AlarmStatus::Firing);
    }

    #[tokio::test]
    async fn vanishing_from_firing_emits_resolved_once() {
        let map = InstanceMap::new();
        let rule = test_rule("0s");
        let mut active = HashMap::new();
        active.insert("alertname=HighCpu,host_ip=10.0.0.1".to_string(), row("10.0.0.1", 95.0));

        map.reconcile(&rule, active.clone(), std::time::Duration::ZERO, Utc::now(), "test").await;
        map.reconcile(&rule, active, std::time::Duration::ZERO, Utc::now(), "test").await;

        let empty = HashMap::new();
        let events = map.reconcile(&rule, empty.clone(), std::time::Duration::ZERO, Utc::now(), "test").await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, AlarmStatus::Resolved);

        let events_again = map.reconcile(&rule, empty, std::time::Duration::ZERO, Utc::now(), "test").await;
        assert!(events_again.is_empty());
        assert!(map.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn vanishing_from_pending_drops_silently() {
        let map = InstanceMap::new();
        let rule = test_rule("1h");
        let mut active = HashMap::new();
        active.insert("alertname=HighCpu,host_ip=10.0.0.1".to_string(), row("10.0.0.1", 95.0));
        map.reconcile(&rule, active, std::time::Duration::from_secs(3600), Utc::now(), "test").await;

        let empty = HashMap::new();
        let events = map.reconcile(&rule, empty, std::time::Duration::from_secs(3600), Utc::now(), "test").await;
        assert!(events.is_empty());
        assert!(map.snapshot().await.is_empty());
    }
}
