//! Rule Engine (C7): periodic evaluation of alarm rules against the TS
//! Store's latest telemetry, with per-fingerprint state reconciliation.

pub mod duration;
pub mod expression;
pub mod fingerprint;
pub mod state;
pub mod template;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::RwLock;

pub use crate::models::AlarmRule;
use crate::event_bus::EventBus;
use crate::rule_store::RuleStore;
use crate::ts_store::TsStore;

use expression::EntityRow;
use state::{ActiveRow, InstanceMap};

/// Owns the in-memory rule list, the instance map, and the evaluation
/// loop. Constructed once by the Orchestrator and run via [`Self::run`].
pub struct RuleEngine {
    rule_store: Arc<RuleStore>,
    ts_store: Arc<TsStore>,
    event_bus: Arc<EventBus>,
    rules: RwLock<Vec<AlarmRule>>,
    instances: InstanceMap,
    evaluation_interval: StdDuration,
    generator_url: String,
}

impl RuleEngine {
    pub fn new(
        rule_store: Arc<RuleStore>,
        ts_store: Arc<TsStore>,
        event_bus: Arc<EventBus>,
        evaluation_interval: StdDuration,
        generator_url: impl Into<String>,
    ) -> Self {
        Self {
            rule_store,
            ts_store,
            event_bus,
            rules: RwLock::new(Vec::new()),
            instances: InstanceMap::new(),
            evaluation_interval,
            generator_url: generator_url.into(),
        }
    }

    /// Runs until `running` is flipped false, evaluating every tick.
    pub async fn run(&self, running: Arc<std::sync::atomic::AtomicBool>) {
        let mut ticker = tokio::time::interval(self.evaluation_interval);
        while running.load(std::sync::atomic::Ordering::Acquire) {
            ticker.tick().await;
            if !running.load(std::sync::atomic::Ordering::Acquire) {
                break;
            }
            self.tick().await;
        }
    }

    async fn tick(&self) {
        self.reload_rules().await;
        let rules = self.rules.read().await.clone();
        for rule in &rules {
            if !rule.enabled {
                continue;
            }
            let events = self.evaluate_rule(rule).await;
            for event in events {
                self.event_bus.publish(event).await;
            }
        }
    }

    async fn reload_rules(&self) {
        match self.rule_store.list_enabled().await {
            Ok(fresh) => {
                *self.rules.write().await = fresh;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to reload rules from rule store, keeping previous set");
            }
        }
    }

    async fn evaluate_rule(&self, rule: &AlarmRule) -> Vec<crate::models::AlarmEvent> {
        let Some(stable) = rule.expression.stable() else {
            tracing::warn!(rule = %rule.alert_name, "rule expression has no leaves, skipping");
            return Vec::new();
        };

        let for_duration = duration::parse_duration(&rule.for_duration);
        let entities = self.ts_store.latest_entities(&stable).await;

        tracing::debug!(rule = %rule.alert_name, sql = %rule.expression.to_select_sql(&stable, &primary_metric(rule)), "synthesized query (diagnostic only, evaluated in-process)");

        let mut active = HashMap::new();
        for entity in entities {
            let row = EntityRow { tags: &entity.tags, metrics: &entity.metrics };
            if !rule.expression.evaluate(&row) {
                continue;
            }
            let mut labels = entity.tags.clone();
            labels.entry("host_ip".to_string()).or_insert_with(|| entity.tags.get("host_ip").cloned().unwrap_or_default());
            let fp = fingerprint::fingerprint(&rule.alert_name, &labels);
            let value = primary_metric_value(rule, &entity.metrics);
            active.insert(fp, ActiveRow { labels, value });
        }

        self.instances
            .reconcile(rule, active, for_duration, Utc::now(), &self.generator_url)
            .await
    }

    pub async fn snapshot_instances(&self) -> Vec<crate::models::AlarmInstance> {
        self.instances.snapshot().await
    }
}

/// The metric a rule is "primarily about", used for the diagnostic
/// `LAST(M)` projection (§4.2.2); the first metric leaf encountered.
fn primary_metric(rule: &AlarmRule) -> String {
    fn find(expr: &expression::Expr) -> Option<String> {
        match expr {
            expression::Expr::MetricLeaf { metric, .. } => Some(metric.clone()),
            expression::Expr::TagLeaf { .. } => None,
            expression::Expr::And { and } => and.iter().find_map(find),
            expression::Expr::Or { or } => or.iter().find_map(find),
        }
    }
    find(&rule.expression).unwrap_or_else(|| "value".to_string())
}

fn primary_metric_value(rule: &AlarmRule, metrics: &BTreeMap<String, f64>) -> f64 {
    metrics.get(&primary_metric(rule)).copied().unwrap_or(0.0)
}
