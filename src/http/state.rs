use std::sync::Arc;

use crate::event_bus::EventBus;
use crate::event_store::EventStore;
use crate::node_registry::NodeRegistry;
use crate::rule_engine::RuleEngine;
use crate::rule_store::RuleStore;
use crate::ts_store::TsStore;

#[derive(Clone)]
pub struct AppState {
    pub rule_store: Arc<RuleStore>,
    pub event_store: Arc<EventStore>,
    pub ts_store: Arc<TsStore>,
    pub node_registry: Arc<NodeRegistry>,
    pub event_bus: Arc<EventBus>,
    pub rule_engine: Arc<RuleEngine>,
}

impl AppState {
    pub fn from_orchestrator(orchestrator: &crate::orchestrator::Orchestrator) -> Self {
        Self {
            rule_store: orchestrator.rule_store.clone(),
            event_store: orchestrator.event_store.clone(),
            ts_store: orchestrator.ts_store.clone(),
            node_registry: orchestrator.node_registry.clone(),
            event_bus: orchestrator.event_bus.clone(),
            rule_engine: orchestrator.rule_engine.clone(),
        }
    }
}
