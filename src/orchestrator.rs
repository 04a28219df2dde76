//! Orchestrator (C10): owns every component and their shared shutdown
//! flag; wires the long-running workers described in §5.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::bmc::BmcIngestor;
use crate::config::AppConfig;
use crate::event_bus::EventBus;
use crate::event_store::EventStore;
use crate::liveness::LivenessMonitor;
use crate::node_registry::NodeRegistry;
use crate::pool::{MySqlConnector, Pool, TaosConnector};
use crate::rule_engine::RuleEngine;
use crate::rule_store::RuleStore;
use crate::ts_store::TsStore;

pub struct Orchestrator {
    pub config: AppConfig,
    pub running: Arc<AtomicBool>,
    pub rule_store: Arc<RuleStore>,
    pub event_store: Arc<EventStore>,
    pub ts_store: Arc<TsStore>,
    pub node_registry: Arc<NodeRegistry>,
    pub event_bus: Arc<EventBus>,
    pub rule_engine: Arc<RuleEngine>,
    pub bmc_ingestor: Arc<BmcIngestor>,
    pub liveness_monitor: Arc<LivenessMonitor>,
    relational_pool: Pool<MySqlConnector>,
    ts_pool: Pool<TaosConnector>,
}

impl Orchestrator {
    pub async fn bootstrap(config: AppConfig) -> Result<Self> {
        let relational_pool = Pool::new(MySqlConnector::new(config.mysql_dsn()), config.relational_pool.clone())
            .await
            .context("bootstrapping relational pool")?;
        let ts_pool = Pool::new(TaosConnector::new(config.taos_dsn()), config.ts_pool.clone())
            .await
            .context("bootstrapping TS pool")?;

        let rule_store = Arc::new(RuleStore::new(relational_pool.clone()));
        let event_store = Arc::new(EventStore::new(relational_pool.clone()));
        rule_store.init_schema().await.context("initializing rule store schema")?;
        event_store.init_schema().await.context("initializing event store schema")?;

        let ts_store = TsStore::new(ts_pool.clone());
        ts_store.init_schema().await.context("initializing TS store schema")?;

        let node_registry = NodeRegistry::new();
        let event_bus = EventBus::new(event_store.clone());
        let generator_url = format!("http://localhost:{}", config.http_port);

        let rule_engine = Arc::new(RuleEngine::new(
            rule_store.clone(),
            ts_store.clone(),
            event_bus.clone(),
            config.evaluation_interval.into(),
            generator_url.clone(),
        ));
        let bmc_ingestor = Arc::new(BmcIngestor::new(ts_store.clone(), node_registry.clone()));
        let liveness_monitor = Arc::new(LivenessMonitor::new(node_registry.clone(), event_bus.clone(), generator_url));

        Ok(Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
            rule_store,
            event_store,
            ts_store,
            node_registry,
            event_bus,
            rule_engine,
            bmc_ingestor,
            liveness_monitor,
            relational_pool,
            ts_pool,
        })
    }

    /// Spawns every named long-running worker from §5 and returns
    /// their join handles; the caller awaits shutdown separately.
    pub fn spawn_workers(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let engine = self.rule_engine.clone();
        let running = self.running.clone();
        handles.push(tokio::spawn(async move {
            engine.run(running).await;
        }));

        let liveness = self.liveness_monitor.clone();
        let running = self.running.clone();
        handles.push(tokio::spawn(async move {
            liveness.run(running).await;
        }));

        let ingestor = self.bmc_ingestor.clone();
        let running = self.running.clone();
        let group = Ipv4Addr::from_str(&self.config.bmc_multicast_ip).unwrap_or(Ipv4Addr::new(224, 100, 200, 15));
        let port = self.config.bmc_multicast_port;
        handles.push(tokio::spawn(async move {
            if let Err(e) = ingestor.run(group, port, running).await {
                tracing::error!(error = %e, "BMC ingestor exited with error");
            }
        }));

        handles
    }

    /// Flips the shared shutdown flag, waits for workers to observe
    /// it, then drains both pools (§5 cancellation & shutdown).
    pub async fn shutdown(&self, handles: Vec<tokio::task::JoinHandle<()>>) {
        self.running.store(false, Ordering::Release);
        for handle in handles {
            let _ = handle.await;
        }
        self.relational_pool.shutdown().await;
        self.ts_pool.shutdown().await;
    }
}
