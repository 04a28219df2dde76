//! Compute-cluster monitoring and alerting service: telemetry ingestion,
//! alarm rule evaluation, BMC multicast decode, and a live notification
//! bus, fronted by an HTTP/WebSocket API.

pub mod bmc;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod event_store;
pub mod http;
pub mod liveness;
pub mod models;
pub mod node_registry;
pub mod orchestrator;
pub mod pagination;
pub mod pool;
pub mod rule_engine;
pub mod rule_store;
pub mod ts_store;
pub mod ws;
