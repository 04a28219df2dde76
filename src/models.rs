//! Shared domain types (§3 DATA MODEL) used across the rule engine,
//! the stores, and the HTTP layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rule_engine::expression::Expr;

/// A persisted alarm rule definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRule {
    pub id: String,
    pub alert_name: String,
    pub expression: Expr,
    pub for_duration: String,
    pub severity: String,
    pub summary: String,
    pub description: String,
    pub alert_type: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller supplies when creating a rule; server assigns `id`
/// and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlarmRule {
    pub alert_name: String,
    pub expression: Expr,
    pub for_duration: String,
    pub severity: String,
    pub summary: String,
    pub description: String,
    pub alert_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl NewAlarmRule {
    pub fn into_rule(self, now: DateTime<Utc>) -> AlarmRule {
        AlarmRule {
            id: Uuid::new_v4().to_string(),
            alert_name: self.alert_name,
            expression: self.expression,
            for_duration: self.for_duration,
            severity: self.severity,
            summary: self.summary,
            description: self.description,
            alert_type: self.alert_type,
            enabled: self.enabled,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Status an [`AlarmInstance`] or emitted [`AlarmEvent`] can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmStatus {
    Firing,
    Resolved,
}

/// In-engine transient state for one fingerprint (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Firing,
}

#[derive(Debug, Clone)]
pub struct AlarmInstance {
    pub fingerprint: String,
    pub alert_name: String,
    pub state: InstanceState,
    pub state_changed_at: DateTime<Utc>,
    pub pending_start_at: DateTime<Utc>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub value: f64,
}

/// The envelope emitted onto the Event Bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlarmEvent {
    pub fingerprint: String,
    pub status: AlarmStatus,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub starts_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    pub generator_url: String,
}

/// Event Store row: adds identity and storage-facing JSON columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedAlarmEvent {
    pub id: String,
    pub fingerprint: String,
    pub status: AlarmStatus,
    pub labels_json: String,
    pub annotations_json: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub generator_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Heartbeat payload posted by a node (`POST /heartbeat`), also the
/// per-board identity carried in a BMC packet once decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxInfo {
    pub host_ip: String,
    pub box_id: u32,
    pub slot_id: u32,
    #[serde(default)]
    pub cpu_id: String,
    #[serde(default)]
    pub srio_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub service_port: u16,
    #[serde(default)]
    pub hardware_type: String,
    #[serde(default)]
    pub gpu: Vec<String>,
}

/// Registry entry keyed by `host_ip` (§4.6).
#[derive(Debug, Clone, Serialize)]
pub struct NodeRecord {
    pub host_ip: String,
    pub box_id: u32,
    pub slot_id: u32,
    pub cpu_id: String,
    pub srio_id: String,
    pub hostname: String,
    pub service_port: u16,
    pub hardware_type: String,
    pub gpu: Vec<String>,

    pub ipmb_address: Option<u8>,
    pub module_type: Option<u16>,
    pub bmc_company: Option<u16>,
    pub bmc_version: Option<String>,

    #[serde(skip)]
    pub last_heartbeat: tokio::time::Instant,
    pub last_heartbeat_utc: DateTime<Utc>,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
}

/// One telemetry snapshot as posted by `POST /resource`; each field
/// is optional since a node may report a subset of families.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    #[serde(default)]
    pub cpu: Option<CpuSample>,
    #[serde(default)]
    pub memory: Option<MemorySample>,
    #[serde(default)]
    pub disk: Vec<DiskSample>,
    #[serde(default)]
    pub network: Vec<NetworkSample>,
    #[serde(default)]
    pub gpu: Vec<GpuSample>,
    #[serde(default)]
    pub container: Vec<ContainerSample>,
    #[serde(default)]
    pub sensor: Vec<SensorSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuSample {
    pub usage_percent: f64,
    pub load_avg_1m: f64,
    pub load_avg_5m: f64,
    pub load_avg_15m: f64,
    pub core_count: u32,
    pub core_allocated: u32,
    pub temperature: f64,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySample {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSample {
    pub device: String,
    pub mount_point: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSample {
    pub interface: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_rate: f64,
    pub tx_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuSample {
    pub gpu_index: u32,
    pub gpu_name: String,
    pub compute_usage: f64,
    pub mem_usage: f64,
    pub mem_used: u64,
    pub mem_total: u64,
    pub temperature: f64,
    pub power: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSample {
    pub container_id: String,
    pub container_name: String,
    pub cpu_percent: f64,
    pub mem_usage: u64,
    pub mem_limit: u64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSample {
    pub sensor_name: String,
    pub sensor_type: String,
    pub value: f64,
}

/// Latest-sample-per-family view returned by `TsStore::latest`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeResourceSample {
    pub host_ip: String,
    pub has_cpu_data: bool,
    pub cpu: Option<CpuSample>,
    pub has_memory_data: bool,
    pub memory: Option<MemorySample>,
    pub disk: Vec<DiskSample>,
    pub network: Vec<NetworkSample>,
    pub gpu: Vec<GpuSample>,
    pub container: Vec<ContainerSample>,
    pub sensor: Vec<SensorSample>,
    pub ts: Option<DateTime<Utc>>,
}
