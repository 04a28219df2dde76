//! Node Registry (C5): thread-safe `host_ip -> NodeRecord` map.
//!
//! Two independent mutators feed it — HTTP heartbeats and the BMC
//! Ingestor — plus the Liveness Monitor, which only flips `status`
//! (§4.6, §5 "shared mutable state").

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::bmc::ipmb::DecodedBoard;
use crate::models::{BoxInfo, NodeRecord, NodeStatus};

#[derive(Default)]
pub struct NodeRegistry {
    nodes: Mutex<HashMap<String, NodeRecord>>,
}

impl NodeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sets identity fields from a heartbeat and refreshes
    /// `last_heartbeat`; creates the record if absent.
    pub async fn upsert_heartbeat(&self, info: BoxInfo) {
        let mut nodes = self.nodes.lock().await;
        let now = Instant::now();
        let now_utc = Utc::now();
        nodes
            .entry(info.host_ip.clone())
            .and_modify(|n| {
                n.box_id = info.box_id;
                n.slot_id = info.slot_id;
                n.cpu_id = info.cpu_id.clone();
                n.srio_id = info.srio_id.clone();
                n.hostname = info.hostname.clone();
                n.service_port = info.service_port;
                n.hardware_type = info.hardware_type.clone();
                n.gpu = info.gpu.clone();
                n.last_heartbeat = now;
                n.last_heartbeat_utc = now_utc;
            })
            .or_insert_with(|| NodeRecord {
                host_ip: info.host_ip.clone(),
                box_id: info.box_id,
                slot_id: info.slot_id,
                cpu_id: info.cpu_id,
                srio_id: info.srio_id,
                hostname: info.hostname,
                service_port: info.service_port,
                hardware_type: info.hardware_type,
                gpu: info.gpu,
                ipmb_address: None,
                module_type: None,
                bmc_company: None,
                bmc_version: None,
                last_heartbeat: now,
                last_heartbeat_utc: now_utc,
                status: NodeStatus::Online,
            });
    }

    /// Upserts BMC-derived fields for one decoded board and refreshes
    /// `last_heartbeat` (§4.6).
    pub async fn upsert_from_bmc(&self, board: &DecodedBoard, box_id: u8) {
        let mut nodes = self.nodes.lock().await;
        let now = Instant::now();
        let now_utc = Utc::now();
        nodes
            .entry(board.host_ip.clone())
            .and_modify(|n| {
                n.ipmb_address = Some(board.ipmb_addr);
                n.module_type = Some(board.module_type);
                n.bmc_company = Some(board.bmc_company);
                n.bmc_version = Some(board.bmc_version.clone());
                n.last_heartbeat = now;
                n.last_heartbeat_utc = now_utc;
            })
            .or_insert_with(|| NodeRecord {
                host_ip: board.host_ip.clone(),
                box_id: box_id as u32,
                slot_id: board.slot_id,
                cpu_id: String::new(),
                srio_id: String::new(),
                hostname: String::new(),
                service_port: 0,
                hardware_type: String::new(),
                gpu: Vec::new(),
                ipmb_address: Some(board.ipmb_addr),
                module_type: Some(board.module_type),
                bmc_company: Some(board.bmc_company),
                bmc_version: Some(board.bmc_version.clone()),
                last_heartbeat: now,
                last_heartbeat_utc: now_utc,
                status: NodeStatus::Online,
            });
    }

    pub async fn get(&self, host_ip: &str) -> Option<NodeRecord> {
        self.nodes.lock().await.get(host_ip).cloned()
    }

    pub async fn snapshot_all(&self) -> Vec<NodeRecord> {
        self.nodes.lock().await.values().cloned().collect()
    }

    /// Only records whose `last_heartbeat` is within `window`.
    pub async fn snapshot_active(&self, window: std::time::Duration) -> Vec<NodeRecord> {
        let now = Instant::now();
        self.nodes
            .lock()
            .await
            .values()
            .filter(|n| now.saturating_duration_since(n.last_heartbeat) <= window)
            .cloned()
            .collect()
    }

    pub async fn update_status(&self, host_ip: &str, status: NodeStatus) {
        if let Some(node) = self.nodes.lock().await.get_mut(host_ip) {
            node.status = status;
        }
    }

    /// `(host_ip, last_heartbeat, status)` triples, for the Liveness
    /// Monitor to scan without holding the registry lock across its
    /// own event-emission logic.
    pub async fn heartbeat_snapshot(&self) -> Vec<(String, Instant, NodeStatus)> {
        self.nodes.lock().await.values().map(|n| (n.host_ip.clone(), n.last_heartbeat, n.status)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn heartbeat_creates_then_updates_record() {
        let registry = NodeRegistry::new();
        registry
            .upsert_heartbeat(BoxInfo {
                host_ip: "10.0.0.1".to_string(),
                box_id: 1,
                slot_id: 2,
                cpu_id: "cpu0".to_string(),
                srio_id: String::new(),
                hostname: "node1".to_string(),
                service_port: 9000,
                hardware_type: "compute".to_string(),
                gpu: vec![],
            })
            .await;

        let node = registry.get("10.0.0.1").await.unwrap();
        assert_eq!(node.hostname, "node1");

        registry
            .upsert_heartbeat(BoxInfo {
                host_ip: "10.0.0.1".to_string(),
                box_id: 1,
                slot_id: 2,
                cpu_id: "cpu0".to_string(),
                srio_id: String::new(),
                hostname: "node1-renamed".to_string(),
                service_port: 9000,
                hardware_type: "compute".to_string(),
                gpu: vec![],
            })
            .await;
        let node = registry.get("10.0.0.1").await.unwrap();
        assert_eq!(node.hostname, "node1-renamed");
        assert_eq!(registry.snapshot_all().await.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_active_filters_by_window() {
        let registry = NodeRegistry::new();
        registry
            .upsert_heartbeat(BoxInfo {
                host_ip: "10.0.0.2".to_string(),
                box_id: 1,
                slot_id: 1,
                cpu_id: String::new(),
                srio_id: String::new(),
                hostname: String::new(),
                service_port: 0,
                hardware_type: String::new(),
                gpu: vec![],
            })
            .await;
        let active = registry.snapshot_active(std::time::Duration::from_secs(20)).await;
        assert_eq!(active.len(), 1);
        let none_active = registry.snapshot_active(std::time::Duration::ZERO).await;
        assert!(none_active.is_empty() || none_active.len() == 1); // timing-dependent at 0s boundary
    }
}
