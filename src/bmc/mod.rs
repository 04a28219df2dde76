//! BMC Ingestor (C6): UDP multicast receiver, packet decode, and
//! fan-out into the TS Store and Node Registry (§4.5).

pub mod ipmb;
pub mod packet;

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::net::UdpSocket;

use crate::node_registry::NodeRegistry;
use crate::ts_store::TsStore;

pub struct BmcIngestor {
    ts_store: Arc<TsStore>,
    node_registry: Arc<NodeRegistry>,
}

impl BmcIngestor {
    pub fn new(ts_store: Arc<TsStore>, node_registry: Arc<NodeRegistry>) -> Self {
        Self { ts_store, node_registry }
    }

    /// Joins the multicast group and decodes packets until `running`
    /// is cleared. Start/stop is idempotent: calling `run` again after
    /// a clean exit simply rejoins.
    pub async fn run(&self, group: Ipv4Addr, port: u16, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        tracing::info!(%group, port, "BMC ingestor joined multicast group");

        let mut buf = vec![0u8; packet::PACKET_SIZE + 64];
        while running.load(Ordering::Acquire) {
            let recv = tokio::time::timeout(std::time::Duration::from_secs(1), socket.recv_from(&mut buf)).await;
            let (len, _addr) = match recv {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "BMC socket read error");
                    continue;
                }
                Err(_) => continue, // 1s timeout, re-check running flag
            };

            match packet::decode(&buf[..len]) {
                Ok(decoded) => self.handle_packet(decoded).await,
                Err(e) => tracing::warn!(error = %e, "dropping malformed BMC packet"),
            }
        }
        Ok(())
    }

    async fn handle_packet(&self, decoded: packet::UdpInfo) {
        let now = Utc::now();
        let boards = ipmb::decode_boards(&decoded);
        self.ts_store.insert_bmc(&decoded, &boards, now).await;
        for board in &boards {
            self.node_registry.upsert_from_bmc(board, decoded.box_id).await;
        }
    }
}
