//! End-to-end seed scenarios assembled from public component APIs,
//! run without a real MySQL/TDengine instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use cluster_monitor::bmc::{ipmb, packet};
use cluster_monitor::event_bus::EventBus;
use cluster_monitor::event_store::EventStore;
use cluster_monitor::liveness::{LivenessMonitor, OFFLINE_THRESHOLD};
use cluster_monitor::models::{AlarmRule, AlarmStatus, BoxInfo};
use cluster_monitor::node_registry::NodeRegistry;
use cluster_monitor::pool::{MySqlConnector, Pool, PoolConfig};
use cluster_monitor::rule_engine::expression::{CompareOp, EntityRow, Expr};
use cluster_monitor::rule_engine::fingerprint::fingerprint;
use cluster_monitor::rule_engine::state::{ActiveRow, InstanceMap};

fn high_cpu_rule(for_duration: &str) -> AlarmRule {
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

/// Emulates one tick of `RuleEngine::evaluate_rule` against a hand-built
/// latest-row index, exercising expression evaluation, fingerprinting,
/// and state reconciliation together the way the real evaluator does.
async fn run_tick(
    map: &InstanceMap,
    rule: &AlarmRule,
    rows: &[(&str, f64)],
    for_duration: Duration,
) -> Vec<cluster_monitor::models::AlarmEvent> {
    let mut active = HashMap::new();
    for (host_ip, usage) in rows {
        let mut tags = BTreeMap::new();
        tags.insert("host_ip".to_string(), host_ip.to_string());
        let mut metrics = BTreeMap::new();
        metrics.insert("usage_percent".to_string(), *usage);

        let row = EntityRow { tags: &tags, metrics: &metrics };
        if !rule.expression.evaluate(&row) {
            continue;
        }
        let fp = fingerprint(&rule.alert_name, &tags);
        active.insert(fp, ActiveRow { labels: tags, value: *usage });
    }
    map.reconcile(rule, active, for_duration, Utc::now(), "http://test").await
}

#[tokio::test]
async fn simple_firing_then_resolved() {
    let map = InstanceMap::new();
    let rule = high_cpu_rule("0s");

    let events = run_tick(&map, &rule, &[("10.0.0.1", 95.0)], Duration::ZERO).await;
    assert!(events.is_empty(), "first sighting only goes PENDING");

    let events = run_tick(&map, &rule, &[("10.0.0.1", 95.0)], Duration::ZERO).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, AlarmStatus::Firing);

    let events = run_tick(&map, &rule, &[], Duration::ZERO).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, AlarmStatus::Resolved);
}

#[tokio::test]
async fn pending_then_gone_emits_nothing() {
    let map = InstanceMap::new();
    let rule = high_cpu_rule("1h");

    let events = run_tick(&map, &rule, &[("10.0.0.2", 95.0)], Duration::from_secs(3600)).await;
    assert!(events.is_empty());

    let events = run_tick(&map, &rule, &[], Duration::from_secs(3600)).await;
    assert!(events.is_empty(), "a PENDING instance that vanishes is dropped silently");
    assert!(map.snapshot().await.is_empty());
}

#[tokio::test]
async fn bmc_packet_decodes_to_host_ip_and_sensors() {
    let mut buf = vec![0u8; packet::PACKET_SIZE];
    buf[0..2].copy_from_slice(&0xA55Au16.to_le_bytes());
    let tail = buf.len() - 2;
    buf[tail..].copy_from_slice(&0xA55Au16.to_le_bytes());

    // box_id lives at offset 2+2+2+2+4+4+1 = 17.
    buf[17] = 3;

    // First board begins right after head(2)+len(2)+seq(2)+type(2)+ts(4)+resv(4)+name(1)+box_id(1)
    // + fans(2 * 6) = 24 + 12 = 36.
    let board_offset = 36;
    buf[board_offset] = 0x7c; // ipmb_addr -> slot 1
    buf[board_offset + 1..board_offset + 3].copy_from_slice(&7u16.to_le_bytes()); // module_type != 0

    let decoded = packet::decode(&buf).expect("well-formed packet decodes");
    assert_eq!(decoded.box_id, 3);

    let boards = ipmb::decode_boards(&decoded);
    assert_eq!(boards.len(), 1, "only the first board is populated in this fixture");
    assert_eq!(boards[0].host_ip, "192.168.6.5");
}

async fn fake_event_store() -> Arc<EventStore> {
    let pool = Pool::new(
        MySqlConnector::new("mysql://unused@localhost/unused"),
        PoolConfig {
            initial_connections: 0,
            min_connections: 0,
            acquire_timeout: Duration::from_millis(10),
            ..PoolConfig::default()
        },
    )
    .await
    .unwrap();
    Arc::new(EventStore::new(pool))
}

#[tokio::test(start_paused = true)]
async fn node_offline_then_online_emits_firing_then_resolved() {
    let registry = NodeRegistry::new();
    registry
        .upsert_heartbeat(BoxInfo {
            host_ip: "10.0.0.9".to_string(),
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

    let event_bus = EventBus::new(fake_event_store().await);
    let (_id, mut rx) = event_bus.subscribe().await;
    let monitor = Arc::new(LivenessMonitor::new(registry.clone(), event_bus, "http://test"));

    let running = Arc::new(AtomicBool::new(true));
    let handle = {
        let monitor = monitor.clone();
        let running = running.clone();
        tokio::spawn(async move { monitor.run(running).await })
    };

    tokio::time::advance(OFFLINE_THRESHOLD + Duration::from_secs(2)).await;
    let offline_event =
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.expect("offline event emitted").unwrap();
    assert_eq!(offline_event.status, AlarmStatus::Firing);

    registry
        .upsert_heartbeat(BoxInfo {
            host_ip: "10.0.0.9".to_string(),
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
    tokio::time::advance(Duration::from_secs(2)).await;
    let online_event =
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.expect("online event emitted").unwrap();
    assert_eq!(online_event.status, AlarmStatus::Resolved);

    running.store(false, Ordering::Release);
    tokio::time::advance(Duration::from_secs(2)).await;
    let _ = handle.await;
}
