//! TS Store (C4): schema bootstrap, batched telemetry insert, and
//! windowed/latest queries against the time-series backing store.

pub mod families;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use taos::AsyncQueryable;
use tokio::sync::Mutex;

use crate::bmc::packet::UdpInfo;
use crate::models::{
    ContainerSample, CpuSample, DiskSample, GpuSample, MemorySample, NetworkSample, NodeResourceSample,
    ResourceSnapshot, SensorSample,
};
use crate::pool::{Pool, TaosConnector};
use families::MetricFamily;

/// The freshest row seen for one concrete entity of one stable, kept
/// in memory so the Rule Engine can evaluate without round-tripping to
/// the backing store every tick (§4.2.2).
#[derive(Debug, Clone, Serialize)]
pub struct EntitySnapshot {
    pub tags: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub ts: DateTime<Utc>,
}

pub struct TsStore {
    pool: Pool<TaosConnector>,
    known_tables: Mutex<std::collections::HashSet<String>>,
    latest: Mutex<HashMap<String, HashMap<String, EntitySnapshot>>>,
}

impl TsStore {
    pub fn new(pool: Pool<TaosConnector>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            known_tables: Mutex::new(std::collections::HashSet::new()),
            latest: Mutex::new(HashMap::new()),
        })
    }

    /// Create every super-table if absent. Idempotent.
    pub async fn init_schema(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.context("acquiring TS connection for schema init")?;
        for family in families::ALL_FAMILIES {
            let sql = create_stable_sql(family);
            conn.exec(&sql).await.with_context(|| format!("creating stable {}", family.stable))?;
        }
        Ok(())
    }

    /// Inserts whichever families are present in `snapshot`, creating
    /// child tables lazily. Partial failure is tolerated: one family's
    /// insert error is logged and the rest still run (§4.4).
    pub async fn insert_resource(&self, host_ip: &str, snapshot: &ResourceSnapshot, ts: DateTime<Utc>) {
        if let Some(cpu) = &snapshot.cpu {
            self.try_insert_single(&families::CPU, &[host_ip], cpu_fields(cpu), ts, host_ip).await;
        }
        if let Some(mem) = &snapshot.memory {
            self.try_insert_single(&families::MEMORY, &[host_ip], memory_fields(mem), ts, host_ip).await;
        }
        for d in &snapshot.disk {
            self.try_insert_single(
                &families::DISK,
                &[host_ip, &d.device, &d.mount_point],
                disk_fields(d),
                ts,
                host_ip,
            )
            .await;
        }
        for n in &snapshot.network {
            self.try_insert_single(&families::NETWORK, &[host_ip, &n.interface], network_fields(n), ts, host_ip)
                .await;
        }
        for g in &snapshot.gpu {
            let idx = g.gpu_index.to_string();
            self.try_insert_single(&families::GPU, &[host_ip, &idx, &g.gpu_name], gpu_fields(g), ts, host_ip)
                .await;
        }
        for c in &snapshot.container {
            self.try_insert_single(
                &families::CONTAINER,
                &[host_ip, &c.container_id, &c.container_name],
                container_fields(c),
                ts,
                host_ip,
            )
            .await;
        }
        for s in &snapshot.sensor {
            self.try_insert_single(
                &families::SENSOR,
                &[host_ip, &s.sensor_name, &s.sensor_type],
                sensor_fields(s),
                ts,
                host_ip,
            )
            .await;
        }
    }

    /// Batched insert of one BMC packet's fan and sensor readings
    /// under a single server timestamp (§4.5).
    pub async fn insert_bmc(&self, packet: &UdpInfo, boards: &[crate::bmc::ipmb::DecodedBoard], ts: DateTime<Utc>) {
        let box_id = packet.box_id.to_string();
        for fan in &packet.fans {
            let seq = fan.fan_seq.to_string();
            let fields = [
                ("speed".to_string(), fan.fan_speed as f64),
                ("alarm_type".to_string(), fan.alarm_type() as f64),
                ("work_mode".to_string(), fan.work_mode() as f64),
            ]
            .into_iter()
            .collect();
            self.try_insert_single(&families::BMC_FAN, &[&box_id, &seq], fields, ts, &box_id).await;
        }

        for board in boards {
            for sensor in &board.sensors {
                let slot_id = board.slot_id.to_string();
                let seq = sensor.sensor_seq.to_string();
                let fields = [
                    ("sensor_value".to_string(), sensor.value as f64),
                    ("alarm_type".to_string(), sensor.alarm_type as f64),
                ]
                .into_iter()
                .collect();
                self.try_insert_single(
                    &families::BMC_SENSOR,
                    &[&box_id, &slot_id, &seq, &sensor.name, &sensor.sensor_type.to_string(), &board.host_ip],
                    fields,
                    ts,
                    &board.host_ip,
                )
                .await;
            }
        }
    }

    async fn try_insert_single(
        &self,
        family: &MetricFamily,
        tag_values: &[&str],
        fields: BTreeMap<String, f64>,
        ts: DateTime<Utc>,
        index_host_ip: &str,
    ) {
        if let Err(e) = self.insert_single(family, tag_values, &fields, ts).await {
            tracing::warn!(stable = family.stable, error = %e, "TS store insert failed, continuing");
            return;
        }

        let mut tags = BTreeMap::new();
        for (key, value) in family.tag_keys.iter().zip(tag_values) {
            tags.insert(key.to_string(), value.to_string());
        }
        tags.entry("host_ip".to_string()).or_insert_with(|| index_host_ip.to_string());

        let mut latest = self.latest.lock().await;
        let per_stable = latest.entry(family.stable.to_string()).or_default();
        let key = families::child_table_name(family, tag_values);
        per_stable.insert(key, EntitySnapshot { tags, metrics: fields, ts });
    }

    async fn insert_single(
        &self,
        family: &MetricFamily,
        tag_values: &[&str],
        fields: &BTreeMap<String, f64>,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        let child = families::child_table_name(family, tag_values);
        let mut conn = self.pool.acquire().await.context("acquiring TS connection")?;

        {
            let mut known = self.known_tables.lock().await;
            if !known.contains(&child) {
                let tags_sql = tag_values.iter().map(|v| format!("'{}'", escape(v))).collect::<Vec<_>>().join(", ");
                let sql = format!("CREATE TABLE IF NOT EXISTS {child} USING {} TAGS ({tags_sql})", family.stable);
                conn.exec(&sql).await.with_context(|| format!("creating child table {child}"))?;
                known.insert(child.clone());
            }
        }

        let values_sql = family
            .field_keys
            .iter()
            .map(|k| fields.get(*k).copied().unwrap_or(0.0).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {child} VALUES ({}, {values_sql})",
            ts.timestamp_millis()
        );
        conn.exec(&sql).await.with_context(|| format!("inserting into {child}"))?;
        Ok(())
    }

    /// Entities currently tracked for `stable`, used by the Rule
    /// Engine's in-process evaluation (§4.2.2).
    pub async fn latest_entities(&self, stable: &str) -> Vec<EntitySnapshot> {
        self.latest.lock().await.get(stable).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    /// Most recent row of every family for one host, with sentinel
    /// "no data" for missing single-valued families (§4.4).
    pub async fn latest(&self, host_ip: &str) -> NodeResourceSample {
        let latest = self.latest.lock().await;
        let mut sample = NodeResourceSample { host_ip: host_ip.to_string(), ..Default::default() };

        if let Some(entity) = find_for_host(&latest, "cpu", host_ip) {
            sample.has_cpu_data = true;
            sample.cpu = Some(cpu_from_metrics(&entity.metrics));
            sample.ts = Some(entity.ts);
        }
        if let Some(entity) = find_for_host(&latest, "memory", host_ip) {
            sample.has_memory_data = true;
            sample.memory = Some(memory_from_metrics(&entity.metrics));
        }
        sample.disk = entities_for_host(&latest, "disk", host_ip)
            .map(|e| disk_from_entity(e))
            .collect();
        sample.network = entities_for_host(&latest, "network", host_ip)
            .map(|e| network_from_entity(e))
            .collect();
        sample.gpu = entities_for_host(&latest, "gpu", host_ip).map(|e| gpu_from_entity(e)).collect();
        sample.container = entities_for_host(&latest, "container", host_ip)
            .map(|e| container_from_entity(e))
            .collect();
        sample.sensor = entities_for_host(&latest, "sensor", host_ip).map(|e| sensor_from_entity(e)).collect();
        sample
    }

    /// Time-ordered rows within `now - span`, for each requested
    /// family, read from the backing store directly (not the
    /// in-memory latest-only index). `filter_tag` is the tag column
    /// and value every row must match (`host_ip` for telemetry
    /// families, `box_id` for the BMC families, which carry no
    /// `host_ip` tag).
    pub async fn range(
        &self,
        filter_tag: (&str, &str),
        span: std::time::Duration,
        stables: &[&str],
    ) -> Result<HashMap<String, Vec<EntitySnapshot>>> {
        let mut out = HashMap::new();
        let mut conn = self.pool.acquire().await.context("acquiring TS connection")?;
        let cutoff_ms = (Utc::now() - chrono::Duration::from_std(span).unwrap_or_default()).timestamp_millis();
        let (tag_key, tag_value) = filter_tag;

        for stable in stables {
            let Some(family) = families::by_stable(stable) else { continue };
            let tag_columns = family.tag_keys.join(", ");
            let field_columns = family.field_keys.join(", ");
            let sql = format!(
                "SELECT ts, {tag_columns}, {field_columns} FROM {} WHERE {tag_key} = '{}' AND ts > {cutoff_ms} ORDER BY ts",
                family.stable,
                escape(tag_value)
            );
            let rows = self.fetch_rows(&mut conn, &sql, family).await?;
            out.insert(family.stable.to_string(), rows);
        }
        Ok(out)
    }

    /// Column order of the `range()` query is fixed: `ts`, then every
    /// `family.tag_keys` in order, then every `family.field_keys` in
    /// order, so each row carries its full tag set (SPEC_FULL.md §4.4,
    /// §8 — disk/network/gpu callers group multi-entity results by tag).
    async fn fetch_rows(
        &self,
        conn: &mut taos::Taos,
        sql: &str,
        family: &MetricFamily,
    ) -> Result<Vec<EntitySnapshot>> {
        let mut result_set = conn.query(sql).await.with_context(|| format!("querying {}", family.stable))?;
        let mut rows = Vec::new();
        let raw_rows = result_set.to_records().await.with_context(|| format!("reading rows for {}", family.stable))?;
        let tag_count = family.tag_keys.len();
        for raw in raw_rows {
            let mut tags = BTreeMap::new();
            let mut metrics = BTreeMap::new();
            let mut ts = Utc::now();
            for (idx, value) in raw.into_iter().enumerate() {
                if idx == 0 {
                    ts = value_to_timestamp(&value);
                } else if idx <= tag_count {
                    if let Some(tag_name) = family.tag_keys.get(idx - 1) {
                        tags.insert(tag_name.to_string(), value.to_string());
                    }
                } else if let Some(field_name) = family.field_keys.get(idx - 1 - tag_count) {
                    metrics.insert(field_name.to_string(), value_to_f64(&value));
                }
            }
            rows.push(EntitySnapshot { tags, metrics, ts });
        }
        Ok(rows)
    }
}

fn value_to_f64(value: &taos::Value) -> f64 {
    value.to_string().parse().unwrap_or(0.0)
}

fn value_to_timestamp(value: &taos::Value) -> DateTime<Utc> {
    value
        .to_string()
        .parse::<i64>()
        .ok()
        .and_then(|ms| DateTime::from_timestamp_millis(ms))
        .unwrap_or_else(Utc::now)
}

fn find_for_host<'a>(
    latest: &'a HashMap<String, HashMap<String, EntitySnapshot>>,
    stable: &str,
    host_ip: &str,
) -> Option<&'a EntitySnapshot> {
    entities_for_host(latest, stable, host_ip).next()
}

fn entities_for_host<'a>(
    latest: &'a HashMap<String, HashMap<String, EntitySnapshot>>,
    stable: &str,
    host_ip: &str,
) -> impl Iterator<Item = &'a EntitySnapshot> {
    latest
        .get(stable)
        .into_iter()
        .flat_map(|m| m.values())
        .filter(move |e| e.tags.get("host_ip").map(|h| h == host_ip).unwrap_or(false))
}

fn escape(s: &str) -> String {
    s.replace('\'', "''")
}

fn create_stable_sql(family: &MetricFamily) -> String {
    let fields = family.field_keys.iter().map(|f| format!("{f} DOUBLE")).collect::<Vec<_>>().join(", ");
    let tags = family.tag_keys.iter().map(|t| format!("{t} BINARY(128)")).collect::<Vec<_>>().join(", ");
    format!("CREATE STABLE IF NOT EXISTS {} (ts TIMESTAMP, {fields}) TAGS ({tags})", family.stable)
}

fn cpu_fields(c: &CpuSample) -> BTreeMap<String, f64> {
    [
        ("usage_percent".to_string(), c.usage_percent),
        ("load_avg_1m".to_string(), c.load_avg_1m),
        ("load_avg_5m".to_string(), c.load_avg_5m),
        ("load_avg_15m".to_string(), c.load_avg_15m),
        ("core_count".to_string(), c.core_count as f64),
        ("core_allocated".to_string(), c.core_allocated as f64),
        ("temperature".to_string(), c.temperature),
        ("voltage".to_string(), c.voltage),
        ("current".to_string(), c.current),
        ("power".to_string(), c.power),
    ]
    .into_iter()
    .collect()
}

fn memory_fields(m: &MemorySample) -> BTreeMap<String, f64> {
    [
        ("total".to_string(), m.total as f64),
        ("used".to_string(), m.used as f64),
        ("free".to_string(), m.free as f64),
        ("usage_percent".to_string(), m.usage_percent),
    ]
    .into_iter()
    .collect()
}

fn disk_fields(d: &DiskSample) -> BTreeMap<String, f64> {
    [
        ("total".to_string(), d.total as f64),
        ("used".to_string(), d.used as f64),
        ("free".to_string(), d.free as f64),
        ("usage_percent".to_string(), d.usage_percent),
    ]
    .into_iter()
    .collect()
}

fn network_fields(n: &NetworkSample) -> BTreeMap<String, f64> {
    [
        ("rx_bytes".to_string(), n.rx_bytes as f64),
        ("tx_bytes".to_string(), n.tx_bytes as f64),
        ("rx_packets".to_string(), n.rx_packets as f64),
        ("tx_packets".to_string(), n.tx_packets as f64),
        ("rx_errors".to_string(), n.rx_errors as f64),
        ("tx_errors".to_string(), n.tx_errors as f64),
        ("rx_rate".to_string(), n.rx_rate),
        ("tx_rate".to_string(), n.tx_rate),
    ]
    .into_iter()
    .collect()
}

fn gpu_fields(g: &GpuSample) -> BTreeMap<String, f64> {
    [
        ("compute_usage".to_string(), g.compute_usage),
        ("mem_usage".to_string(), g.mem_usage),
        ("mem_used".to_string(), g.mem_used as f64),
        ("mem_total".to_string(), g.mem_total as f64),
        ("temperature".to_string(), g.temperature),
        ("power".to_string(), g.power),
    ]
    .into_iter()
    .collect()
}

fn container_fields(c: &ContainerSample) -> BTreeMap<String, f64> {
    [
        ("cpu_percent".to_string(), c.cpu_percent),
        ("mem_usage".to_string(), c.mem_usage as f64),
        ("mem_limit".to_string(), c.mem_limit as f64),
    ]
    .into_iter()
    .collect()
}

fn sensor_fields(s: &SensorSample) -> BTreeMap<String, f64> {
    [("value".to_string(), s.value)].into_iter().collect()
}

fn cpu_from_metrics(m: &BTreeMap<String, f64>) -> CpuSample {
    CpuSample {
        usage_percent: *m.get("usage_percent").unwrap_or(&0.0),
        load_avg_1m: *m.get("load_avg_1m").unwrap_or(&0.0),
        load_avg_5m: *m.get("load_avg_5m").unwrap_or(&0.0),
        load_avg_15m: *m.get("load_avg_15m").unwrap_or(&0.0),
        core_count: *m.get("core_count").unwrap_or(&0.0) as u32,
        core_allocated: *m.get("core_allocated").unwrap_or(&0.0) as u32,
        temperature: *m.get("temperature").unwrap_or(&0.0),
        voltage: *m.get("voltage").unwrap_or(&0.0),
        current: *m.get("current").unwrap_or(&0.0),
        power: *m.get("power").unwrap_or(&0.0),
    }
}

fn memory_from_metrics(m: &BTreeMap<String, f64>) -> MemorySample {
    MemorySample {
        total: *m.get("total").unwrap_or(&0.0) as u64,
        used: *m.get("used").unwrap_or(&0.0) as u64,
        free: *m.get("free").unwrap_or(&0.0) as u64,
        usage_percent: *m.get("usage_percent").unwrap_or(&0.0),
    }
}

fn disk_from_entity(e: &EntitySnapshot) -> DiskSample {
    DiskSample {
        device: e.tags.get("device").cloned().unwrap_or_default(),
        mount_point: e.tags.get("mount_point").cloned().unwrap_or_default(),
        total: *e.metrics.get("total").unwrap_or(&0.0) as u64,
        used: *e.metrics.get("used").unwrap_or(&0.0) as u64,
        free: *e.metrics.get("free").unwrap_or(&0.0) as u64,
        usage_percent: *e.metrics.get("usage_percent").unwrap_or(&0.0),
    }
}

fn network_from_entity(e: &EntitySnapshot) -> NetworkSample {
    NetworkSample {
        interface: e.tags.get("interface").cloned().unwrap_or_default(),
        rx_bytes: *e.metrics.get("rx_bytes").unwrap_or(&0.0) as u64,
        tx_bytes: *e.metrics.get("tx_bytes").unwrap_or(&0.0) as u64,
        rx_packets: *e.metrics.get("rx_packets").unwrap_or(&0.0) as u64,
        tx_packets: *e.metrics.get("tx_packets").unwrap_or(&0.0) as u64,
        rx_errors: *e.metrics.get("rx_errors").unwrap_or(&0.0) as u64,
        tx_errors: *e.metrics.get("tx_errors").unwrap_or(&0.0) as u64,
        rx_rate: *e.metrics.get("rx_rate").unwrap_or(&0.0),
        tx_rate: *e.metrics.get("tx_rate").unwrap_or(&0.0),
    }
}

fn gpu_from_entity(e: &EntitySnapshot) -> GpuSample {
    GpuSample {
        gpu_index: e.tags.get("gpu_index").and_then(|v| v.parse().ok()).unwrap_or(0),
        gpu_name: e.tags.get("gpu_name").cloned().unwrap_or_default(),
        compute_usage: *e.metrics.get("compute_usage").unwrap_or(&0.0),
        mem_usage: *e.metrics.get("mem_usage").unwrap_or(&0.0),
        mem_used: *e.metrics.get("mem_used").unwrap_or(&0.0) as u64,
        mem_total: *e.metrics.get("mem_total").unwrap_or(&0.0) as u64,
        temperature: *e.metrics.get("temperature").unwrap_or(&0.0),
        power: *e.metrics.get("power").unwrap_or(&0.0),
    }
}

fn container_from_entity(e: &EntitySnapshot) -> ContainerSample {
    ContainerSample {
        container_id: e.tags.get("container_id").cloned().unwrap_or_default(),
        container_name: e.tags.get("container_name").cloned().unwrap_or_default(),
        cpu_percent: *e.metrics.get("cpu_percent").unwrap_or(&0.0),
        mem_usage: *e.metrics.get("mem_usage").unwrap_or(&0.0) as u64,
        mem_limit: *e.metrics.get("mem_limit").unwrap_or(&0.0) as u64,
        status: String::new(),
    }
}

fn sensor_from_entity(e: &EntitySnapshot) -> SensorSample {
    SensorSample {
        sensor_name: e.tags.get("sensor_name").cloned().unwrap_or_default(),
        sensor_type: e.tags.get("sensor_type").cloned().unwrap_or_default(),
        value: *e.metrics.get("value").unwrap_or(&0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_stable_sql_types_every_field_as_double() {
        let sql = create_stable_sql(&families::CONTAINER);
        assert!(sql.contains("cpu_percent DOUBLE"));
        assert!(sql.contains("mem_usage DOUBLE"));
        assert!(sql.starts_with("CREATE STABLE IF NOT EXISTS container"));
    }

    #[tokio::test]
    async fn latest_entities_reflects_most_recent_insert_per_entity() {
        // Exercises the in-memory index path directly, without a live backend.
        let latest: Mutex<HashMap<String, HashMap<String, EntitySnapshot>>> = Mutex::new(HashMap::new());
        {
            let mut l = latest.lock().await;
            let mut tags = BTreeMap::new();
            tags.insert("host_ip".to_string(), "10.0.0.1".to_string());
            let mut metrics = BTreeMap::new();
            metrics.insert("usage_percent".to_string(), 42.0);
            l.entry("cpu".to_string())
                .or_default()
                .insert("cpu_10_0_0_1".to_string(), EntitySnapshot { tags, metrics, ts: Utc::now() });
        }
        let entities = entities_for_host(&*latest.lock().await, "cpu", "10.0.0.1").count();
        assert_eq!(entities, 1);
    }
}
