//! `MetricFamily` descriptor: replaces one hand-written class per
//! stable (duplicated insert/query logic) with a single table-driven
//! definition per family (§9 redesign note).

/// Declarative shape of one super-table: its tag columns, its numeric
/// field columns, and (for families with no intrinsic string field)
/// whatever non-numeric columns it also carries.
pub struct MetricFamily {
    pub stable: &'static str,
    pub tag_keys: &'static [&'static str],
    pub field_keys: &'static [&'static str],
}

pub const CPU: MetricFamily = MetricFamily {
    stable: "cpu",
    tag_keys: &["host_ip"],
    field_keys: &[
        "usage_percent",
        "load_avg_1m",
        "load_avg_5m",
        "load_avg_15m",
        "core_count",
        "core_allocated",
        "temperature",
        "voltage",
        "current",
        "power",
    ],
};

pub const MEMORY: MetricFamily = MetricFamily {
    stable: "memory",
    tag_keys: &["host_ip"],
    field_keys: &["total", "used", "free", "usage_percent"],
};

pub const DISK: MetricFamily = MetricFamily {
    stable: "disk",
    tag_keys: &["host_ip", "device", "mount_point"],
    field_keys: &["total", "used", "free", "usage_percent"],
};

pub const NETWORK: MetricFamily = MetricFamily {
    stable: "network",
    tag_keys: &["host_ip", "interface"],
    field_keys: &[
        "rx_bytes", "tx_bytes", "rx_packets", "tx_packets", "rx_errors", "tx_errors", "rx_rate", "tx_rate",
    ],
};

pub const GPU: MetricFamily = MetricFamily {
    stable: "gpu",
    tag_keys: &["host_ip", "gpu_index", "gpu_name"],
    field_keys: &["compute_usage", "mem_usage", "mem_used", "mem_total", "temperature", "power"],
};

pub const CONTAINER: MetricFamily = MetricFamily {
    stable: "container",
    tag_keys: &["host_ip", "container_id", "container_name"],
    field_keys: &["cpu_percent", "mem_usage", "mem_limit"],
};

pub const SENSOR: MetricFamily = MetricFamily {
    stable: "sensor",
    tag_keys: &["host_ip", "sensor_name", "sensor_type"],
    field_keys: &["value"],
};

pub const BMC_FAN: MetricFamily = MetricFamily {
    stable: "bmc_fan_super",
    tag_keys: &["box_id", "fan_seq"],
    field_keys: &["speed", "alarm_type", "work_mode"],
};

pub const BMC_SENSOR: MetricFamily = MetricFamily {
    stable: "bmc_sensor_super",
    tag_keys: &["box_id", "slot_id", "sensor_seq", "sensor_name", "sensor_type", "host_ip"],
    field_keys: &["sensor_value", "alarm_type"],
};

pub const ALL_FAMILIES: &[&MetricFamily] =
    &[&CPU, &MEMORY, &DISK, &NETWORK, &GPU, &CONTAINER, &SENSOR, &BMC_FAN, &BMC_SENSOR];

pub fn by_stable(stable: &str) -> Option<&'static MetricFamily> {
    ALL_FAMILIES.iter().copied().find(|f| f.stable == stable)
}

/// Child table name for a concrete entity: stable name plus the
/// sanitized tag tuple (`/`, `-`, `.`, `:`, space → `_`).
pub fn child_table_name(family: &MetricFamily, tag_values: &[&str]) -> String {
    let mut name = family.stable.to_string();
    for v in tag_values {
        name.push('_');
        name.push_str(&sanitize(v));
    }
    name
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '-' | '.' | ':' | ' ' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_table_name_sanitizes_punctuation() {
        let name = child_table_name(&DISK, &["10.0.0.1", "/dev/sda1", "/mnt/data"]);
        assert_eq!(name, "disk_10_0_0_1__dev_sda1__mnt_data");
    }

    #[test]
    fn by_stable_finds_known_families() {
        assert!(by_stable("cpu").is_some());
        assert!(by_stable("nonexistent").is_none());
    }
}
