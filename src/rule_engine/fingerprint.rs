//! Fingerprint canonicalization (§4.3).

use std::collections::BTreeMap;

/// `"alertname=" + alert_name + "," + sorted "k=v" pairs`.
///
/// `BTreeMap` already iterates in key order, so stability under label
/// reordering falls out of the caller using an ordered map rather than
/// needing an explicit sort here.
pub fn fingerprint(alert_name: &str, labels: &BTreeMap<String, String>) -> String {
    let mut out = format!("alertname={alert_name}");
    for (k, v) in labels {
        if k == "alertname" {
            continue;
        }
        out.push(',');
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out
}

/// Prefix shared by every fingerprint belonging to a given rule, used
/// to find stale instances during reconciliation (§4.3 step 3).
pub fn rule_prefix(alert_name: &str) -> String {
    format!("alertname={alert_name},")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_under_label_reordering() {
        let mut a = BTreeMap::new();
        a.insert("host_ip".to_string(), "10.0.0.1".to_string());
        a.insert("severity".to_string(), "critical".to_string());

        let mut b = BTreeMap::new();
        b.insert("severity".to_string(), "critical".to_string());
        b.insert("host_ip".to_string(), "10.0.0.1".to_string());

        assert_eq!(fingerprint("HighCpu", &a), fingerprint("HighCpu", &b));
    }

    #[test]
    fn embeds_alert_name_first() {
        let labels = BTreeMap::new();
        assert_eq!(fingerprint("NodeOffline", &labels), "alertname=NodeOffline");
    }

    #[test]
    fn rule_prefix_matches_own_fingerprints() {
        let mut labels = BTreeMap::new();
        labels.insert("host_ip".to_string(), "10.0.0.2".to_string());
        let fp = fingerprint("HighCpu", &labels);
        assert!(fp.starts_with(&rule_prefix("HighCpu")));
        assert!(!fp.starts_with(&rule_prefix("HighMemory")));
    }
}
