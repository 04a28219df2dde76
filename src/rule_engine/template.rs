//! `{{key}}` template expansion over an instance's labels (§4.2.5).

use std::collections::BTreeMap;

use regex::Regex;
use std::sync::OnceLock;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").unwrap())
}

/// Unknown keys are left literal, e.g. `{{missing}}` passes through
/// unchanged.
pub fn expand(template: &str, labels: &BTreeMap<String, String>) -> String {
    placeholder()
        .replace_all(template, |caps: &regex::Captures| {
            labels.get(&caps[1]).cloned().unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_known_keys() {
        let mut labels = BTreeMap::new();
        labels.insert("host_ip".to_string(), "10.0.0.1".to_string());
        assert_eq!(expand("node {{host_ip}} is hot", &labels), "node 10.0.0.1 is hot");
    }

    #[test]
    fn leaves_unknown_keys_literal() {
        let labels = BTreeMap::new();
        assert_eq!(expand("{{nope}} stays", &labels), "{{nope}} stays");
    }

    #[test]
    fn expands_multiple_placeholders() {
        let mut labels = BTreeMap::new();
        labels.insert("alertname".to_string(), "HighCpu".to_string());
        labels.insert("value".to_string(), "95.2".to_string());
        assert_eq!(expand("{{alertname}}: {{value}}%", &labels), "HighCpu: 95.2%");
    }
}
