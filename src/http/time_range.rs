//! `time_range` query parameter parsing (§6): `<int><unit>`, unit ∈
//! {s,m,h,d}; invalid falls back to a caller-supplied default rather
//! than zero (unlike rule `for_duration`, which degenerates to zero).

use std::time::Duration;

use regex::Regex;
use std::sync::OnceLock;

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)([smhd])$").unwrap())
}

pub fn parse_time_range(raw: Option<&str>, default: Duration) -> Duration {
    let Some(raw) = raw else { return default };
    let Some(captures) = pattern().captures(raw.trim()) else { return default };
    let Ok(n) = captures[1].parse::<u64>() else { return default };
    let multiplier = match &captures[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return default,
    };
    Duration::from_secs(n.saturating_mul(multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_ranges() {
        assert_eq!(parse_time_range(Some("10m"), Duration::from_secs(1)), Duration::from_secs(600));
    }

    #[test]
    fn falls_back_to_default_on_invalid() {
        assert_eq!(parse_time_range(Some("nonsense"), Duration::from_secs(3600)), Duration::from_secs(3600));
        assert_eq!(parse_time_range(None, Duration::from_secs(3600)), Duration::from_secs(3600));
    }
}
