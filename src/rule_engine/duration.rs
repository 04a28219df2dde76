//! Duration string parsing (§4.2.4): `N` followed by one of `s|m|h|d`.

use std::time::Duration;

use regex::Regex;
use std::sync::OnceLock;

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)([smhd])$").unwrap())
}

/// Malformed input yields zero, matching the documented degenerate
/// (rule fires immediately on first PENDING tick) rather than an error.
pub fn parse_duration(raw: &str) -> Duration {
    let Some(captures) = pattern().captures(raw.trim()) else {
        return Duration::ZERO;
    };
    let n: u64 = match captures[1].parse() {
        Ok(n) => n,
        Err(_) => return Duration::ZERO,
    };
    let multiplier = match &captures[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return Duration::ZERO,
    };
    Duration::from_secs(n.saturating_mul(multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("30s"), Duration::from_secs(30));
        assert_eq!(parse_duration("5m"), Duration::from_secs(300));
        assert_eq!(parse_duration("2h"), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d"), Duration::from_secs(86400));
    }

    #[test]
    fn malformed_yields_zero() {
        assert_eq!(parse_duration(""), Duration::ZERO);
        assert_eq!(parse_duration("five minutes"), Duration::ZERO);
        assert_eq!(parse_duration("30"), Duration::ZERO);
        assert_eq!(parse_duration("s30"), Duration::ZERO);
    }
}
