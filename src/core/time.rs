use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Current UTC time, pinned by `IOCWATCH_FIXED_TIME` (RFC 3339) when set.
pub fn now_utc() -> DateTime<Utc> {
    if let Ok(value) = std::env::var("IOCWATCH_FIXED_TIME") {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&value) {
            return dt.with_timezone(&Utc);
        }
    }
    Utc::now()
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parses a stored timestamp. Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP`
/// layout, which is UTC without an offset.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn hours(value: u64) -> Duration {
    let max_hours = (i64::MAX / 3_600_000) as u64;
    Duration::hours(value.min(max_hours) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_sqlite_layouts() {
        let a = parse_timestamp("2025-01-02T03:04:05+00:00").unwrap();
        let b = parse_timestamp("2025-01-02 03:04:05").unwrap();
        assert_eq!(a, b);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn format_round_trips_through_parse() {
        let ts = Utc::now();
        assert_eq!(parse_timestamp(&format_timestamp(ts)), Some(ts));
    }
}
