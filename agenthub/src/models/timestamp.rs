//! Lenient timestamp decoding.
//!
//! The backend is not consistent about dates: RFC 3339, naive
//! `YYYY-MM-DDTHH:MM:SS` (assumed UTC), space-separated variants and epoch
//! milliseconds all show up. Everything is normalized to `DateTime<Utc>`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a timestamp string in any of the accepted formats.
pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
        .or_else(|| s.parse::<i64>().ok().and_then(from_millis))
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse(s),
        Value::Number(n) => n.as_i64().and_then(from_millis),
        _ => None,
    }
}

/// Serde helper for required timestamps. Unparseable values fall back to now.
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(from_value(&value).unwrap_or_else(Utc::now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_rfc3339() {
        let dt = parse("2024-05-01T08:30:00+02:00").unwrap();
        assert_eq!(dt.hour(), 6);
    }

    #[test]
    fn parses_naive_as_utc() {
        let dt = parse("2024-05-01T08:30:00").unwrap();
        assert_eq!(dt.hour(), 8);
        let dt = parse("2024-05-01 08:30:00.123").unwrap();
        assert_eq!(dt.day(), 1);
    }

    #[test]
    fn parses_epoch_millis() {
        let dt = from_value(&serde_json::json!(1_714_552_200_000_i64)).unwrap();
        assert_eq!(dt.year(), 2024);
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse("yesterday").is_none());
    }
}
