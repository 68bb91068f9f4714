//! Canonicalisation of loosely-typed task fields.
//!
//! Every function here is total: malformed input degrades to a default (or to
//! `None`) instead of failing the surrounding parse.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::model::Priority;

pub const DEFAULT_CONFIDENCE: f64 = 0.7;

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]?[0-9]|2[0-3]):([0-5][0-9])$").expect("valid regex"));

/// Only the four enum literals are accepted; anything else is `medium`.
pub fn priority(value: Option<&Value>) -> Priority {
    value
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<Priority>().ok())
        .unwrap_or_default()
}

/// Validates an ISO-8601 date (optionally with a time part) and returns `YYYY-MM-DD`.
pub fn date(value: Option<&Value>) -> Option<String> {
    let raw = value.and_then(Value::as_str)?.trim();
    if raw.is_empty() {
        return None;
    }
    parse_iso_date(raw).map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    None
}

/// Accepts `H:mm` or `HH:mm` on a 24-hour clock and returns zero-padded `HH:mm`.
pub fn time(value: Option<&Value>) -> Option<String> {
    let raw = value.and_then(Value::as_str)?.trim();
    let caps = TIME_RE.captures(raw)?;
    let hours: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minutes = caps.get(2)?.as_str();
    Some(format!("{:02}:{}", hours, minutes))
}

/// Numeric confidence clamped to `[0, 1]`; non-numeric input yields the default.
pub fn confidence(value: Option<&Value>) -> f64 {
    match value.and_then(Value::as_f64) {
        Some(n) if n.is_finite() => n.clamp(0.0, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

/// Trimmed, non-empty string or nothing.
pub fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!("low"), Priority::Low)]
    #[case(json!("medium"), Priority::Medium)]
    #[case(json!("high"), Priority::High)]
    #[case(json!("urgent"), Priority::Urgent)]
    #[case(json!("HIGH"), Priority::Medium)]
    #[case(json!("critical"), Priority::Medium)]
    #[case(json!(3), Priority::Medium)]
    #[case(json!(null), Priority::Medium)]
    fn priority_defaults_to_medium(#[case] input: Value, #[case] expected: Priority) {
        assert_eq!(priority(Some(&input)), expected);
    }

    #[test]
    fn missing_priority_is_medium() {
        assert_eq!(priority(None), Priority::Medium);
    }

    #[rstest]
    #[case("2025-03-10", Some("2025-03-10"))]
    #[case("2024-02-29", Some("2024-02-29"))]
    #[case("2025-03-10T15:00:00", Some("2025-03-10"))]
    #[case("2025-03-10T15:00:00+08:00", Some("2025-03-10"))]
    #[case("2025-02-30", None)]
    #[case("2023-02-29", None)]
    #[case("2025-13-01", None)]
    #[case("next tuesday", None)]
    #[case("", None)]
    fn date_validates_calendar(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(date(Some(&json!(input))).as_deref(), expected);
    }

    #[rstest]
    #[case("15:00", Some("15:00"))]
    #[case("9:05", Some("09:05"))]
    #[case("00:00", Some("00:00"))]
    #[case("23:59", Some("23:59"))]
    #[case("24:00", None)]
    #[case("12:60", None)]
    #[case("3pm", None)]
    #[case("15:00:00", None)]
    #[case("1500", None)]
    #[case(" ", None)]
    fn time_accepts_only_24_hour_clock(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(time(Some(&json!(input))).as_deref(), expected);
    }

    #[rstest]
    #[case(json!(0.9), 0.9)]
    #[case(json!(1.5), 1.0)]
    #[case(json!(-2), 0.0)]
    #[case(json!("0.9"), DEFAULT_CONFIDENCE)]
    #[case(json!(null), DEFAULT_CONFIDENCE)]
    fn confidence_is_clamped(#[case] input: Value, #[case] expected: f64) {
        assert_eq!(confidence(Some(&input)), expected);
    }

    #[test]
    fn canonical_values_are_fixed_points() {
        for p in Priority::ALL {
            let once = priority(Some(&json!(p.as_str())));
            assert_eq!(once, p);
            assert_eq!(priority(Some(&json!(once.as_str()))), once);
        }
        let d = date(Some(&json!("2025-12-25"))).unwrap();
        assert_eq!(date(Some(&json!(d.clone()))), Some(d));
        let t = time(Some(&json!("7:30"))).unwrap();
        assert_eq!(time(Some(&json!(t.clone()))), Some(t));
        let c = confidence(Some(&json!(0.42)));
        assert_eq!(confidence(Some(&json!(c))), c);
    }
}
