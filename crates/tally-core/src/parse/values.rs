//! Tolerant coercion of loosely typed values into model fields.
//!
//! Both dialects funnel their raw values through here so that a wrong-typed
//! or sloppily formatted field degrades to a default instead of failing the
//! whole read.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_yaml::Value;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%B %d, %Y", "%b %d, %Y"];

/// Placeholder spellings that mean "no value".
#[must_use]
pub fn is_none_marker(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "" | "-" | "—" | "none" | "null" | "n/a" | "~" | "unassigned"
    )
}

/// Parse an RFC 3339 timestamp or one of the loose human formats.
///
/// Values without an offset are taken as UTC; bare dates are midnight UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    parse_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)).map(|n| n.and_utc())
}

#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Parse an effort value such as `4`, `4h`, `2.5 hours`.
#[must_use]
pub fn parse_hours(raw: &str) -> Option<f64> {
    let lowered = raw.trim().to_ascii_lowercase();
    let number = lowered
        .trim_end_matches("hours")
        .trim_end_matches("hour")
        .trim_end_matches("hrs")
        .trim_end_matches('h')
        .trim();
    number.parse::<f64>().ok().filter(|h| h.is_finite() && *h >= 0.0)
}

/// Split a comma or whitespace separated list, dropping empties.
#[must_use]
pub fn split_list(raw: &str) -> Vec<String> {
    if is_none_marker(raw) {
        return Vec::new();
    }
    let raw = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let sep: &[char] = if raw.contains(',') { &[','] } else { &[' ', '\t'] };
    raw.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Remove repeats while keeping first-seen order.
#[must_use]
pub fn dedup_ordered(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// Render a scalar YAML value as text. `null` and collections yield `None`.
#[must_use]
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

#[must_use]
pub fn scalar_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A finite, non-negative number of hours.
#[must_use]
pub fn scalar_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|h| h.is_finite() && *h >= 0.0),
        Value::String(s) => parse_hours(s),
        _ => None,
    }
}

/// A sequence of scalars, or a single delimited string.
#[must_use]
pub fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::Sequence(items) => items.iter().map(scalar_string).collect(),
        Value::String(s) => Some(split_list(s)),
        _ => None,
    }
}
