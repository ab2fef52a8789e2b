//! Field deserializers for source-tool payloads that encode the same field in
//! several JSON shapes (ids as numbers or strings, dates with or without a
//! zone, zeroed sentinel dates).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accepts `991`, `"991"`, `""` (zero) and `null` (zero).
pub fn flexible_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(0),
        Value::Number(number) => number
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("expected unsigned id, got {number}"))),
        Value::String(text) if text.trim().is_empty() => Ok(0),
        Value::String(text) => text.trim().parse::<u64>().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for id, got {other}"
        ))),
    }
}

/// Accepts numbers, numeric strings, `""` and `null` (zero). `NaN` and
/// infinities are rejected since JSON cannot store them.
pub fn flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match value {
        Value::Null => 0.0,
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range"))?,
        Value::String(text) if text.trim().is_empty() => 0.0,
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(serde::de::Error::custom)?,
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected string or number, got {other}"
            )))
        }
    };
    if !parsed.is_finite() {
        return Err(serde::de::Error::custom(format!(
            "expected a finite number, got {parsed}"
        )));
    }
    Ok(parsed)
}

/// Accepts booleans, `0`/`1` and their string forms.
pub fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(false),
        Value::Bool(flag) => Ok(flag),
        Value::Number(number) => Ok(number.as_i64().unwrap_or(0) != 0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(serde::de::Error::custom(format!("invalid flag: {other}"))),
        },
        other => Err(serde::de::Error::custom(format!(
            "expected boolean flag, got {other}"
        ))),
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD` (both read as
/// UTC). `null`, `""` and zeroed dates such as `0000-00-00 00:00:00` are `None`.
pub fn flexible_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw.map(|raw| raw.trim().to_string()) else {
        return Ok(None);
    };
    parse_datetime(&raw).map_err(serde::de::Error::custom)
}

pub fn parse_datetime(raw: &str) -> Result<Option<DateTime<Utc>>, String> {
    if raw.is_empty() || raw.starts_with("0000-00-00") {
        return Ok(None);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(timestamp.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Some(naive.and_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()));
    }
    Err(format!("unrecognized timestamp: {raw}"))
}
