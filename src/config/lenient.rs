//! Tolerant field decoders for documents written by older or foreign tools.
//!
//! A drifted field falls back to its default instead of failing the whole
//! document: a `null` string becomes empty, a float interval is rounded, a
//! non-object list entry is dropped with a warning. Each decoder goes through
//! [`Value`] first, so it accepts anything JSON can hold.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::config::document::{DEFAULT_SYNC_INTERVAL_MINUTES, DataSource};

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// String field; `null`, arrays and objects decode as `""`.
pub(crate) fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Optional string field; anything that is not a scalar decodes as `None`.
pub(crate) fn opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

fn flag(value: Value, default: bool) -> bool {
    match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map_or(default, |f| f != 0.0),
        Value::String(s) => match s.trim() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => default,
        },
        _ => default,
    }
}

pub(crate) fn bool_or_true<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(flag(Value::deserialize(deserializer)?, true))
}

pub(crate) fn bool_or_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(flag(Value::deserialize(deserializer)?, false))
}

fn whole_number(value: &Value) -> Option<u64> {
    let float = match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return Some(v);
            }
            n.as_f64()?
        }
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    // `as` saturates for finite floats above u64::MAX.
    (float.is_finite() && float >= 0.0).then(|| float.round() as u64)
}

/// Non-negative counter; anything unusable decodes as 0.
pub(crate) fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(whole_number(&Value::deserialize(deserializer)?).unwrap_or(0))
}

/// Auto-sync interval in minutes; anything unusable decodes as the default.
pub(crate) fn sync_interval<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(whole_number(&Value::deserialize(deserializer)?).unwrap_or(DEFAULT_SYNC_INTERVAL_MINUTES))
}

/// Weekday list; entries that are not small whole numbers are dropped.
pub(crate) fn weekdays<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(entries
        .iter()
        .filter_map(whole_number)
        .filter_map(|n| u8::try_from(n).ok())
        .collect())
}

/// Anything but `"cloud"` is treated as local, so sync never claims it.
pub(crate) fn data_source<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DataSource, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if s.eq_ignore_ascii_case("cloud") => DataSource::Cloud,
        _ => DataSource::Local,
    })
}

/// List of records; entries that still fail to decode are dropped.
pub(crate) fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let entries = match Value::deserialize(deserializer)? {
        Value::Array(entries) => entries,
        Value::Null => return Ok(Vec::new()),
        other => {
            tracing::warn!("expected a list in config, found {other}; ignoring it");
            return Ok(Vec::new());
        }
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("dropping unreadable config entry: {e}");
                None
            }
        })
        .collect())
}

/// Optional record; a value that fails to decode is treated as absent.
pub(crate) fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => Ok(serde_json::from_value(value).ok()),
    }
}
