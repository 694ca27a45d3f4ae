//! Payload parsing for knowledge sources.
//!
//! Accepted shapes, tried in order:
//!
//! 1. A JSON array of objects with string `author` and `content`.
//! 2. A JSON object whose `knowledgeBase` field holds such an array.
//! 3. Plain text, one `author,source,content` record per line. Commas after
//!    the second one belong to the content.
//!
//! Entries that do not match are dropped silently; only a payload with no
//! recognisable structure at all is an error.

use crate::error::{FetchError, Result};
use crate::types::FetchedItem;
use serde_json::{Map, Value};

/// Keys the reconciler owns; a remote payload cannot smuggle them in.
const RESERVED_KEYS: &[&str] = &["dataSource", "sourceId", "sourceName", "syncTime"];

/// Parse a response body into normalized items, preserving source order.
///
/// # Errors
///
/// - [`FetchError::NoItems`] when the body is JSON of any other shape.
/// - [`FetchError::Parse`] when the body is not JSON and no text line has
///   at least three comma-separated fields.
pub fn parse_payload(body: &str) -> Result<Vec<FetchedItem>> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => parse_json(value),
        Err(_) => parse_lines(body),
    }
}

fn parse_json(value: Value) -> Result<Vec<FetchedItem>> {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("knowledgeBase") {
            Some(Value::Array(entries)) => entries,
            _ => return Err(FetchError::NoItems),
        },
        _ => return Err(FetchError::NoItems),
    };

    let total = entries.len();
    let items: Vec<FetchedItem> = entries.into_iter().filter_map(item_from_json).collect();
    if items.len() < total {
        tracing::debug!(
            kept = items.len(),
            dropped = total - items.len(),
            "dropped malformed knowledge entries"
        );
    }
    Ok(items)
}

fn item_from_json(entry: Value) -> Option<FetchedItem> {
    let Value::Object(mut map) = entry else {
        return None;
    };
    if !map.get("author").is_some_and(Value::is_string)
        || !map.get("content").is_some_and(Value::is_string)
    {
        return None;
    }

    let author = take_string(&mut map, "author")?;
    let content = take_string(&mut map, "content")?;
    let source = take_string(&mut map, "source").unwrap_or_default();
    let create_time = take_string(&mut map, "createTime");
    let update_time = take_string(&mut map, "updateTime");
    for key in RESERVED_KEYS {
        map.remove(*key);
    }

    Some(FetchedItem {
        author,
        source,
        content,
        create_time,
        update_time,
        extra: map,
    })
}

/// Remove `key` and return it when it held a string. Non-string values are
/// removed too, so they cannot collide with the typed field on output.
fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn parse_lines(body: &str) -> Result<Vec<FetchedItem>> {
    let items: Vec<FetchedItem> = body
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            if parts.len() < 3 {
                return None;
            }
            Some(FetchedItem::new(parts[0], parts[1], parts[2..].join(",")))
        })
        .collect();

    if items.is_empty() {
        return Err(FetchError::Parse(
            "payload is neither JSON nor author,source,content lines".into(),
        ));
    }
    Ok(items)
}
