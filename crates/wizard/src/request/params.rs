//! Query-string decoding with bracketed keys.
//!
//! `filter[name]=x&fields[test_models]=id&filter[ids][]=1&filter[ids][]=2`
//! decodes to the nested JSON object the request snapshot reads:
//! `{"filter": {"name": "x", "ids": ["1", "2"]}, "fields": {"test_models": "id"}}`.
//! A later scalar for the same key replaces the earlier one.

use serde_json::{Map, Value as JsonValue};
use url::form_urlencoded;

/// Deepest bracket nesting kept; deeper parameters are dropped.
const MAX_NESTING: usize = 64;

/// Decode a query string (with or without the leading `?`).
pub fn parse_query(query: &str) -> JsonValue {
    let mut root = Map::new();
    let query = query.strip_prefix('?').unwrap_or(query);

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let Some((head, path)) = split_key(&key) else {
            tracing::debug!(depth = MAX_NESTING, "dropping over-nested query parameter");
            continue;
        };
        if head.is_empty() {
            continue;
        }
        let slot = root.entry(head).or_insert(JsonValue::Null);
        insert(slot, &path, JsonValue::String(value.into_owned()));
    }

    JsonValue::Object(root)
}

fn split_key(key: &str) -> Option<(String, Vec<String>)> {
    let Some(open) = key.find('[') else {
        return Some((key.to_string(), Vec::new()));
    };

    let mut segments = Vec::new();
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            break;
        };
        if segments.len() == MAX_NESTING {
            return None;
        }
        segments.push(stripped[..close].to_string());
        rest = &stripped[close + 1..];
    }

    Some((key[..open].to_string(), segments))
}

fn insert(slot: &mut JsonValue, path: &[String], value: JsonValue) {
    let mut slot = slot;
    for segment in path {
        slot = if segment.is_empty() {
            if !slot.is_array() {
                *slot = JsonValue::Array(Vec::new());
            }
            let JsonValue::Array(items) = slot else {
                return;
            };
            items.push(JsonValue::Null);
            let Some(last) = items.last_mut() else {
                return;
            };
            last
        } else {
            if !slot.is_object() {
                *slot = JsonValue::Object(Map::new());
            }
            let JsonValue::Object(map) = slot else {
                return;
            };
            map.entry(segment.clone()).or_insert(JsonValue::Null)
        };
    }
    *slot = value;
}
