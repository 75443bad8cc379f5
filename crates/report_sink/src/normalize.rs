//! Helpers that keep event payloads bounded.
//!
//! Captured values can be arbitrarily large or deeply nested; everything
//! attached to an event goes through one of these first.

use serde_json::Value;

pub const DEFAULT_NORMALIZE_DEPTH: usize = 3;
pub const DEFAULT_MAX_SERIALIZED_BYTES: usize = 100 * 1024;
pub const DEFAULT_MAX_KEYS_LENGTH: usize = 40;

/// Returns a copy of `value` where containers deeper than `depth` are
/// replaced by `"[Object]"` / `"[Array]"` placeholders.
pub fn normalize(value: &Value, depth: usize) -> Value {
    match value {
        Value::Object(_) if depth == 0 => Value::String("[Object]".to_string()),
        Value::Array(_) if depth == 0 => Value::String("[Array]".to_string()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), normalize(item, depth - 1)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| normalize(item, depth - 1)).collect())
        }
        other => other.clone(),
    }
}

/// Normalizes `value` at `depth`, retrying one level shallower until the
/// serialized form fits in `max_bytes`.
pub fn normalize_to_size(value: &Value, depth: usize, max_bytes: usize) -> Value {
    let mut depth = depth;
    loop {
        let normalized = normalize(value, depth);
        if depth == 0 || json_size(&normalized) <= max_bytes {
            return normalized;
        }
        depth -= 1;
    }
}

/// Byte length of the compact JSON encoding.
pub fn json_size(value: &Value) -> usize {
    serde_json::to_string(value).map_or(0, |encoded| encoded.len())
}

/// Cuts `input` to at most `max` characters. `max == 0` disables truncation.
pub fn truncate(input: &str, max: usize) -> String {
    if max == 0 {
        return input.to_string();
    }
    match input.char_indices().nth(max) {
        Some((cut, _)) => input[..cut].to_string(),
        None => input.to_string(),
    }
}

/// Joins as many of the (already sorted) `keys` as fit in `max_length`.
pub fn keys_to_event_message(keys: &[String], max_length: usize) -> String {
    let Some(first) = keys.first() else {
        return "[object has no keys]".to_string();
    };
    if first.chars().count() >= max_length {
        return truncate(first, max_length);
    }

    for included in (1..=keys.len()).rev() {
        let serialized = keys[..included].join(", ");
        if serialized.chars().count() > max_length {
            continue;
        }
        if included == keys.len() {
            return serialized;
        }
        return truncate(&serialized, max_length);
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_replaces_deep_containers() {
        let value = json!({"a": {"b": {"c": [1, 2]}}, "list": [[1]]});
        assert_eq!(
            normalize(&value, 2),
            json!({"a": {"b": "[Object]"}, "list": ["[Array]"]})
        );
        assert_eq!(normalize(&value, 0), json!("[Object]"));
        assert_eq!(normalize(&json!("plain"), 0), json!("plain"));
    }

    #[test]
    fn normalize_to_size_drops_depth_until_it_fits() {
        let big = "x".repeat(512);
        let value = json!({"outer": {"inner": big}});

        let bounded = normalize_to_size(&value, DEFAULT_NORMALIZE_DEPTH, 64);
        assert_eq!(bounded, json!({"outer": "[Object]"}));
        assert!(json_size(&bounded) <= 64);

        let untouched = normalize_to_size(&value, DEFAULT_NORMALIZE_DEPTH, 4096);
        assert_eq!(untouched, value);
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("unbounded", 0), "unbounded");
    }

    #[test]
    fn keys_message_fits_within_limit() {
        let keys = |names: &[&str]| names.iter().map(|k| k.to_string()).collect::<Vec<_>>();

        assert_eq!(keys_to_event_message(&[], 40), "[object has no keys]");
        assert_eq!(keys_to_event_message(&keys(&["a", "b"]), 40), "a, b");
        assert_eq!(
            keys_to_event_message(&keys(&["alpha", "beta", "gamma"]), 12),
            "alpha, beta"
        );
        assert_eq!(
            keys_to_event_message(&keys(&["averyveryverylongkey"]), 5),
            "avery"
        );
    }
}
