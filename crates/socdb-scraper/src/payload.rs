//! Field access over loosely-shaped actor output.
//!
//! Actors rename fields between versions and mix numbers with numeric
//! strings, so every accessor takes a list of candidate keys and returns the
//! first usable value.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Follows a `a.b.c` path through nested objects.
fn lookup<'v>(raw: &'v Value, key: &str) -> Option<&'v Value> {
    key.split('.').try_fold(raw, |v, part| v.get(part))
}

fn first<'v>(raw: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    keys.iter()
        .filter_map(|k| lookup(raw, k))
        .find(|v| !v.is_null())
}

/// First non-empty string among `keys`; numbers are rendered as strings so
/// numeric ids survive.
pub(crate) fn string(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|k| lookup(raw, k)).find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn count(raw: &Value, keys: &[&str]) -> i64 {
    keys.iter()
        .filter_map(|k| lookup(raw, k))
        .find_map(|v| match v {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        })
        .unwrap_or(0)
}

pub(crate) fn flag(raw: &Value, keys: &[&str]) -> bool {
    first(raw, keys).and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn array<'v>(raw: &'v Value, keys: &[&str]) -> &'v [Value] {
    first(raw, keys)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Strings from an array that may hold plain strings or objects carrying
/// the value under `text`, `tag`, `username` or `screen_name`.
pub(crate) fn string_list(raw: &Value, keys: &[&str]) -> Vec<String> {
    array(raw, keys)
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim_start_matches(['#', '@']).to_string()),
            Value::Object(_) => string(item, &["text", "tag", "username", "screen_name"]),
            _ => None,
        })
        .collect()
}

/// Accepts RFC 3339, naive ISO timestamps (taken as UTC), the legacy
/// Twitter `Wed Oct 10 20:19:24 +0000 2018` format, and unix seconds or
/// milliseconds.
pub(crate) fn timestamp(raw: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    match first(raw, keys)? {
        Value::Number(n) => n.as_i64().and_then(from_unix),
        Value::String(s) => parse_timestamp(s.trim()),
        _ => None,
    }
}

fn from_unix(value: i64) -> Option<DateTime<Utc>> {
    // Anything past year 2286 in seconds is really milliseconds.
    if value > 9_999_999_999 {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    s.parse::<i64>().ok().and_then(from_unix)
}

/// `#word` tokens in `text`, without the `#`.
pub(crate) fn extract_tags(text: &str, marker: char) -> Vec<String> {
    let mut tags = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != marker {
            continue;
        }
        let start = i + c.len_utf8();
        let mut end = start;
        while let Some(&(j, next)) = chars.peek() {
            if next.is_alphanumeric() || next == '_' {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if end > start {
            tags.push(text[start..end].to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_prefers_first_present_key_and_renders_numbers() {
        let raw = json!({"id": 12345, "shortCode": "", "code": "Cx1"});
        assert_eq!(string(&raw, &["shortCode", "code"]), Some("Cx1".into()));
        assert_eq!(string(&raw, &["id"]), Some("12345".into()));
        assert_eq!(string(&raw, &["missing"]), None);
    }

    #[test]
    fn string_follows_nested_paths() {
        let raw = json!({"user": {"username": "nasa"}});
        assert_eq!(string(&raw, &["user.username"]), Some("nasa".into()));
    }

    #[test]
    fn count_accepts_numbers_and_numeric_strings() {
        let raw = json!({"a": 7, "b": "1,204", "c": 3.6, "d": "n/a"});
        assert_eq!(count(&raw, &["a"]), 7);
        assert_eq!(count(&raw, &["b"]), 1204);
        assert_eq!(count(&raw, &["c"]), 4);
        assert_eq!(count(&raw, &["d"]), 0);
        assert_eq!(count(&raw, &["missing", "a"]), 7);
    }

    #[test]
    fn timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        for raw in [
            json!({"t": "2024-03-01T12:30:00Z"}),
            json!({"t": "2024-03-01T12:30:00.000Z"}),
            json!({"t": "2024-03-01T12:30:00"}),
            json!({"t": "Fri Mar 01 12:30:00 +0000 2024"}),
            json!({"t": 1_709_296_200}),
            json!({"t": 1_709_296_200_000_i64}),
            json!({"t": "1709296200"}),
        ] {
            assert_eq!(timestamp(&raw, &["t"]), Some(expected), "{raw}");
        }
        assert_eq!(timestamp(&json!({"t": "yesterday"}), &["t"]), None);
    }

    #[test]
    fn string_list_handles_objects_and_prefixes() {
        let raw = json!({"tags": ["#rust", {"text": "tokio"}, 5], "m": [{"username": "nasa"}]});
        assert_eq!(string_list(&raw, &["tags"]), vec!["rust", "tokio"]);
        assert_eq!(string_list(&raw, &["m"]), vec!["nasa"]);
        assert!(string_list(&raw, &["none"]).is_empty());
    }

    #[test]
    fn extracts_hashtags_from_text() {
        assert_eq!(
            extract_tags("launch day #Artemis_II and #moon! #", '#'),
            vec!["Artemis_II", "moon"]
        );
        assert_eq!(extract_tags("日本 #旅行 trip", '#'), vec!["旅行"]);
        assert!(extract_tags("no tags", '#').is_empty());
    }
}
