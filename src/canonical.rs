//! Key canonicalization for export targets with restricted field names
//!
//! Some interchange containers reject field names longer than 31 characters or
//! starting with a non-alphanumeric character. These transforms rewrite a
//! metadata tree into names such a target accepts. Decoding never depends on
//! them: lookups always use the original names.

use serde_json::{Map, Value};

/// Default maximum key length after shortening
pub const DEFAULT_MAX_KEY_LEN: usize = 30;

/// Leading characters that mark attribute and text keys
pub const MARKER_PREFIXES: [char; 2] = ['@', '#'];

/// Shorten a key until it is at most `max_len` characters long.
///
/// The key is split into segments that each start at an uppercase letter
/// (`SizeX` -> `Size`, `X`). Every pass drops the last character of each
/// segment that has more than one character, keeping the capitals. When no
/// segment can shrink any further the key is truncated.
pub fn shorten_name(name: &str, max_len: usize) -> String {
    let mut chars: Vec<char> = name.chars().collect();
    while chars.len() > max_len {
        let segments = segment_bounds(&chars);
        let shrinkable = segments.iter().any(|(start, end)| end - start > 1);
        if !shrinkable {
            chars.truncate(max_len);
            break;
        }
        let mut next = Vec::with_capacity(chars.len());
        for (start, end) in segments {
            let keep = if end - start > 1 { end - 1 } else { end };
            next.extend_from_slice(&chars[start..keep]);
        }
        chars = next;
    }
    chars.into_iter().collect()
}

/// `[start, end)` bounds of each capitalized segment; a lowercase lead-in is its own segment
fn segment_bounds(chars: &[char]) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut start = 0;
    for (i, c) in chars.iter().enumerate() {
        if i > start && c.is_uppercase() {
            bounds.push((start, i));
            start = i;
        }
    }
    if start < chars.len() {
        bounds.push((start, chars.len()));
    }
    bounds
}

/// Remove every leading `@` or `#` marker
pub fn strip_marker(name: &str) -> &str {
    name.trim_start_matches(MARKER_PREFIXES)
}

/// Canonicalize one key: strip the marker, then shorten
pub fn canonical_key(name: &str, max_len: usize) -> String {
    shorten_name(strip_marker(name), max_len)
}

/// Canonicalize every key of a tree, recursing into nested maps and lists.
///
/// Values are left untouched; an absent value stays `null`. When two keys
/// collapse onto the same canonical name the later one wins. Canonical keys
/// never start with a marker and fit `max_len`, so a second pass changes
/// nothing.
pub fn canonicalize(value: &Value, max_len: usize) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(canonical_key(k, max_len), canonicalize(v, max_len));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| canonicalize(v, max_len)).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_short_names_untouched() {
        assert_eq!(shorten_name("SizeX", 30), "SizeX");
        assert_eq!(shorten_name("BinaryToElectronCountScaling", 30), "BinaryToElectronCountScaling");
    }

    #[test]
    fn test_long_name_drops_segment_tails() {
        // 34 characters; one pass removes one character per segment
        let name = "ReferenceIntensityNormalizationAbc";
        assert_eq!(name.len(), 34);
        assert_eq!(shorten_name(name, 30), "ReferencIntensitNormalizatioAb");
    }

    #[test]
    fn test_unshrinkable_name_is_truncated() {
        let name = "A".repeat(40);
        assert_eq!(shorten_name(&name, 30), "A".repeat(30));
    }

    #[test]
    fn test_strip_marker() {
        assert_eq!(strip_marker("@Type"), "Type");
        assert_eq!(strip_marker("#text"), "text");
        assert_eq!(strip_marker("Type"), "Type");
        assert_eq!(strip_marker("@@Type"), "Type");
        assert_eq!(strip_marker("#@Type"), "Type");
        assert_eq!(strip_marker("Ty@pe"), "Ty@pe");
        assert_eq!(strip_marker("@@"), "");
    }

    #[test]
    fn test_canonicalize_stacked_markers() {
        let tree = json!({"@@A": 1, "#@B": {"##C": null}});
        let once = canonicalize(&tree, 30);
        assert_eq!(once, json!({"A": 1, "B": {"C": null}}));
        assert_eq!(canonicalize(&once, 30), once);
    }

    #[test]
    fn test_canonicalize_nested() {
        let tree = json!({
            "Ocity": {
                "@Version": "1",
                "DataFiles": {"DataFile": [{"@Type": "Raw", "#text": "data\\Chirp.data"}]},
                "MetaInfo": {"Comment": null}
            }
        });
        let out = canonicalize(&tree, 30);
        assert_eq!(
            out,
            json!({
                "Ocity": {
                    "Version": "1",
                    "DataFiles": {"DataFile": [{"Type": "Raw", "text": "data\\Chirp.data"}]},
                    "MetaInfo": {"Comment": null}
                }
            })
        );
    }

    fn capitalized_key() -> impl Strategy<Value = String> {
        proptest::collection::vec("[A-Z][a-z0-9]{0,12}", 1..8).prop_map(|segments| segments.concat())
    }

    fn any_key() -> impl Strategy<Value = String> {
        prop_oneof![capitalized_key(), "[@#A-Za-z0-9_]{0,40}"]
    }

    proptest! {
        #[test]
        fn prop_shorten_is_idempotent(key in capitalized_key()) {
            let once = shorten_name(&key, DEFAULT_MAX_KEY_LEN);
            prop_assert_eq!(shorten_name(&once, DEFAULT_MAX_KEY_LEN), once);
        }

        #[test]
        fn prop_shorten_respects_bound(key in capitalized_key()) {
            prop_assert!(shorten_name(&key, DEFAULT_MAX_KEY_LEN).chars().count() <= DEFAULT_MAX_KEY_LEN);
        }

        #[test]
        fn prop_canonicalize_is_idempotent(
            keys in proptest::collection::vec(any_key(), 1..6),
            marker in "[@#]{0,3}",
        ) {
            let mut map = Map::new();
            for (i, k) in keys.iter().enumerate() {
                map.insert(format!("{}{}", marker, k), json!({ "Inner": i }));
            }
            let tree = Value::Object(map);
            let once = canonicalize(&tree, DEFAULT_MAX_KEY_LEN);
            prop_assert_eq!(canonicalize(&once, DEFAULT_MAX_KEY_LEN), once);
        }
    }
}
