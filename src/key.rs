//! Cache key normalization.

use crate::error::{Error, Result};

/// Zero-width and otherwise invisible characters removed from keys.
const INVISIBLE: &[char] = &[
    '\u{00AD}', // soft hyphen
    '\u{180E}', // mongolian vowel separator
    '\u{200B}', // zero width space
    '\u{200C}', // zero width non-joiner
    '\u{200D}', // zero width joiner
    '\u{200E}', // left-to-right mark
    '\u{200F}', // right-to-left mark
    '\u{2060}', // word joiner
    '\u{FEFF}', // byte order mark
];

/// Canonicalize a cache key.
///
/// Leading/trailing whitespace is trimmed; control characters (tabs,
/// newlines) and invisible characters are removed wherever they occur, so
/// `"a\n\tb\u{200b}"` and `"ab"` address the same entry. Interior spaces are
/// kept.
///
/// # Errors
/// Returns a key error if nothing is left after normalization.
///
/// # Example
///
/// ```
/// use multicache::key::normalize_key;
///
/// assert_eq!(normalize_key("  key \t ").unwrap(), "key");
/// assert!(normalize_key(" \u{200b} ").is_err());
/// ```
pub fn normalize_key(key: &str) -> Result<String> {
    let normalized: String = key
        .chars()
        .filter(|c| !c.is_control() && !INVISIBLE.contains(c))
        .collect::<String>()
        .trim()
        .to_string();

    if normalized.is_empty() {
        return Err(Error::key("cache key must not be empty")
            .with_detail("raw_key", serde_json::json!(key)));
    }
    Ok(normalized)
}

/// Normalize a batch of keys, failing on the first invalid one.
pub fn normalize_keys<S: AsRef<str>>(keys: &[S]) -> Result<Vec<String>> {
    keys.iter().map(|k| normalize_key(k.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_key_basic() {
        assert_eq!(normalize_key("  key \t ").expect("valid key"), "key");
        assert_eq!(normalize_key("a\n\tb\u{200b}").expect("valid key"), "ab");
        assert_eq!(normalize_key("user: 1").expect("valid key"), "user: 1");
    }

    #[test]
    fn test_normalize_key_empty_raises() {
        for raw in ["", "   ", "\t\n", "\u{200b}\u{feff}"] {
            let err = normalize_key(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Key);
        }
    }

    #[test]
    fn test_normalize_keys_batch() {
        let keys = normalize_keys(&[" a", "b "]).expect("valid keys");
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert!(normalize_keys(&["a", " "]).is_err());
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(raw in "\\PC{0,24}") {
            if let Ok(once) = normalize_key(&raw) {
                prop_assert_eq!(normalize_key(&once).expect("normalized key stays valid"), once);
            }
        }

        #[test]
        fn prop_padding_collapses(core in "[a-z0-9:_-]{1,16}", pad in "[ \t\u{200b}]{0,4}") {
            let padded = format!("{}{}{}", pad, core, pad);
            prop_assert_eq!(normalize_key(&padded).expect("valid key"), core);
        }
    }
}
