//! Composite continuation tokens.
//!
//! A listing built from several independent sub-listings (one per object
//! type) needs one cursor per sub-listing. [`TokenPaginator`] holds those
//! cursors by name and moves them around as a single opaque string:
//! standard base64 of a JSON object mapping cursor name to cursor value.
//!
//! ```text
//! {"clients":"abc","groups":"def"}  ──base64──▶  eyJjbGllbnRzIjoiYWJjIiwiZ3JvdXBzIjoiZGVmIn0=
//! ```
//!
//! # Invariants
//!
//! - No entry ever holds an empty value. A sub-listing without a cursor is
//!   absent, never `""`.
//! - An empty set encodes to the empty string, and the empty string decodes
//!   to an empty set.
//! - Key order in the encoded JSON is unspecified.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Errors produced while decoding a continuation token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Not base64, or not a JSON object of string values.
    #[error("malformed continuation token: {reason}")]
    Malformed { reason: String },
}

/// Named set of per-sub-listing cursors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenPaginator {
    cursors: HashMap<String, String>,
}

impl TokenPaginator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes an inbound token. `""` yields an empty set.
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        if token.is_empty() {
            return Ok(Self::new());
        }

        let bytes = STANDARD.decode(token).map_err(|e| TokenError::Malformed {
            reason: format!("invalid base64: {e}"),
        })?;
        let raw: HashMap<String, String> =
            serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed {
                reason: format!("invalid JSON: {e}"),
            })?;

        let mut paginator = Self::new();
        paginator.replace_cursors(raw);
        Ok(paginator)
    }

    /// Upserts `name -> value`. Does nothing when `value` is empty.
    pub fn set_cursor(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.cursors.insert(name.into(), value);
    }

    /// Drops every cursor, then sets each pair of `cursors`.
    pub fn replace_cursors<I, K, V>(&mut self, cursors: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.cursors.clear();
        for (name, value) in cursors {
            self.set_cursor(name, value);
        }
    }

    /// Encodes the set. Returns `""` when there is nothing to resume.
    pub fn encode(&self) -> String {
        if self.cursors.is_empty() {
            return String::new();
        }
        // A map of strings always serializes.
        let json = serde_json::to_vec(&self.cursors).unwrap_or_default();
        STANDARD.encode(json)
    }

    pub fn cursor(&self, name: &str) -> Option<&str> {
        self.cursors.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cursors.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cursors.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.cursors
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TokenPaginator {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut paginator = Self::new();
        paginator.replace_cursors(iter);
        paginator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_round_trip() {
        assert_eq!(TokenPaginator::new().encode(), "");
        assert!(TokenPaginator::decode("").unwrap().is_empty());
    }

    #[test]
    fn test_decode_known_token() {
        let token = STANDARD.encode(r#"{"clients":"abc","groups":"def"}"#);
        let paginator = TokenPaginator::decode(&token).unwrap();
        assert_eq!(paginator.cursor("clients"), Some("abc"));
        assert_eq!(paginator.cursor("groups"), Some("def"));
        assert_eq!(paginator.len(), 2);
    }

    #[test]
    fn test_decode_drops_empty_values() {
        let token = STANDARD.encode(r#"{"clients":"abc","groups":""}"#);
        let paginator = TokenPaginator::decode(&token).unwrap();
        assert_eq!(paginator.len(), 1);
        assert!(!paginator.contains("groups"));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let err = TokenPaginator::decode("%%%not base64%%%").unwrap_err();
        assert!(matches!(err, TokenError::Malformed { .. }));
    }

    #[test]
    fn test_decode_rejects_non_object_json() {
        for body in [r#"["clients"]"#, r#"{"clients": 1}"#, "not json"] {
            let err = TokenPaginator::decode(&STANDARD.encode(body)).unwrap_err();
            assert!(
                matches!(err, TokenError::Malformed { .. }),
                "expected malformed for {body}"
            );
        }
    }

    #[test]
    fn test_set_cursor_ignores_empty_value() {
        let mut paginator = TokenPaginator::new();
        paginator.set_cursor("clients", "");
        assert!(paginator.is_empty());

        paginator.set_cursor("clients", "abc");
        paginator.set_cursor("clients", "");
        assert_eq!(paginator.cursor("clients"), Some("abc"));
    }

    #[test]
    fn test_replace_cursors_clears_previous_entries() {
        let mut paginator: TokenPaginator = [("clients", "abc"), ("groups", "def")]
            .into_iter()
            .collect();
        paginator.replace_cursors([("roles", "ghi"), ("groups", "")]);

        assert_eq!(paginator.len(), 1);
        assert_eq!(paginator.cursor("roles"), Some("ghi"));
        assert!(!paginator.contains("clients"));
        assert!(!paginator.contains("groups"));
    }

    #[test]
    fn test_encoded_token_is_standard_base64_json() {
        let paginator: TokenPaginator = [("clients", "abc")].into_iter().collect();
        let bytes = STANDARD.decode(paginator.encode()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({ "clients": "abc" }));
    }

    proptest! {
        #[test]
        fn prop_encode_decode_round_trip(
            cursors in prop::collection::hash_map("[a-z_]{1,12}", ".{1,40}", 0..8)
        ) {
            let paginator: TokenPaginator = cursors.clone().into_iter().collect();
            let decoded = TokenPaginator::decode(&paginator.encode()).unwrap();
            prop_assert_eq!(decoded.into_map(), cursors);
        }

        #[test]
        fn prop_no_empty_values_survive(
            cursors in prop::collection::hash_map("[a-z]{1,6}", "[a-z]{0,3}", 0..10)
        ) {
            let paginator: TokenPaginator = cursors.into_iter().collect();
            prop_assert!(paginator.iter().all(|(_, v)| !v.is_empty()));
        }
    }
}
