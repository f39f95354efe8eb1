//! Identifier normalization and classification.
//!
//! Registry entries are either 66-character hex node public keys or decimal
//! channel ids. The class is never stored; every consumer goes through
//! [`classify`] so the rule stays identical everywhere.

use std::collections::BTreeMap;

/// Shape of a normalized identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Pubkey,
    ChannelId,
}

/// Trim whitespace, strip trailing commas and one layer of matching quotes.
pub fn normalize(identifier: &str) -> String {
    let mut value = identifier.trim();
    // the whole comma run counts as one layer, otherwise `x,,` would not be idempotent
    while let Some(stripped) = value.strip_suffix(',') {
        value = stripped.trim_end();
    }
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && bytes[0] == bytes[bytes.len() - 1] && (bytes[0] == b'\'' || bytes[0] == b'"') {
        value = &value[1..value.len() - 1];
    }
    value.trim().to_string()
}

pub fn is_pubkey(identifier: &str) -> bool {
    identifier.len() == 66 && identifier.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn is_channel_id(identifier: &str) -> bool {
    !identifier.is_empty() && identifier.chars().all(|c| c.is_ascii_digit())
}

/// Classify an already-normalized identifier. `None` means it is dropped.
pub fn classify(identifier: &str) -> Option<IdentifierKind> {
    if is_pubkey(identifier) {
        Some(IdentifierKind::Pubkey)
    } else if is_channel_id(identifier) {
        Some(IdentifierKind::ChannelId)
    } else {
        None
    }
}

/// Normalize every entry of a registry listing and keep only one class.
/// Output is sorted by identifier; empty notes come back as "".
pub fn filter_kind(
    entries: &BTreeMap<String, Option<String>>,
    kind: IdentifierKind,
) -> Vec<(String, String)> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (identifier, note) in entries {
        let norm = normalize(identifier);
        if classify(&norm) == Some(kind) {
            out.insert(norm, note.clone().unwrap_or_default());
        }
    }
    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK: &str = "02aabbccddeeff00112233445566778899aabbccddeeff00112233445566778899";

    #[test]
    fn test_normalize_strips_quotes_and_commas() {
        assert_eq!(normalize("'abc',"), "abc");
        assert_eq!(normalize("abc"), "abc");
        assert_eq!(normalize("  \"123\" ,, "), "123");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["'abc',", "\"x\"", " 42 ,", "''", "plain"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_comma_run_is_one_layer() {
        assert_eq!(normalize("'abc',,"), "abc");
        assert_eq!(normalize(&normalize("123,,")), normalize("123,,"));
    }

    #[test]
    fn test_only_one_quote_layer_is_stripped() {
        assert_eq!(normalize("\"'nested'\""), "'nested'");
    }

    #[test]
    fn test_mismatched_quotes_are_kept() {
        assert_eq!(normalize("'abc\""), "'abc\"");
    }

    #[test]
    fn test_classify() {
        assert_eq!(PK.len(), 66);
        assert_eq!(classify(PK), Some(IdentifierKind::Pubkey));
        assert_eq!(classify("871234567890123456"), Some(IdentifierKind::ChannelId));
        assert_eq!(classify("xyz123"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn test_filter_kind_drops_unclassifiable() {
        let mut entries = BTreeMap::new();
        entries.insert(format!("'{}',", PK), Some("peer".to_string()));
        entries.insert("123".to_string(), None);
        entries.insert("xyz123".to_string(), Some("junk".to_string()));

        let pubkeys = filter_kind(&entries, IdentifierKind::Pubkey);
        assert_eq!(pubkeys, vec![(PK.to_string(), "peer".to_string())]);

        let channels = filter_kind(&entries, IdentifierKind::ChannelId);
        assert_eq!(channels, vec![("123".to_string(), String::new())]);
    }
}
