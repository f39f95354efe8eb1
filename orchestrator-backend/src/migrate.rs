//! Import exclusion lists from the legacy fee and rebalance scripts.
//!
//! The fee script keeps pubkeys in `EXCLUSION_LIST = { ... }`, the rebalance
//! script keeps channel ids in `EXCLUSION_LIST = [ ... ]` and
//! `FORCE_SOURCE_LIST = [ ... ]`. One entry per line, `#` starts a note.

use log::info;
use std::collections::BTreeMap;
use std::path::Path;

use crate::db::{Database, Registry};
use crate::error::{OrchestratorError, Result};
use crate::identifiers::{is_channel_id, is_pubkey, normalize};

/// `(identifier, note)` pairs found in the legacy scripts
#[derive(Debug, Clone, Default)]
pub struct LegacyLists {
    pub pubkeys: Vec<(String, String)>,
    pub channel_ids: Vec<(String, String)>,
    pub forced_sources: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationCounts {
    pub pubkeys: usize,
    pub channel_ids: usize,
    pub forced_sources: usize,
}

/// Text between the first `open` after `marker` and its matching `close`
fn extract_block<'a>(text: &'a str, marker: &str, open: char, close: char) -> Option<&'a str> {
    let start = text.find(marker)?;
    let open_idx = start + text[start..].find(open)?;
    let mut depth = 0usize;
    for (idx, c) in text[open_idx..].char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[open_idx + open.len_utf8()..open_idx + idx]);
            }
        }
    }
    None
}

fn parse_entries(block: &str) -> Vec<(String, String)> {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (value, note) = match line.split_once('#') {
                Some((value, note)) => (value, note.trim()),
                None => (line, ""),
            };
            let identifier = normalize(value);
            (!identifier.is_empty()).then(|| (identifier, note.to_string()))
        })
        .collect()
}

/// Collapse duplicates. Later notes replace earlier ones; an empty note never erases one.
fn deduplicate(entries: impl IntoIterator<Item = (String, String)>) -> BTreeMap<String, String> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for (identifier, note) in entries {
        let slot = seen.entry(identifier).or_default();
        if !note.is_empty() {
            *slot = note;
        }
    }
    seen
}

fn read_script(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(OrchestratorError::config(format!("legacy script not found: {}", path.display())));
    }
    Ok(String::from_utf8_lossy(&std::fs::read(path)?).into_owned())
}

pub fn load_legacy_lists(autofee_script: &Path, ar_script: &Path) -> Result<LegacyLists> {
    let fee_text = read_script(autofee_script)?;
    let ar_text = read_script(ar_script)?;
    let entries = |text: &str, marker: &str, open: char, close: char| {
        extract_block(text, marker, open, close).map(parse_entries).unwrap_or_default()
    };
    Ok(LegacyLists {
        pubkeys: entries(&fee_text, "EXCLUSION_LIST", '{', '}'),
        channel_ids: entries(&ar_text, "EXCLUSION_LIST", '[', ']'),
        forced_sources: entries(&ar_text, "FORCE_SOURCE_LIST", '[', ']'),
    })
}

/// Normalize what is already stored, then import. Forced sources that are
/// not channel ids are skipped.
pub fn migrate(db: &Database, lists: &LegacyLists) -> Result<MigrationCounts> {
    let rewritten = db.registry_normalize(Registry::Exclusions)? + db.registry_normalize(Registry::ForcedSources)?;
    if rewritten > 0 {
        info!("[migrate] Normalized {} stored entries", rewritten);
    }

    let mut counts = MigrationCounts::default();
    let exclusions = deduplicate(lists.pubkeys.iter().chain(&lists.channel_ids).cloned());
    for (identifier, note) in &exclusions {
        db.registry_add(Registry::Exclusions, identifier, Some(note))?;
        if is_pubkey(identifier) {
            counts.pubkeys += 1;
        }
        if is_channel_id(identifier) {
            counts.channel_ids += 1;
        }
    }

    for (identifier, note) in deduplicate(lists.forced_sources.iter().cloned()) {
        if !is_channel_id(&identifier) {
            continue;
        }
        db.registry_add(Registry::ForcedSources, &identifier, Some(&note))?;
        counts.forced_sources += 1;
    }

    info!(
        "[migrate] Imported {} pubkeys, {} channel ids, {} forced sources",
        counts.pubkeys, counts.channel_ids, counts.forced_sources
    );
    Ok(counts)
}
