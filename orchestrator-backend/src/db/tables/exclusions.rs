//! Exclusion and forced-source registries

use chrono::Utc;
use rusqlite::Result as SqliteResult;
use std::collections::BTreeMap;

use super::super::Database;
use crate::identifiers::normalize;

/// The two identifier registries. They share a shape but never entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registry {
    Exclusions,
    ForcedSources,
}

impl Registry {
    fn table(self) -> &'static str {
        match self {
            Registry::Exclusions => "exclusions",
            Registry::ForcedSources => "forced_sources",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Registry::Exclusions => "exclusion",
            Registry::ForcedSources => "forced source",
        }
    }
}

impl Database {
    /// Upsert an entry. The identifier is normalized first; returns false if nothing is left of it.
    pub fn registry_add(&self, registry: Registry, identifier: &str, note: Option<&str>) -> SqliteResult<bool> {
        let identifier = normalize(identifier);
        if identifier.is_empty() {
            return Ok(false);
        }
        let note = note.map(str::trim).filter(|n| !n.is_empty());

        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO {} (identifier, note, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(identifier) DO UPDATE SET note = excluded.note",
                registry.table()
            ),
            rusqlite::params![identifier, note, Utc::now().to_rfc3339()],
        )?;
        Ok(true)
    }

    /// Remove an entry; removing an absent identifier is not an error
    pub fn registry_remove(&self, registry: Registry, identifier: &str) -> SqliteResult<bool> {
        let identifier = normalize(identifier);
        let conn = self.conn();
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE identifier = ?1", registry.table()),
            [identifier],
        )?;
        Ok(removed > 0)
    }

    /// Every stored entry as identifier -> note
    pub fn registry_list(&self, registry: Registry) -> SqliteResult<BTreeMap<String, Option<String>>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT identifier, note FROM {} ORDER BY identifier",
            registry.table()
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }

    /// Rewrite entries stored in non-normalized form. Returns how many rows changed.
    pub fn registry_normalize(&self, registry: Registry) -> SqliteResult<usize> {
        let conn = self.conn();
        let entries = self.registry_list(registry)?;
        let tx = conn.unchecked_transaction()?;
        let mut changed = 0;

        for (raw, note) in entries {
            let norm = normalize(&raw);
            if norm == raw {
                continue;
            }
            tx.execute(
                &format!("DELETE FROM {} WHERE identifier = ?1", registry.table()),
                [&raw],
            )?;
            if !norm.is_empty() {
                tx.execute(
                    &format!(
                        "INSERT INTO {} (identifier, note, created_at) VALUES (?1, ?2, ?3)
                         ON CONFLICT(identifier) DO UPDATE SET note = COALESCE(excluded.note, note)",
                        registry.table()
                    ),
                    rusqlite::params![norm, note, Utc::now().to_rfc3339()],
                )?;
            }
            changed += 1;
        }

        tx.commit()?;
        Ok(changed)
    }
}
