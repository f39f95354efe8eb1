//! Meta key/value operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::Database;
use crate::config::{APP_VERSION, APP_VERSION_DESC};

pub const META_APP_VERSION: &str = "app_version";
pub const META_APP_VERSION_DESC: &str = "app_version_desc";

impl Database {
    /// Value stored under `key`, or `default` when absent
    pub fn get_meta(&self, key: &str, default: &str) -> SqliteResult<String> {
        let conn = self.conn();
        let value: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value.unwrap_or_else(|| default.to_string()))
    }

    pub fn set_meta(&self, key: &str, value: &str) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO meta (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Refresh the version markers to this build
    pub fn ensure_version(&self) -> SqliteResult<()> {
        self.set_meta(META_APP_VERSION, APP_VERSION)?;
        self.set_meta(META_APP_VERSION_DESC, APP_VERSION_DESC)
    }
}
