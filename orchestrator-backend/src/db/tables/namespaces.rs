//! Namespaced module state.
//!
//! Most namespaces are stored as one JSON blob. The large, frequently rewritten
//! ones are decomposed into one row per top-level key; callers see the same
//! full-replace contract either way.

use chrono::Utc;
use log::warn;
use rusqlite::{OptionalExtension, Result as SqliteResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::super::Database;

pub const NS_AUTOFEE_CACHE: &str = "autofee_cache";
pub const NS_CHANNEL_STATE: &str = "channel_state";
pub const NS_AUTOFEE_OVERRIDES: &str = "overrides:autofee";
pub const NS_AUTOFEE_SYMPTOMS: &str = "autofee_last_symptoms";

/// Namespaces stored one row per key
pub const KEYED_NAMESPACES: [&str; 3] = [NS_AUTOFEE_CACHE, NS_CHANNEL_STATE, NS_AUTOFEE_OVERRIDES];

pub fn is_keyed(name: &str) -> bool {
    KEYED_NAMESPACES.contains(&name)
}

impl Database {
    /// Load a namespace, or `default` when absent or unreadable
    pub fn load_namespace(&self, name: &str, default: Value) -> SqliteResult<Value> {
        let conn = self.conn();

        if is_keyed(name) {
            let mut stmt = conn.prepare(
                "SELECT key, data FROM namespace_entries WHERE namespace = ?1 ORDER BY key",
            )?;
            let rows: Vec<(String, String)> = stmt
                .query_map([name], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<SqliteResult<_>>()?;
            if !rows.is_empty() {
                let mut object = Map::new();
                for (key, data) in rows {
                    match serde_json::from_str(&data) {
                        Ok(value) => {
                            object.insert(key, value);
                        }
                        Err(e) => warn!("[store] Dropping corrupt entry {}/{}: {}", name, key, e),
                    }
                }
                return Ok(Value::Object(object));
            }
        }

        let data: Option<String> = conn
            .query_row("SELECT data FROM namespaces WHERE name = ?1", [name], |row| row.get(0))
            .optional()?;
        Ok(match data {
            None => default,
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!("[store] Namespace {} is corrupt, using default: {}", name, e);
                    default
                }
            },
        })
    }

    /// Replace the whole namespace with `value`
    pub fn save_namespace(&self, name: &str, value: &Value) -> SqliteResult<()> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM namespace_entries WHERE namespace = ?1", [name])?;
        tx.execute("DELETE FROM namespaces WHERE name = ?1", [name])?;

        match value {
            // an empty keyed namespace is kept as a blob so it still loads as `{}`
            Value::Object(object) if is_keyed(name) && !object.is_empty() => {
                let mut stmt = tx.prepare(
                    "INSERT INTO namespace_entries (namespace, key, data, updated_at) VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (key, entry) in object {
                    stmt.execute(rusqlite::params![name, key, entry.to_string(), now])?;
                }
            }
            _ => {
                tx.execute(
                    "INSERT INTO namespaces (name, data, updated_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![name, value.to_string(), now],
                )?;
            }
        }

        tx.commit()
    }

    /// Typed load; `None` when absent or not decodable as `T`
    pub fn load_namespace_as<T: DeserializeOwned>(&self, name: &str) -> SqliteResult<Option<T>> {
        let value = self.load_namespace(name, Value::Null)?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(serde_json::from_value(value).ok())
    }

    pub fn save_namespace_as<T: Serialize>(&self, name: &str, value: &T) -> SqliteResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.save_namespace(name, &value)
    }
}
