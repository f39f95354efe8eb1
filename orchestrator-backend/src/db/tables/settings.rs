//! Run settings persisted as one JSON document under the `settings` meta key

use log::warn;
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::Settings;

const SETTINGS_KEY: &str = "settings";

impl Database {
    /// Load settings merged over the defaults.
    /// Missing or unparseable JSON is replaced by the defaults instead of failing;
    /// a single bad value only resets that key.
    pub fn load_settings(&self) -> SqliteResult<Settings> {
        let raw = self.get_meta(SETTINGS_KEY, "")?;
        let parsed = if raw.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value) => Some(Settings::merge_over_defaults(&value)),
                Err(e) => {
                    warn!("[store] Stored settings are corrupt ({}), resetting to defaults", e);
                    None
                }
            }
        };

        let settings = parsed.unwrap_or_default();
        // Persist the merged form so every key is present from now on
        let merged = serde_json::to_string(&settings).unwrap_or_default();
        if merged != raw {
            self.set_meta(SETTINGS_KEY, &merged)?;
        }
        Ok(settings)
    }

    /// Persist the full merged settings document
    pub fn save_settings(&self, settings: &Settings) -> SqliteResult<()> {
        let json = serde_json::to_string(settings)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.set_meta(SETTINGS_KEY, &json)
    }
}
