//! Append-only telemetry log

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;
use serde_json::Value;
use std::str::FromStr;

use super::super::Database;
use crate::models::{Level, TelemetryRecord};

impl Database {
    /// Append one record and return its id
    pub fn log_telemetry(
        &self,
        level: Level,
        component: &str,
        message: &str,
        extra: Option<&Value>,
    ) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO telemetry_log (ts, level, component, message, extra) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                Utc::now().to_rfc3339(),
                level.as_ref(),
                component,
                message,
                extra.map(|v| v.to_string()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent records first, optionally restricted to one component
    pub fn recent_telemetry(&self, limit: usize, component: Option<&str>) -> SqliteResult<Vec<TelemetryRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, ts, level, component, message, extra FROM telemetry_log
             WHERE (?1 IS NULL OR component = ?1)
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![component, limit as i64], |row| {
            let ts: String = row.get(1)?;
            let level: String = row.get(2)?;
            let extra: Option<String> = row.get(5)?;
            Ok(TelemetryRecord {
                id: row.get(0)?,
                ts: DateTime::parse_from_rfc3339(&ts)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                level: Level::from_str(&level).unwrap_or(Level::Info),
                component: row.get(3)?,
                message: row.get(4)?,
                extra: extra.and_then(|s| serde_json::from_str(&s).ok()),
            })
        })?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::Level;
    use serde_json::json;

    #[test]
    fn test_recent_first_with_filter() {
        let db = Database::open(":memory:").unwrap();
        db.log_telemetry(Level::Info, "autofee", "first", None).unwrap();
        db.log_telemetry(Level::Error, "ar", "boom", Some(&json!({"kind": "permanent_api"}))).unwrap();
        db.log_telemetry(Level::Info, "autofee", "second", None).unwrap();

        let all = db.recent_telemetry(10, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].message, "second");

        let autofee = db.recent_telemetry(10, Some("autofee")).unwrap();
        assert_eq!(autofee.len(), 2);
        assert!(autofee.iter().all(|r| r.component == "autofee"));

        let ar = db.recent_telemetry(1, Some("ar")).unwrap();
        assert_eq!(ar[0].level, Level::Error);
        assert_eq!(ar[0].extra.as_ref().unwrap()["kind"], "permanent_api");
    }
}
