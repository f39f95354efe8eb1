//! Metrics API response cache (amboss_series)

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult};
use serde_json::Value;

use super::super::Database;

impl Database {
    /// Cached payload for the series key if it is younger than `ttl`
    pub fn get_cached_series(
        &self,
        pubkey: &str,
        metric: &str,
        submetric: &str,
        from_date: &str,
        ttl: Duration,
    ) -> SqliteResult<Option<Value>> {
        let conn = self.conn();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT payload, fetched_at FROM amboss_series
                 WHERE pubkey = ?1 AND metric = ?2 AND submetric = ?3 AND from_date = ?4",
                rusqlite::params![pubkey, metric, submetric, from_date],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((payload, fetched_at)) = row else {
            return Ok(None);
        };
        let fresh = DateTime::parse_from_rfc3339(&fetched_at)
            .map(|ts| Utc::now() - ts.with_timezone(&Utc) < ttl)
            .unwrap_or(false);
        if !fresh {
            return Ok(None);
        }
        Ok(serde_json::from_str(&payload).ok())
    }

    /// Store the payload, replacing older windows of the same series
    pub fn put_cached_series(
        &self,
        pubkey: &str,
        metric: &str,
        submetric: &str,
        from_date: &str,
        payload: &Value,
    ) -> SqliteResult<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM amboss_series
             WHERE pubkey = ?1 AND metric = ?2 AND submetric = ?3 AND from_date <> ?4",
            rusqlite::params![pubkey, metric, submetric, from_date],
        )?;
        tx.execute(
            "INSERT INTO amboss_series (pubkey, metric, submetric, from_date, payload, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(pubkey, metric, submetric, from_date)
             DO UPDATE SET payload = excluded.payload, fetched_at = excluded.fetched_at",
            rusqlite::params![pubkey, metric, submetric, from_date, payload.to_string(), Utc::now().to_rfc3339()],
        )?;
        tx.commit()
    }
}
