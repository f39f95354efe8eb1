//! Read-only access to the LNDg dashboard's SQLite database.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{OrchestratorError, Result};

/// Forwarding and rebalance totals over a lookback window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub out_fee_sat: i64,
    pub out_amt_sat: i64,
    pub rebal_fee_sat: i64,
    pub rebal_amt_sat: i64,
    pub out_ppm: f64,
    pub rebal_cost_ppm: f64,
    pub profit_sat: i64,
    pub profit_ppm_est: f64,
}

pub fn ppm(fee_sat: i64, amount_sat: i64) -> f64 {
    if amount_sat <= 0 {
        return 0.0;
    }
    fee_sat as f64 / amount_sat as f64 * 1_000_000.0
}

/// LNDg stores naive UTC timestamps
fn to_sqlite_str(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

pub struct LndgDatabase {
    path: PathBuf,
}

impl LndgDatabase {
    pub fn new(path: &str) -> Self {
        Self {
            path: crate::config::expand_home(path),
        }
    }

    fn connect(&self) -> Result<Connection> {
        if !self.path.exists() {
            return Err(OrchestratorError::config(format!(
                "LNDg database not found at {}",
                self.path.display()
            )));
        }
        Ok(Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?)
    }

    fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Prefer the dashboard's `gui_*` tables, fall back to the raw ones
    fn pick_table(conn: &Connection, preferred: &'static str, fallback: &'static str) -> Result<&'static str> {
        if Self::table_exists(conn, preferred)? {
            Ok(preferred)
        } else {
            Ok(fallback)
        }
    }

    /// Totals for `[now - lookback_days, now]`
    pub fn kpis(&self, lookback_days: u32, now: DateTime<Utc>) -> Result<Kpis> {
        let conn = self.connect()?;
        let forwards = Self::pick_table(&conn, "gui_forwards", "forwards")?;
        let payments = Self::pick_table(&conn, "gui_payments", "payments")?;

        let from = to_sqlite_str(now - Duration::days(lookback_days as i64));
        let to = to_sqlite_str(now);

        let (out_amt_msat, out_fee_sat): (f64, f64) = conn.query_row(
            &format!(
                "SELECT COALESCE(SUM(amt_out_msat), 0), COALESCE(SUM(fee), 0) FROM {}
                 WHERE forward_date BETWEEN ?1 AND ?2",
                forwards
            ),
            [&from, &to],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let (rebal_amt_sat, rebal_fee_sat): (f64, f64) = conn.query_row(
            &format!(
                "SELECT COALESCE(SUM(value), 0), COALESCE(SUM(fee), 0) FROM {}
                 WHERE rebal_chan IS NOT NULL AND chan_out IS NOT NULL AND creation_date BETWEEN ?1 AND ?2",
                payments
            ),
            [&from, &to],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let out_amt_sat = (out_amt_msat / 1000.0) as i64;
        let out_fee_sat = out_fee_sat as i64;
        let rebal_amt_sat = rebal_amt_sat as i64;
        let rebal_fee_sat = rebal_fee_sat as i64;
        let out_ppm = ppm(out_fee_sat, out_amt_sat);
        let rebal_cost_ppm = ppm(rebal_fee_sat, rebal_amt_sat);

        Ok(Kpis {
            out_fee_sat,
            out_amt_sat,
            rebal_fee_sat,
            rebal_amt_sat,
            out_ppm,
            rebal_cost_ppm,
            profit_sat: out_fee_sat - rebal_fee_sat,
            profit_ppm_est: out_ppm - rebal_cost_ppm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir, gui_tables: bool) -> String {
        let path = dir.path().join("lndg.sqlite3");
        let conn = Connection::open(&path).unwrap();
        let (fwd, pay) = if gui_tables {
            ("gui_forwards", "gui_payments")
        } else {
            ("forwards", "payments")
        };
        conn.execute_batch(&format!(
            "CREATE TABLE {fwd} (forward_date TEXT, amt_out_msat INTEGER, fee REAL, chan_id_out TEXT);
             CREATE TABLE {pay} (creation_date TEXT, value INTEGER, fee REAL, rebal_chan TEXT, chan_out TEXT, status INTEGER);"
        ))
        .unwrap();

        let now = Utc::now();
        let recent = to_sqlite_str(now - Duration::days(1));
        let old = to_sqlite_str(now - Duration::days(30));
        conn.execute(&format!("INSERT INTO {fwd} VALUES (?1, 2000000000, 1000, '1')"), [&recent]).unwrap();
        conn.execute(&format!("INSERT INTO {fwd} VALUES (?1, 9000000000, 9000, '1')"), [&old]).unwrap();
        conn.execute(&format!("INSERT INTO {pay} VALUES (?1, 500000, 100, '2', '1', 2)"), [&recent]).unwrap();
        conn.execute(&format!("INSERT INTO {pay} VALUES (?1, 500000, 999, NULL, NULL, 2)"), [&recent]).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_kpis_over_window() {
        let dir = TempDir::new().unwrap();
        let db = LndgDatabase::new(&fixture(&dir, true));
        let kpis = db.kpis(7, Utc::now()).unwrap();

        assert_eq!(kpis.out_amt_sat, 2_000_000);
        assert_eq!(kpis.out_fee_sat, 1000);
        assert_eq!(kpis.rebal_amt_sat, 500_000);
        assert_eq!(kpis.rebal_fee_sat, 100);
        assert_eq!(kpis.profit_sat, 900);
        assert!((kpis.out_ppm - 500.0).abs() < 1e-9);
        assert!((kpis.rebal_cost_ppm - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_falls_back_to_raw_tables() {
        let dir = TempDir::new().unwrap();
        let db = LndgDatabase::new(&fixture(&dir, false));
        assert_eq!(db.kpis(7, Utc::now()).unwrap().out_fee_sat, 1000);
    }

    #[test]
    fn test_missing_database_is_configuration_error() {
        let db = LndgDatabase::new("/nonexistent/lndg.sqlite3");
        assert!(matches!(db.kpis(7, Utc::now()), Err(OrchestratorError::Configuration(_))));
    }
}
