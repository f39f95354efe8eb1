use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::time::Duration;

/// Single SQLite connection shared by every component.
///
/// The lock is re-entrant so a table method may call another table method
/// while holding the connection.
pub struct Database {
    conn: ReentrantMutex<Connection>,
}

impl Database {
    /// Open (or create) the store at `path`. `":memory:"` opens a private in-memory store.
    pub fn open(path: &str) -> SqliteResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            // Create parent directory if it doesn't exist
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).ok();
                }
            }
            let conn = Connection::open(path)?;
            conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
            conn
        };
        conn.busy_timeout(Duration::from_secs(5))?;

        let db = Self {
            conn: ReentrantMutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Lock the connection for the duration of the returned guard.
    pub(crate) fn conn(&self) -> ReentrantMutexGuard<'_, Connection> {
        self.conn.lock()
    }

    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn();

        // Key/value markers (schema version, app version, settings JSON)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Credentials and endpoints, exactly one row
        conn.execute(
            "CREATE TABLE IF NOT EXISTS secrets (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                amboss_token TEXT,
                telegram_token TEXT,
                telegram_chat TEXT,
                lndg_url TEXT,
                lndg_user TEXT,
                lndg_pass TEXT,
                lndg_db_path TEXT,
                bos_path TEXT,
                lncli_path TEXT,
                lnd_rest_host TEXT,
                macaroon_path TEXT,
                tls_cert_path TEXT,
                use_lnd_rest INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Whole-blob module state
        conn.execute(
            "CREATE TABLE IF NOT EXISTS namespaces (
                name TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Per-key module state for the large namespaces
        conn.execute(
            "CREATE TABLE IF NOT EXISTS namespace_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS telemetry_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                level TEXT NOT NULL,
                component TEXT NOT NULL,
                message TEXT NOT NULL,
                extra TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_telemetry_component ON telemetry_log(component, id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS exclusions (
                identifier TEXT PRIMARY KEY,
                note TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS forced_sources (
                identifier TEXT PRIMARY KEY,
                note TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Metrics API responses, expired by fetched_at
        conn.execute(
            "CREATE TABLE IF NOT EXISTS amboss_series (
                pubkey TEXT NOT NULL,
                metric TEXT NOT NULL,
                submetric TEXT NOT NULL DEFAULT '',
                from_date TEXT NOT NULL,
                payload TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                PRIMARY KEY (pubkey, metric, submetric, from_date)
            )",
            [],
        )?;

        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO secrets (id, use_lnd_rest, created_at, updated_at) VALUES (1, 0, ?1, ?1)",
            [&now],
        )?;

        Ok(())
    }
}
