//! Secrets singleton row operations

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::{Secrets, SecretsPatch};

fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl Database {
    /// Get the secret record (there's only one row)
    pub fn get_secrets(&self) -> SqliteResult<Secrets> {
        let conn = self.conn();
        conn.query_row(
            "SELECT amboss_token, telegram_token, telegram_chat, lndg_url, lndg_user, lndg_pass,
                    lndg_db_path, bos_path, lncli_path, lnd_rest_host, macaroon_path, tls_cert_path,
                    use_lnd_rest, created_at, updated_at
             FROM secrets WHERE id = 1",
            [],
            |row| {
                let use_lnd_rest: i64 = row.get::<_, Option<i64>>(12)?.unwrap_or(0);
                Ok(Secrets {
                    amboss_token: row.get(0)?,
                    telegram_token: row.get(1)?,
                    telegram_chat: row.get(2)?,
                    lndg_url: row.get(3)?,
                    lndg_user: row.get(4)?,
                    lndg_pass: row.get(5)?,
                    lndg_db_path: row.get(6)?,
                    bos_path: row.get(7)?,
                    lncli_path: row.get(8)?,
                    lnd_rest_host: row.get(9)?,
                    macaroon_path: row.get(10)?,
                    tls_cert_path: row.get(11)?,
                    use_lnd_rest: use_lnd_rest != 0,
                    created_at: parse_ts(row.get(13)?),
                    updated_at: parse_ts(row.get(14)?),
                })
            },
        )
    }

    /// Write only the fields present in `patch` and stamp `updated_at`.
    /// Returns false without touching the row when the patch is empty.
    pub fn update_secrets(&self, patch: &SecretsPatch) -> SqliteResult<bool> {
        if patch.is_empty() {
            return Ok(false);
        }

        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let text_fields = patch.text_fields();
        let mut updates = vec!["updated_at = ?1".to_string()];
        let mut param_index = 2;
        for (column, _) in &text_fields {
            updates.push(format!("{} = ?{}", column, param_index));
            param_index += 1;
        }
        if patch.use_lnd_rest.is_some() {
            updates.push(format!("use_lnd_rest = ?{}", param_index));
        }

        let query = format!("UPDATE secrets SET {} WHERE id = 1", updates.join(", "));

        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];
        for (_, value) in &text_fields {
            params.push(Box::new(value.to_string()));
        }
        if let Some(v) = patch.use_lnd_rest {
            params.push(Box::new(v as i32));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        conn.execute(&query, params_refs.as_slice())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::SecretsPatch;

    #[test]
    fn test_fresh_store_has_empty_secrets() {
        let db = Database::open(":memory:").unwrap();
        let secrets = db.get_secrets().unwrap();
        assert!(secrets.lndg_url.is_none());
        assert!(!secrets.use_lnd_rest);
        assert!(secrets.created_at.is_some());
    }

    #[test]
    fn test_patch_only_touches_given_fields() {
        let db = Database::open(":memory:").unwrap();
        db.update_secrets(&SecretsPatch {
            lndg_url: Some("http://localhost:8889".to_string()),
            lndg_user: Some("admin".to_string()),
            ..SecretsPatch::default()
        })
        .unwrap();
        db.update_secrets(&SecretsPatch {
            use_lnd_rest: Some(true),
            lndg_user: Some("operator".to_string()),
            ..SecretsPatch::default()
        })
        .unwrap();

        let secrets = db.get_secrets().unwrap();
        assert_eq!(secrets.lndg_url.as_deref(), Some("http://localhost:8889"));
        assert_eq!(secrets.lndg_user.as_deref(), Some("operator"));
        assert!(secrets.use_lnd_rest);
        assert!(secrets.updated_at >= secrets.created_at);
    }

    #[test]
    fn test_empty_patch_is_noop() {
        let db = Database::open(":memory:").unwrap();
        let before = db.get_secrets().unwrap().updated_at;
        assert!(!db.update_secrets(&SecretsPatch::default()).unwrap());
        assert_eq!(db.get_secrets().unwrap().updated_at, before);
    }
}
