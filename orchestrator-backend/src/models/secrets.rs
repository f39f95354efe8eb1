use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The singleton credentials/endpoints record (row id = 1)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Secrets {
    pub amboss_token: Option<String>,
    pub telegram_token: Option<String>,
    pub telegram_chat: Option<String>,
    pub lndg_url: Option<String>,
    pub lndg_user: Option<String>,
    pub lndg_pass: Option<String>,
    pub lndg_db_path: Option<String>,
    pub bos_path: Option<String>,
    pub lncli_path: Option<String>,
    /// host:port of the LND REST listener
    pub lnd_rest_host: Option<String>,
    pub macaroon_path: Option<String>,
    pub tls_cert_path: Option<String>,
    /// Prefer the REST transport for fee updates
    pub use_lnd_rest: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Secrets {
    /// Non-empty value or None
    fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn lndg_url(&self) -> Option<&str> {
        Self::non_empty(&self.lndg_url)
    }

    pub fn lndg_db_path(&self) -> Option<&str> {
        Self::non_empty(&self.lndg_db_path)
    }

    pub fn amboss_token(&self) -> Option<&str> {
        Self::non_empty(&self.amboss_token)
    }

    pub fn lncli_path(&self) -> &str {
        Self::non_empty(&self.lncli_path).unwrap_or(crate::config::defaults::LNCLI_PATH)
    }

    pub fn bos_path(&self) -> &str {
        Self::non_empty(&self.bos_path).unwrap_or(crate::config::defaults::BOS_PATH)
    }

    /// Rows printed by `show-config`, with tokens and passwords masked.
    pub fn display_rows(&self) -> Vec<(&'static str, String)> {
        let fields: [(&'static str, &Option<String>); 12] = [
            ("amboss_token", &self.amboss_token),
            ("telegram_token", &self.telegram_token),
            ("telegram_chat", &self.telegram_chat),
            ("lndg_url", &self.lndg_url),
            ("lndg_user", &self.lndg_user),
            ("lndg_pass", &self.lndg_pass),
            ("lndg_db_path", &self.lndg_db_path),
            ("bos_path", &self.bos_path),
            ("lncli_path", &self.lncli_path),
            ("lnd_rest_host", &self.lnd_rest_host),
            ("macaroon_path", &self.macaroon_path),
            ("tls_cert_path", &self.tls_cert_path),
        ];
        let mut rows: Vec<(&'static str, String)> = fields
            .iter()
            .map(|(key, value)| {
                let shown = match Self::non_empty(value) {
                    None => "<not configured>".to_string(),
                    Some(_) if key.contains("token") || key.contains("pass") => "***".to_string(),
                    Some(v) => v.to_string(),
                };
                (*key, shown)
            })
            .collect();
        rows.push(("use_lnd_rest", self.use_lnd_rest.to_string()));
        rows
    }
}

/// Partial update: only `Some` fields are written
#[derive(Debug, Clone, Default)]
pub struct SecretsPatch {
    pub amboss_token: Option<String>,
    pub telegram_token: Option<String>,
    pub telegram_chat: Option<String>,
    pub lndg_url: Option<String>,
    pub lndg_user: Option<String>,
    pub lndg_pass: Option<String>,
    pub lndg_db_path: Option<String>,
    pub bos_path: Option<String>,
    pub lncli_path: Option<String>,
    pub lnd_rest_host: Option<String>,
    pub macaroon_path: Option<String>,
    pub tls_cert_path: Option<String>,
    pub use_lnd_rest: Option<bool>,
}

impl SecretsPatch {
    /// (column, value) pairs for the fields present in this patch
    pub fn text_fields(&self) -> Vec<(&'static str, &str)> {
        let candidates: [(&'static str, &Option<String>); 12] = [
            ("amboss_token", &self.amboss_token),
            ("telegram_token", &self.telegram_token),
            ("telegram_chat", &self.telegram_chat),
            ("lndg_url", &self.lndg_url),
            ("lndg_user", &self.lndg_user),
            ("lndg_pass", &self.lndg_pass),
            ("lndg_db_path", &self.lndg_db_path),
            ("bos_path", &self.bos_path),
            ("lncli_path", &self.lncli_path),
            ("lnd_rest_host", &self.lnd_rest_host),
            ("macaroon_path", &self.macaroon_path),
            ("tls_cert_path", &self.tls_cert_path),
        ];
        candidates
            .into_iter()
            .filter_map(|(column, value)| value.as_deref().map(|v| (column, v)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.text_fields().is_empty() && self.use_lnd_rest.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_rows_mask_credentials() {
        let secrets = Secrets {
            telegram_token: Some("123:abc".to_string()),
            lndg_pass: Some("hunter2".to_string()),
            lndg_url: Some("http://localhost:8889".to_string()),
            ..Secrets::default()
        };
        let rows = secrets.display_rows();
        let get = |k: &str| rows.iter().find(|(key, _)| *key == k).map(|(_, v)| v.clone()).unwrap();
        assert_eq!(get("telegram_token"), "***");
        assert_eq!(get("lndg_pass"), "***");
        assert_eq!(get("lndg_url"), "http://localhost:8889");
        assert_eq!(get("amboss_token"), "<not configured>");
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(SecretsPatch::default().is_empty());
        let patch = SecretsPatch {
            use_lnd_rest: Some(true),
            ..SecretsPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_command_paths_default() {
        let secrets = Secrets {
            bos_path: Some("  ".to_string()),
            ..Secrets::default()
        };
        assert_eq!(secrets.bos_path(), "bos");
        assert_eq!(secrets.lncli_path(), "lncli");
    }
}
