//! Amboss GraphQL metrics client with a SQLite-backed TTL cache.

use chrono::Duration;
use log::debug;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::Database;
use crate::error::{OrchestratorError, Result};

const SERVICE: &str = "amboss";
const DEFAULT_URL: &str = "https://api.amboss.space/graphql";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

const SERIES_QUERY: &str = r#"
query GetNodeMetrics($from: String!, $metric: NodeMetricsKeys!, $pubkey: String!, $submetric: ChannelMetricsKeys) {
  getNodeMetrics(pubkey: $pubkey) {
    historical_series(from: $from, metric: $metric, submetric: $submetric)
  }
}
"#;

pub struct AmbossClient {
    db: Arc<Database>,
    token: String,
    url: String,
    ttl: Duration,
    client: reqwest::Client,
}

impl AmbossClient {
    pub fn new(db: Arc<Database>, token: &str, ttl: Duration) -> Self {
        Self::with_url(db, token, DEFAULT_URL, ttl)
    }

    pub fn with_url(db: Arc<Database>, token: &str, url: &str, ttl: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            db,
            token: token.to_string(),
            url: url.to_string(),
            ttl,
            client,
        }
    }

    /// Daily values of `metric`/`submetric` for `pubkey` since `from_date` (YYYY-MM-DD)
    pub async fn series(&self, pubkey: &str, metric: &str, submetric: &str, from_date: &str) -> Result<Vec<f64>> {
        if let Some(cached) = self
            .db
            .get_cached_series(pubkey, metric, submetric, from_date, self.ttl)?
        {
            if let Ok(values) = serde_json::from_value::<Vec<f64>>(cached) {
                debug!("[amboss] cache hit {}/{} for {}", metric, submetric, pubkey);
                return Ok(values);
            }
        }

        let payload = json!({
            "query": SERIES_QUERY,
            "variables": {
                "from": from_date,
                "metric": metric,
                "pubkey": pubkey,
                "submetric": submetric,
            },
        });
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| OrchestratorError::from_reqwest(SERVICE, e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::api(SERVICE, Some(status.as_u16()), text));
        }
        let data: Value = response
            .json()
            .await
            .map_err(|e| OrchestratorError::api(SERVICE, None, format!("invalid JSON: {}", e)))?;

        let values = parse_series(&data)
            .ok_or_else(|| OrchestratorError::api(SERVICE, None, format!("unexpected response: {}", data)))?;
        self.db
            .put_cached_series(pubkey, metric, submetric, from_date, &json!(values))?;
        Ok(values)
    }
}

/// `[[timestamp, value], ...]` -> values; a null series is empty
fn parse_series(data: &Value) -> Option<Vec<f64>> {
    let series = data.get("data")?.get("getNodeMetrics")?.get("historical_series")?;
    if series.is_null() {
        return Some(Vec::new());
    }
    Some(
        series
            .as_array()?
            .iter()
            .filter_map(|entry| {
                let pair = entry.as_array().filter(|p| p.len() == 2)?;
                match &pair[1] {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                }
            })
            .collect(),
    )
}
