//! HTTP client for the LNDg dashboard API.

use log::debug;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{OrchestratorError, Result};

const SERVICE: &str = "lndg";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Dashboard view of one channel (only the fields the rebalance trigger reads)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LndgChannel {
    pub chan_id: String,
    pub remote_pubkey: String,
    pub alias: Option<String>,
    pub capacity: i64,
    pub local_balance: i64,
    pub remote_balance: i64,
    pub auto_rebalance: bool,
    pub ar_out_target: i64,
    pub ar_in_target: i64,
    pub local_fee_rate: i64,
    pub is_active: bool,
    pub is_open: bool,
}

impl LndgChannel {
    pub fn outbound_ratio(&self) -> f64 {
        if self.capacity <= 0 {
            return 0.0;
        }
        (self.local_balance as f64 / self.capacity as f64).clamp(0.0, 1.0)
    }
}

pub struct LndgClient {
    base_url: String,
    auth: Option<(String, String)>,
    client: reqwest::Client,
}

impl LndgClient {
    pub fn new(base_url: &str, user: Option<&str>, pass: Option<&str>) -> Self {
        let auth = match (user, pass) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u.to_string(), p.to_string())),
            _ => None,
        };
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            client,
        }
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        builder
            .send()
            .await
            .map_err(|e| OrchestratorError::from_reqwest(SERVICE, e))
    }

    /// Open and active channels, following pagination
    pub async fn list_channels(&self) -> Result<Vec<LndgChannel>> {
        let mut url = Some(format!("{}/api/channels/", self.base_url));
        let mut first = true;
        let mut results = Vec::new();

        while let Some(current) = url.take() {
            let mut builder = self.request(Method::GET, &current);
            if first {
                builder = builder.query(&[("is_open", "true"), ("is_active", "true")]);
                first = false;
            }
            let response = self.send(builder).await?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(OrchestratorError::api(SERVICE, Some(status.as_u16()), text));
            }
            let data: Value = response
                .json()
                .await
                .map_err(|e| OrchestratorError::api(SERVICE, None, format!("invalid JSON: {}", e)))?;

            let page = match &data {
                Value::Object(obj) if obj.contains_key("results") => {
                    url = obj.get("next").and_then(Value::as_str).map(str::to_string);
                    obj.get("results").cloned().unwrap_or(Value::Array(Vec::new()))
                }
                Value::Array(_) => data.clone(),
                other => {
                    return Err(OrchestratorError::api(SERVICE, None, format!("unexpected response: {}", other)));
                }
            };
            let channels: Vec<LndgChannel> = serde_json::from_value(page)
                .map_err(|e| OrchestratorError::api(SERVICE, None, format!("unexpected channel shape: {}", e)))?;
            results.extend(channels);
        }

        debug!("[lndg] {} channels listed", results.len());
        Ok(results)
    }

    /// Update channel fields with PATCH, falling back to PUT when PATCH is not allowed
    pub async fn update_channel(&self, chan_id: &str, fields: &Value) -> Result<()> {
        let url = format!("{}/api/channels/{}/", self.base_url, chan_id);

        let response = self.send(self.request(Method::PATCH, &url).json(fields)).await?;
        let response = match response.status() {
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                debug!("[lndg] PATCH not allowed for {}, retrying with PUT", chan_id);
                self.send(self.request(Method::PUT, &url).json(fields)).await?
            }
            _ => response,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::api(SERVICE, Some(status.as_u16()), text));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::stub_server;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_channels_plain_list_with_auth() {
        let server = stub_server::spawn(vec![(
            200,
            r#"[{"chan_id": "1", "capacity": 100, "local_balance": 10, "auto_rebalance": true},
                {"chan_id": "2", "capacity": 100, "local_balance": 90}]"#
                .to_string(),
        )])
        .await;
        let client = LndgClient::new(&server.base_url, Some("admin"), Some("pw"));
        let channels = client.list_channels().await.unwrap();
        assert_eq!(channels.len(), 2);
        assert!(channels[0].auto_rebalance);
        assert!((channels[1].outbound_ratio() - 0.9).abs() < 1e-9);

        let requests = server.recorded();
        assert!(requests[0].path.starts_with("/api/channels/?"));
        assert!(requests[0].path.contains("is_open=true"));
        assert!(requests[0].header("authorization").unwrap().starts_with("Basic "));
    }

    #[tokio::test]
    async fn test_results_envelope() {
        let server = stub_server::spawn(vec![(
            200,
            r#"{"count": 1, "next": null, "results": [{"chan_id": "7", "is_open": true}]}"#.to_string(),
        )])
        .await;
        let client = LndgClient::new(&server.base_url, None, None);
        let channels = client.list_channels().await.unwrap();
        assert_eq!(channels[0].chan_id, "7");
        assert!(server.recorded()[0].header("authorization").is_none());
    }

    #[tokio::test]
    async fn test_update_falls_back_to_put() {
        let server = stub_server::spawn(vec![(405, "{}".to_string()), (200, "{}".to_string())]).await;
        let client = LndgClient::new(&server.base_url, None, None);
        client.update_channel("42", &json!({"auto_rebalance": true})).await.unwrap();

        let requests = server.recorded();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "PATCH");
        assert_eq!(requests[1].method, "PUT");
        assert_eq!(requests[1].path, "/api/channels/42/");
    }

    #[tokio::test]
    async fn test_update_error_is_permanent() {
        let server = stub_server::spawn(vec![(400, r#"{"detail": "bad"}"#.to_string())]).await;
        let client = LndgClient::new(&server.base_url, None, None);
        let err = client.update_channel("42", &json!({})).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::PermanentApi { status: Some(400), .. }));
        assert_eq!(server.recorded().len(), 1);
    }
}
