//! LND REST fee transport.
//!
//! Authenticates with the hex-encoded macaroon header and trusts only the
//! node's own `tls.cert`. Calls are serialized over a single pooled connection.

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::retry::{retry_async, RetryPolicy};
use super::transport::{ChannelInfo, FeeTransport};
use crate::config::{default_lnd_dir, defaults, expand_home};
use crate::error::{OrchestratorError, Result};

const SERVICE: &str = "lnd-rest";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TIME_LOCK_DELTA: u32 = 80;

/// pubkey -> channel outpoints (`txid:index`)
type OutpointIndex = HashMap<String, Vec<String>>;

pub struct LndRestClient {
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    index: Mutex<Option<OutpointIndex>>,
    call_lock: Mutex<()>,
    closed: AtomicBool,
}

impl LndRestClient {
    /// Build from the configured host and credential paths. Empty values fall back to `~/.lnd`.
    pub fn new(rest_host: Option<&str>, macaroon_path: Option<&str>, tls_cert_path: Option<&str>) -> Result<Self> {
        let host = rest_host
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(defaults::LND_REST_HOST)
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');

        let macaroon_path = macaroon_path
            .filter(|p| !p.trim().is_empty())
            .map(expand_home)
            .unwrap_or_else(|| default_lnd_dir().join("data/chain/bitcoin/mainnet/admin.macaroon"));
        let tls_cert_path = tls_cert_path
            .filter(|p| !p.trim().is_empty())
            .map(expand_home)
            .unwrap_or_else(|| default_lnd_dir().join("tls.cert"));

        let macaroon_hex = load_macaroon(&macaroon_path)?;
        let pem = std::fs::read(&tls_cert_path).map_err(|e| {
            OrchestratorError::config(format!("cannot read TLS cert {}: {}", tls_cert_path.display(), e))
        })?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| OrchestratorError::config(format!("invalid TLS cert {}: {}", tls_cert_path.display(), e)))?;

        let client = reqwest::Client::builder()
            .default_headers(auth_headers(&macaroon_hex)?)
            .add_root_certificate(cert)
            .tls_built_in_root_certs(false)
            .pool_max_idle_per_host(1)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OrchestratorError::config(format!("cannot build REST client: {}", e)))?;

        info!("[lnd-rest] Using https://{} (cert {})", host, tls_cert_path.display());
        Ok(Self::from_parts(&format!("https://{}", host), client))
    }

    /// Wrap an already configured HTTP client
    pub fn from_parts(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry: RetryPolicy::default(),
            index: Mutex::new(None),
            call_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OrchestratorError::api(SERVICE, None, "client is closed"));
        }
        let _guard = self.call_lock.lock().await;
        let response = request
            .send()
            .await
            .map_err(|e| OrchestratorError::from_reqwest(SERVICE, e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::api(SERVICE, Some(status.as_u16()), text));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| OrchestratorError::api(SERVICE, None, format!("invalid JSON: {}", e)))
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        retry_async(self.retry, OrchestratorError::is_transient, |_| {
            self.send_once(self.client.get(&url))
        })
        .await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        retry_async(self.retry, OrchestratorError::is_transient, |_| {
            self.send_once(self.client.post(&url).json(body))
        })
        .await
    }

    async fn fetch_channels(&self) -> Result<Vec<ChannelInfo>> {
        let response = self.get_json("/v1/channels").await?;
        Ok(ChannelInfo::list_from_lnd_json(&response))
    }

    async fn outpoints_for(&self, pubkey: &str) -> Result<Vec<String>> {
        let mut index = self.index.lock().await;
        if index.is_none() {
            let channels = self.fetch_channels().await?;
            *index = Some(build_index(&channels));
        }
        Ok(index
            .as_ref()
            .and_then(|idx| idx.get(pubkey).cloned())
            .unwrap_or_default())
    }

    #[cfg(test)]
    pub(crate) async fn seed_index(&self, channels: &[ChannelInfo]) {
        *self.index.lock().await = Some(build_index(channels));
    }
}

fn load_macaroon(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|e| OrchestratorError::config(format!("cannot read macaroon {}: {}", path.display(), e)))?;
    Ok(hex::encode(bytes))
}

fn auth_headers(macaroon_hex: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(macaroon_hex)
        .map_err(|e| OrchestratorError::config(format!("invalid macaroon header: {}", e)))?;
    headers.insert("Grpc-Metadata-macaroon", value);
    Ok(headers)
}

fn build_index(channels: &[ChannelInfo]) -> OutpointIndex {
    let mut index: OutpointIndex = HashMap::new();
    for channel in channels.iter().filter(|c| !c.channel_point.is_empty()) {
        index
            .entry(channel.remote_pubkey.clone())
            .or_default()
            .push(channel.channel_point.clone());
    }
    index
}

fn policy_body(outpoint: &str, ppm: i64, inbound_discount_ppm: Option<i64>) -> Result<Value> {
    let (txid, output_index) = outpoint
        .split_once(':')
        .and_then(|(txid, idx)| idx.parse::<u32>().ok().map(|i| (txid, i)))
        .ok_or_else(|| OrchestratorError::api(SERVICE, None, format!("invalid channel point: {}", outpoint)))?;

    let mut body = json!({
        "chan_point": {"funding_txid_str": txid, "output_index": output_index},
        "fee_rate_ppm": ppm.max(0),
        "time_lock_delta": TIME_LOCK_DELTA,
    });
    if let Some(discount) = inbound_discount_ppm.filter(|d| *d > 0) {
        body["inbound_fee"] = json!({"fee_rate_ppm": -discount});
    }
    Ok(body)
}

/// `failed_updates` entries turned into one error line
fn failed_updates(response: &Value) -> Option<String> {
    let failed = response.get("failed_updates")?.as_array()?;
    if failed.is_empty() {
        return None;
    }
    let detail: Vec<String> = failed
        .iter()
        .map(|f| {
            let outpoint = f
                .get("outpoint")
                .map(|o| match o {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "?".to_string());
            let reason = f
                .get("update_error")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            format!("{}: {}", outpoint, reason)
        })
        .collect();
    Some(detail.join(", "))
}

fn short(outpoint: &str) -> &str {
    outpoint.get(..16).unwrap_or(outpoint)
}

#[async_trait]
impl FeeTransport for LndRestClient {
    fn name(&self) -> &'static str {
        "lnd-rest"
    }

    async fn set_fee(
        &self,
        pubkey: &str,
        ppm: i64,
        inbound_discount_ppm: Option<i64>,
        dry_run: bool,
    ) -> Result<Option<String>> {
        let outpoints = self.outpoints_for(pubkey).await?;
        if outpoints.is_empty() {
            return Err(OrchestratorError::api(SERVICE, None, format!("no channel found for {}", pubkey)));
        }

        if dry_run {
            let previews: Vec<String> = outpoints
                .iter()
                .map(|op| {
                    let mut line = format!("[dry-run] REST update chan_point={}... fee_rate_ppm={}", short(op), ppm);
                    if let Some(d) = inbound_discount_ppm.filter(|d| *d > 0) {
                        line.push_str(&format!(" inbound_fee_ppm={}", -d));
                    }
                    line
                })
                .collect();
            return Ok(Some(previews.join("\n")));
        }

        for outpoint in &outpoints {
            let body = policy_body(outpoint, ppm, inbound_discount_ppm)?;
            let response = self.post_json("/v1/chanpolicy", &body).await?;
            if let Some(detail) = failed_updates(&response) {
                return Err(OrchestratorError::api(SERVICE, None, format!("policy update failed: {}", detail)));
            }
            debug!("[lnd-rest] fee {} ppm set on {}", ppm, outpoint);
        }
        Ok(None)
    }

    /// Also refreshes the outpoint index
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
        let channels = self.fetch_channels().await?;
        *self.index.lock().await = Some(build_index(&channels));
        Ok(channels)
    }

    async fn refresh(&self) {
        *self.index.lock().await = None;
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.index.lock().await = None;
    }
}
