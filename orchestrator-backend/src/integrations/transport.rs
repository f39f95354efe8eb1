use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// One channel as reported by the node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub chan_id: String,
    pub channel_point: String,
    pub remote_pubkey: String,
    pub capacity: i64,
    pub local_balance: i64,
    pub remote_balance: i64,
    pub active: bool,
}

/// LND encodes 64-bit integers as JSON strings
fn int_field(value: &Value, key: &str) -> i64 {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

impl ChannelInfo {
    /// Parse one entry of a `listchannels` response; entries without a peer are skipped
    pub fn from_lnd_json(value: &Value) -> Option<Self> {
        let remote_pubkey = value.get("remote_pubkey")?.as_str()?.to_string();
        let channel_point = value.get("channel_point").and_then(Value::as_str).unwrap_or_default().to_string();
        let chan_id = match value.get("chan_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        Some(ChannelInfo {
            chan_id,
            channel_point,
            remote_pubkey,
            capacity: int_field(value, "capacity"),
            local_balance: int_field(value, "local_balance"),
            remote_balance: int_field(value, "remote_balance"),
            active: value.get("active").and_then(Value::as_bool).unwrap_or(false),
        })
    }

    /// Parse the `{"channels": [...]}` envelope
    pub fn list_from_lnd_json(value: &Value) -> Vec<Self> {
        value
            .get("channels")
            .and_then(Value::as_array)
            .map(|channels| channels.iter().filter_map(ChannelInfo::from_lnd_json).collect())
            .unwrap_or_default()
    }

    /// Share of capacity on our side, 0.0..=1.0
    pub fn outbound_ratio(&self) -> f64 {
        if self.capacity <= 0 {
            return 0.0;
        }
        (self.local_balance as f64 / self.capacity as f64).clamp(0.0, 1.0)
    }
}

/// The fee-setting backend chosen at startup
#[async_trait]
pub trait FeeTransport: Send + Sync {
    /// Short backend label for logs
    fn name(&self) -> &'static str;

    /// Set the outbound fee rate (and optional inbound discount) on every channel with `pubkey`.
    /// In dry-run nothing is written and a preview is returned.
    async fn set_fee(
        &self,
        pubkey: &str,
        ppm: i64,
        inbound_discount_ppm: Option<i64>,
        dry_run: bool,
    ) -> Result<Option<String>>;

    async fn list_channels(&self) -> Result<Vec<ChannelInfo>>;

    /// Drop cached channel data
    async fn refresh(&self) {}

    /// Release network resources
    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_lnd_channels() {
        let payload = json!({"channels": [
            {"chan_id": "871234567890123456", "channel_point": "abcd:1", "remote_pubkey": "02aa",
             "capacity": "1000000", "local_balance": "250000", "remote_balance": "740000", "active": true},
            {"chan_id": "1", "capacity": "5"}
        ]});
        let channels = ChannelInfo::list_from_lnd_json(&payload);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].capacity, 1_000_000);
        assert!((channels[0].outbound_ratio() - 0.25).abs() < 1e-9);
    }
}
