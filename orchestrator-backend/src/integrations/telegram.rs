//! Telegram notifier (Bot API `sendMessage`).

use log::{debug, warn};
use serde_json::json;
use std::time::Duration;

use crate::error::{OrchestratorError, Result};

const SERVICE: &str = "telegram";
const API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const MAX_MESSAGE_LEN: usize = 3900;

pub struct TelegramNotifier {
    token: Option<String>,
    chat_id: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(token: Option<&str>, chat_id: Option<&str>) -> Self {
        Self::with_api_base(token, chat_id, API_BASE)
    }

    pub fn with_api_base(token: Option<&str>, chat_id: Option<&str>, api_base: &str) -> Self {
        let clean = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            token: clean(token),
            chat_id: clean(chat_id),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Disabled notifiers accept and drop every message
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn enabled(&self) -> bool {
        self.token.is_some() && self.chat_id.is_some()
    }

    /// Send `text`, split into chunks that each go out independently.
    /// Returns the number of chunks delivered.
    pub async fn send(&self, text: &str) -> Result<usize> {
        let (Some(token), Some(chat_id)) = (&self.token, &self.chat_id) else {
            return Ok(0);
        };
        let url = format!("{}/bot{}/sendMessage", self.api_base, token);

        let chunks = split_message(text, MAX_MESSAGE_LEN);
        let mut delivered = 0;
        let mut last_error = None;
        for chunk in &chunks {
            let result = self
                .client
                .post(&url)
                .json(&json!({"chat_id": chat_id, "text": chunk}))
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => delivered += 1,
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    warn!("[telegram] sendMessage returned HTTP {}", status);
                    last_error = Some(OrchestratorError::api(SERVICE, Some(status), "sendMessage failed"));
                }
                Err(e) => {
                    warn!("[telegram] sendMessage failed: {}", e);
                    last_error = Some(OrchestratorError::from_reqwest(SERVICE, e));
                }
            }
        }

        debug!("[telegram] {}/{} chunks delivered", delivered, chunks.len());
        match last_error {
            Some(err) if delivered == 0 => Err(err),
            _ => Ok(delivered),
        }
    }
}

/// Split at the last newline before `max_len`; hard cut when there is none.
/// Concatenating the chunks gives back the input.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }
        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let cut = match remaining[..limit].rfind('\n') {
            Some(pos) if pos > 0 => pos,
            _ if limit > 0 => limit,
            _ => remaining.chars().next().map_or(1, char::len_utf8),
        };
        chunks.push(remaining[..cut].to_string());
        remaining = &remaining[cut..];
    }
    chunks
}
