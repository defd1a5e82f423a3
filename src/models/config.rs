use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const DEFAULT_PAYLOAD_KEY: &str = "chatInput";
pub const DEFAULT_RESPONSE_KEY: &str = "output";

/// Connection settings for the n8n webhook, persisted under `n8n-config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_payload_key")]
    pub payload_key: String,
    #[serde(default = "default_response_key")]
    pub response_key: String,
    /// Request timeout. `None` leaves the HTTP client's default in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            payload_key: default_payload_key(),
            response_key: default_response_key(),
            timeout_secs: None,
        }
    }
}

impl WebhookConfig {
    /// Trimmed URL, blank keys replaced by their defaults.
    pub fn normalized(&self) -> Self {
        Self {
            webhook_url: self.webhook_url.trim().to_string(),
            payload_key: non_blank_or(&self.payload_key, DEFAULT_PAYLOAD_KEY),
            response_key: non_blank_or(&self.response_key, DEFAULT_RESPONSE_KEY),
            timeout_secs: self.timeout_secs.filter(|secs| *secs > 0),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.webhook_url.trim().is_empty()
    }

    /// The URL must be an absolute http(s) URL before anything is sent.
    pub fn validate(&self) -> AppResult<reqwest::Url> {
        let raw = self.webhook_url.trim();
        if raw.is_empty() {
            return Err(AppError::Config("n8n Webhook URL is not configured.".into()));
        }

        let url = reqwest::Url::parse(raw)
            .map_err(|e| AppError::Config(format!("Invalid n8n Webhook URL '{raw}': {e}")))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(AppError::Config(format!(
                "Unsupported webhook URL scheme '{other}', expected http or https"
            ))),
        }
    }
}

/// Blank means whitespace-only; anything else is kept exactly as typed.
fn non_blank_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn default_payload_key() -> String {
    DEFAULT_PAYLOAD_KEY.into()
}
fn default_response_key() -> String {
    DEFAULT_RESPONSE_KEY.into()
}
