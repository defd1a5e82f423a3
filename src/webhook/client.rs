use std::sync::Arc;
use std::time::Duration;

use chrono::SecondsFormat;
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::models::config::WebhookConfig;
use crate::webhook::transport::WebhookTransport;

/// Raw reply body plus the content-type hint the normalizer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub body: String,
    pub content_type: Option<String>,
}

#[derive(Clone)]
pub struct WebhookClient {
    transport: Arc<dyn WebhookTransport>,
}

impl WebhookClient {
    pub fn new(transport: Arc<dyn WebhookTransport>) -> Self {
        Self { transport }
    }

    /// Send one user message to the configured webhook.
    ///
    /// Fails with `Config` before any I/O when the URL is missing or invalid,
    /// `Network` when the request never completes, and `Http` for non-2xx
    /// replies. No retries.
    pub async fn send(
        &self,
        config: &WebhookConfig,
        text: &str,
        session_id: Option<&str>,
    ) -> AppResult<RawReply> {
        let config = config.normalized();
        let url = config.validate()?;
        let payload = build_payload(&config, text, session_id);

        log::info!(
            "POST {} ({}={} chars, session={:?})",
            url,
            config.payload_key,
            text.chars().count(),
            session_id
        );

        let timeout = config.timeout_secs.map(Duration::from_secs);
        let resp = self
            .transport
            .post_json(url.as_str(), &payload, timeout)
            .await
            .map_err(|e| {
                log::error!("Failed to connect to n8n: {e}");
                e
            })?;

        if !resp.is_success() {
            log::error!("n8n replied with status {}: {}", resp.status, resp.body);
            return Err(AppError::Http {
                status: resp.status,
                body: resp.body,
            });
        }

        log::debug!(
            "n8n replied {} ({:?}, {} bytes)",
            resp.status,
            resp.content_type,
            resp.body.len()
        );
        Ok(RawReply {
            body: resp.body,
            content_type: resp.content_type,
        })
    }
}

/// `{ <payloadKey>: text, "timestamp": <ISO-8601>, "sessionId"?: id }`
pub fn build_payload(config: &WebhookConfig, text: &str, session_id: Option<&str>) -> Value {
    let mut body = Map::new();
    body.insert(config.payload_key.clone(), Value::String(text.to_string()));
    body.insert(
        "timestamp".into(),
        Value::String(chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    if let Some(id) = session_id {
        body.insert("sessionId".into(), Value::String(id.to_string()));
    }
    Value::Object(body)
}
