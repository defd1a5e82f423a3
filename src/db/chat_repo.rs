use crate::db::kv_store::KeyValueStore;
use crate::error::AppResult;
use crate::models::config::WebhookConfig;
use crate::models::session::ChatSession;

pub const SESSIONS_KEY: &str = "chat-sessions";
pub const CONFIG_KEY: &str = "n8n-config";

/// Stored sessions, newest first. Missing or unreadable data yields an empty list.
pub fn load_sessions(store: &dyn KeyValueStore) -> Vec<ChatSession> {
    let value = match store.load(SESSIONS_KEY) {
        Ok(Some(v)) => v,
        Ok(None) => return Vec::new(),
        Err(e) => {
            log::warn!("Could not read stored sessions, starting empty: {e}");
            return Vec::new();
        }
    };

    serde_json::from_value(value).unwrap_or_else(|e| {
        log::warn!("Stored sessions are malformed, starting empty: {e}");
        Vec::new()
    })
}

pub fn save_sessions(store: &dyn KeyValueStore, sessions: &[ChatSession]) -> AppResult<()> {
    store.save(SESSIONS_KEY, &serde_json::to_value(sessions)?)
}

pub fn load_config(store: &dyn KeyValueStore) -> WebhookConfig {
    match store.load(CONFIG_KEY) {
        Ok(Some(v)) => serde_json::from_value(v).unwrap_or_else(|e| {
            log::warn!("Stored config is malformed, using defaults: {e}");
            WebhookConfig::default()
        }),
        Ok(None) => WebhookConfig::default(),
        Err(e) => {
            log::warn!("Could not read stored config, using defaults: {e}");
            WebhookConfig::default()
        }
    }
}

pub fn save_config(store: &dyn KeyValueStore, config: &WebhookConfig) -> AppResult<()> {
    store.save(CONFIG_KEY, &serde_json::to_value(config)?)
}
