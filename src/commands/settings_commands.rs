use crate::db::chat_repo;
use crate::error::AppResult;
use crate::models::config::WebhookConfig;
use crate::state::{lock, AppState};

pub fn get_config(state: &AppState) -> AppResult<WebhookConfig> {
    state.config_snapshot()
}

/// Save new webhook settings. Blank keys fall back to their defaults; the URL
/// itself is only checked when a message is sent.
pub fn update_config(state: &AppState, config: WebhookConfig) -> AppResult<WebhookConfig> {
    let config = config.normalized();
    chat_repo::save_config(state.store.as_ref(), &config)?;
    *lock(&state.config)? = config.clone();
    log::info!("Webhook config updated (configured: {})", config.is_configured());
    Ok(config)
}
