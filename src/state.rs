use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::db::chat_repo;
use crate::db::kv_store::{KeyValueStore, SqliteStore};
use crate::db::migrations;
use crate::error::{AppError, AppResult};
use crate::menu::ActionMenu;
use crate::models::config::WebhookConfig;
use crate::models::session::ChatSession;
use crate::webhook::client::WebhookClient;
use crate::webhook::transport::{ReqwestTransport, WebhookTransport};

/// True while a webhook exchange is in flight.
#[derive(Debug, Clone, Default)]
pub struct LoadingFlag(Arc<AtomicBool>);

impl LoadingFlag {
    pub fn is_loading(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the flag unless it is already up. The flag drops back when the
    /// returned guard is dropped, whatever way the exchange ends.
    pub fn try_begin(&self) -> Option<LoadingGuard> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| LoadingGuard(Arc::clone(&self.0)))
    }
}

#[must_use]
pub struct LoadingGuard(Arc<AtomicBool>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct AppState {
    /// Persistence for sessions and config
    pub store: Arc<dyn KeyValueStore>,
    pub client: WebhookClient,
    /// All sessions, newest first
    pub sessions: Arc<Mutex<Vec<ChatSession>>>,
    pub current_session_id: Arc<Mutex<Option<String>>>,
    pub config: Arc<Mutex<WebhookConfig>>,
    /// Text of the error banner, if one is showing
    pub error: Arc<Mutex<Option<String>>>,
    pub loading: LoadingFlag,
    /// Action menu state keyed by assistant message ID. Not persisted.
    pub menus: Arc<Mutex<HashMap<String, ActionMenu>>>,
}

impl AppState {
    /// Restore sessions and config from `store`; the newest session becomes current.
    pub fn new(store: Arc<dyn KeyValueStore>, transport: Arc<dyn WebhookTransport>) -> Self {
        let sessions = chat_repo::load_sessions(store.as_ref());
        let config = chat_repo::load_config(store.as_ref());
        let current = sessions.first().map(|s| s.id.clone());
        log::info!(
            "Loaded {} session(s), webhook configured: {}",
            sessions.len(),
            config.is_configured()
        );

        Self {
            store,
            client: WebhookClient::new(transport),
            sessions: Arc::new(Mutex::new(sessions)),
            current_session_id: Arc::new(Mutex::new(current)),
            config: Arc::new(Mutex::new(config)),
            error: Arc::new(Mutex::new(None)),
            loading: LoadingFlag::default(),
            menus: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// SQLite store in `~/.n8nchat` and a real HTTP transport.
    pub fn open_default() -> AppResult<Self> {
        let conn = migrations::init_db()?;
        Ok(Self::new(
            Arc::new(SqliteStore::new(conn)),
            Arc::new(ReqwestTransport::new()?),
        ))
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    pub fn config_snapshot(&self) -> AppResult<WebhookConfig> {
        Ok(lock(&self.config)?.clone())
    }

    pub fn sessions_snapshot(&self) -> AppResult<Vec<ChatSession>> {
        Ok(lock(&self.sessions)?.clone())
    }

    pub fn current_session_id(&self) -> AppResult<Option<String>> {
        Ok(lock(&self.current_session_id)?.clone())
    }

    pub fn set_current_session_id(&self, id: Option<String>) -> AppResult<()> {
        *lock(&self.current_session_id)? = id;
        Ok(())
    }

    pub fn error_banner(&self) -> AppResult<Option<String>> {
        Ok(lock(&self.error)?.clone())
    }

    pub fn set_error(&self, error: Option<String>) -> AppResult<()> {
        *lock(&self.error)? = error;
        Ok(())
    }

    /// Apply `f` to a copy of the session list and write it to the store.
    /// The in-memory list only changes once the write succeeded.
    pub fn update_sessions<R>(&self, f: impl FnOnce(&mut Vec<ChatSession>) -> R) -> AppResult<R> {
        let mut sessions = lock(&self.sessions)?;
        let mut next = sessions.clone();
        let result = f(&mut next);
        chat_repo::save_sessions(self.store.as_ref(), &next)?;
        *sessions = next;
        Ok(result)
    }
}

// Implement Clone manually to allow state sharing in spawned tasks
impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            client: self.client.clone(),
            sessions: Arc::clone(&self.sessions),
            current_session_id: Arc::clone(&self.current_session_id),
            config: Arc::clone(&self.config),
            error: Arc::clone(&self.error),
            loading: self.loading.clone(),
            menus: Arc::clone(&self.menus),
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> AppResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(|e| AppError::Internal(e.to_string()))
}
