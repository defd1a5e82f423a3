use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::settings::StoredSetting;

/// Persistence port for the chat. Values are JSON documents keyed by name.
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> AppResult<Option<Value>>;
    fn save(&self, key: &str, value: &Value) -> AppResult<()>;
}

/// Key-value store backed by the `settings` table.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn get_setting(&self, key: &str) -> AppResult<Option<StoredSetting>> {
        let db = self.db.lock().map_err(|e| AppError::Database(e.to_string()))?;
        let result = db.query_row(
            "SELECT key, value, updated_at FROM settings WHERE key = ?1",
            params![key],
            |row| {
                Ok(StoredSetting {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        );

        match result {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) -> AppResult<()> {
        let db = self.db.lock().map_err(|e| AppError::Database(e.to_string()))?;
        db.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, value],
        )
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn load(&self, key: &str) -> AppResult<Option<Value>> {
        match self.get_setting(key)? {
            Some(setting) => Ok(Some(serde_json::from_str(&setting.value)?)),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, value: &Value) -> AppResult<()> {
        self.set_setting(key, &serde_json::to_string(value)?)
    }
}

/// Process-local store, for tests and hosts that don't persist.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> AppResult<Option<Value>> {
        let entries = self.entries.lock().map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> AppResult<()> {
        let mut entries = self.entries.lock().map_err(|e| AppError::Internal(e.to_string()))?;
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }
}
