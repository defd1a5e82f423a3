use serde::{Deserialize, Serialize};

/// One row of the key-value store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSetting {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}
