use serde::{Deserialize, Serialize};

use crate::models::action::Action;

pub const ERROR_MARKER: &str = "❌ Error:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One chat turn. Only assistant messages carry `actions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: new_id("user"),
            role: Role::User,
            content: content.into(),
            timestamp: now_millis(),
            actions: None,
        }
    }

    pub fn assistant(content: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            id: new_id("ai"),
            role: Role::Assistant,
            content: content.into(),
            timestamp: now_millis(),
            actions: if actions.is_empty() { None } else { Some(actions) },
        }
    }

    /// Synthetic assistant message recording a failed exchange.
    pub fn error(message: &str) -> Self {
        Self {
            id: new_id("err"),
            role: Role::Assistant,
            content: format!("{ERROR_MARKER} {message}"),
            timestamp: now_millis(),
            actions: None,
        }
    }

    pub fn actions(&self) -> &[Action] {
        self.actions.as_deref().unwrap_or_default()
    }

    pub fn is_error(&self) -> bool {
        self.role == Role::Assistant && self.content.starts_with(ERROR_MARKER)
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
