use serde::{Deserialize, Serialize};

use crate::models::message::{now_millis, Message, Role};

pub const DEFAULT_TITLE: &str = "New Chat";
const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: i64,
}

impl ChatSession {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            messages: Vec::new(),
            created_at: now_millis(),
        }
    }

    /// Append a message. The first user message fixes the title.
    pub fn push(&mut self, message: Message) {
        let first_user = message.role == Role::User
            && !self.messages.iter().any(|m| m.role == Role::User);
        if first_user {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
    }

    pub fn find_message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }
}

/// First 30 characters of the text, with `...` appended when it was longer.
pub fn derive_title(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
