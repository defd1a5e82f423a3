use serde_json::Value;

use crate::models::action::{parse_actions, Action};
use crate::models::config::WebhookConfig;

const FALLBACK_KEYS: [&str; 2] = ["output", "message"];

/// A webhook reply reduced to what the chat can display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookReply {
    PlainText(String),
    Structured { text: String, actions: Vec<Action> },
}

impl WebhookReply {
    pub fn text(&self) -> &str {
        match self {
            WebhookReply::PlainText(text) => text,
            WebhookReply::Structured { text, .. } => text,
        }
    }

    pub fn actions(&self) -> &[Action] {
        match self {
            WebhookReply::PlainText(_) => &[],
            WebhookReply::Structured { actions, .. } => actions,
        }
    }

    pub fn into_parts(self) -> (String, Vec<Action>) {
        match self {
            WebhookReply::PlainText(text) => (text, Vec::new()),
            WebhookReply::Structured { text, actions } => (text, actions),
        }
    }
}

pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
}

/// Turn a raw reply body into display text plus optional actions.
///
/// Never fails: anything that can't be read as the expected JSON shape is
/// shown verbatim.
pub fn normalize(raw_body: &str, content_type: Option<&str>, config: &WebhookConfig) -> WebhookReply {
    if !is_json_content_type(content_type) {
        return WebhookReply::PlainText(raw_body.to_string());
    }

    let parsed: Value = match serde_json::from_str(raw_body) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("Reply claims JSON but does not parse ({e}), showing raw text");
            return WebhookReply::PlainText(raw_body.to_string());
        }
    };

    let candidate = match &parsed {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let Some(candidate) = candidate.filter(|c| !c.is_null()) else {
        return WebhookReply::PlainText(raw_body.to_string());
    };

    let config = config.normalized();
    let extracted = extract(candidate, &config.response_key);
    let text = match extracted {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(&integral_floats_as_ints(other))
            .unwrap_or_else(|_| raw_body.to_string()),
    };

    let actions = candidate.get("actions").map(parse_actions).unwrap_or_default();
    if actions.is_empty() {
        WebhookReply::PlainText(text)
    } else {
        WebhookReply::Structured { text, actions }
    }
}

/// First key present wins, whatever its value; otherwise the whole candidate.
fn extract<'a>(candidate: &'a Value, response_key: &str) -> &'a Value {
    let Some(object) = candidate.as_object() else {
        return candidate;
    };

    if let Some(value) = object.get(response_key) {
        return value;
    }
    for key in FALLBACK_KEYS {
        if let Some(value) = object.get(key) {
            return value;
        }
    }
    candidate
}

/// JSON has one number type, so `1.0` from the webhook prints as `1`.
fn integral_floats_as_ints(value: &Value) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_992.0;
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < MAX_SAFE => Value::from(f as i64),
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(integral_floats_as_ints).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), integral_floats_as_ints(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
