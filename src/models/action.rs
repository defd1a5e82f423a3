use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A leaf menu choice. `value` is submitted as if the user had typed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAction {
    pub label: String,
    pub value: String,
}

/// A clickable choice attached to an assistant message.
///
/// With a non-empty `sub_actions` list the action is *branching*: selecting it
/// reveals the sub-menu instead of sending `value`. Otherwise it is *terminal*.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_actions: Option<Vec<SubAction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_prompt: Option<String>,
}

impl Action {
    pub fn terminal(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            sub_actions: None,
            sub_prompt: None,
        }
    }

    pub fn is_branching(&self) -> bool {
        self.sub_actions.as_ref().is_some_and(|subs| !subs.is_empty())
    }
}

/// Read the `actions` array of a webhook reply, keeping only well-formed entries.
///
/// An entry needs string `label` and `value`. A `subActions` field that is not
/// an array is ignored; malformed sub-actions inside it are dropped one by one.
pub fn parse_actions(raw: &Value) -> Vec<Action> {
    let Some(entries) = raw.as_array() else {
        return Vec::new();
    };

    let actions: Vec<Action> = entries.iter().filter_map(parse_action).collect();
    if actions.len() < entries.len() {
        log::warn!(
            "Dropped {} malformed action(s) from webhook reply",
            entries.len() - actions.len()
        );
    }
    actions
}

fn parse_action(entry: &Value) -> Option<Action> {
    let (label, value) = label_and_value(entry)?;

    let sub_actions = entry.get("subActions").and_then(Value::as_array).map(|subs| {
        subs.iter()
            .filter_map(|sub| {
                label_and_value(sub).map(|(label, value)| SubAction { label, value })
            })
            .collect::<Vec<_>>()
    });

    let sub_prompt = entry
        .get("subPrompt")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(Action {
        label,
        value,
        sub_actions,
        sub_prompt,
    })
}

fn label_and_value(entry: &Value) -> Option<(String, String)> {
    let label = entry.get("label")?.as_str()?;
    let value = entry.get("value")?.as_str()?;
    Some((label.to_string(), value.to_string()))
}
