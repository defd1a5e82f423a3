//! Expansion state of the action menu under one assistant message.
//!
//! A message starts collapsed. Clicking a branching action expands it, and
//! clicking it again collapses it; clicking another branching action moves the
//! expansion. Terminal actions and sub-actions produce a submission, and a
//! sub-action also collapses the menu.

use crate::models::action::{Action, SubAction};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionMenu {
    expanded: Option<usize>,
}

/// What a click asks the surrounding chat to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEvent {
    /// Send this text as a new user message.
    Submit(String),
    Expanded {
        index: usize,
        prompt: Option<String>,
        sub_actions: Vec<SubAction>,
    },
    Collapsed,
    /// The click did not refer to anything currently rendered.
    Ignored,
}

impl ActionMenu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expanded(&self) -> Option<usize> {
        self.expanded
    }

    pub fn select_action(&mut self, actions: &[Action], index: usize) -> MenuEvent {
        let Some(action) = actions.get(index) else {
            return MenuEvent::Ignored;
        };

        if !action.is_branching() {
            return MenuEvent::Submit(action.value.clone());
        }

        if self.expanded == Some(index) {
            self.expanded = None;
            return MenuEvent::Collapsed;
        }

        self.expanded = Some(index);
        MenuEvent::Expanded {
            index,
            prompt: action.sub_prompt.clone(),
            sub_actions: action.sub_actions.clone().unwrap_or_default(),
        }
    }

    /// Only sub-actions of the currently expanded action can be clicked.
    pub fn select_sub_action(
        &mut self,
        actions: &[Action],
        action_index: usize,
        sub_index: usize,
    ) -> MenuEvent {
        if self.expanded != Some(action_index) {
            return MenuEvent::Ignored;
        }

        let sub = actions
            .get(action_index)
            .and_then(|a| a.sub_actions.as_ref())
            .and_then(|subs| subs.get(sub_index));

        match sub {
            Some(sub) => {
                self.expanded = None;
                MenuEvent::Submit(sub.value.clone())
            }
            None => MenuEvent::Ignored,
        }
    }
}
