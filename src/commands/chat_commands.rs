use crate::error::{AppError, AppResult};
use crate::menu::{ActionMenu, MenuEvent};
use crate::models::message::Message;
use crate::models::session::{ChatSession, DEFAULT_TITLE};
use crate::state::{lock, AppState};
use crate::webhook::normalizer::normalize;

/// Result of clicking an action or sub-action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionClick {
    pub event: MenuEvent,
    /// The assistant reply, when the click submitted a message.
    pub reply: Option<Message>,
}

/// Send `content` to the webhook in the current session (creating one if
/// needed) and append the reply.
///
/// Returns the appended assistant message. A failed exchange is not an `Err`:
/// the error is shown in the banner and recorded as an error message. `Err` is
/// reserved for requests that never started (empty input, a send already in
/// flight, missing webhook URL) and for storage failures.
pub async fn send_message(state: &AppState, content: &str) -> AppResult<Message> {
    let target = state.current_session_id()?;
    exchange(state, content, target).await
}

/// Click action `index` of assistant message `message_id`.
pub async fn click_action(state: &AppState, message_id: &str, index: usize) -> AppResult<ActionClick> {
    let (session_id, message) = find_message(state, message_id)?;
    let (before, event) = transition(state, message_id, |menu| {
        menu.select_action(message.actions(), index)
    })?;
    submit_if_requested(state, session_id, message_id, before, event).await
}

/// Click sub-action `sub_index` under the expanded action `action_index`.
pub async fn click_sub_action(
    state: &AppState,
    message_id: &str,
    action_index: usize,
    sub_index: usize,
) -> AppResult<ActionClick> {
    let (session_id, message) = find_message(state, message_id)?;
    let (before, event) = transition(state, message_id, |menu| {
        menu.select_sub_action(message.actions(), action_index, sub_index)
    })?;
    submit_if_requested(state, session_id, message_id, before, event).await
}

/// Index of the expanded action under `message_id`, if any.
pub fn expanded_action(state: &AppState, message_id: &str) -> AppResult<Option<usize>> {
    let menus = lock(&state.menus)?;
    Ok(menus.get(message_id).and_then(|m| m.expanded()))
}

pub fn get_messages(state: &AppState, session_id: &str) -> AppResult<Vec<Message>> {
    let sessions = lock(&state.sessions)?;
    sessions
        .iter()
        .find(|s| s.id == session_id)
        .map(|s| s.messages.clone())
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))
}

pub fn dismiss_error(state: &AppState) -> AppResult<()> {
    state.set_error(None)
}

/// Apply a menu transition, returning the prior state along with the event.
fn transition(
    state: &AppState,
    message_id: &str,
    f: impl FnOnce(&mut ActionMenu) -> MenuEvent,
) -> AppResult<(ActionMenu, MenuEvent)> {
    let mut menus = lock(&state.menus)?;
    let menu = menus.entry(message_id.to_string()).or_default();
    let before = *menu;
    let event = f(menu);
    Ok((before, event))
}

/// Run the exchange a click asked for. If the exchange is refused or fails,
/// the menu goes back to how it was before the click.
async fn submit_if_requested(
    state: &AppState,
    session_id: String,
    message_id: &str,
    before: ActionMenu,
    event: MenuEvent,
) -> AppResult<ActionClick> {
    let value = match &event {
        MenuEvent::Submit(value) => Some(value.clone()),
        _ => None,
    };
    let Some(value) = value else {
        return Ok(ActionClick { event, reply: None });
    };

    log::info!("Action submitted: {}", value);
    match exchange(state, &value, Some(session_id)).await {
        Ok(reply) => Ok(ActionClick {
            event,
            reply: Some(reply),
        }),
        Err(e) => {
            lock(&state.menus)?.insert(message_id.to_string(), before);
            Err(e)
        }
    }
}

async fn exchange(state: &AppState, content: &str, target: Option<String>) -> AppResult<Message> {
    let text = content.trim();
    if text.is_empty() {
        return Err(AppError::InvalidRequest("Message is empty".into()));
    }

    // Held until this function returns, on every path.
    let Some(_loading) = state.loading.try_begin() else {
        return Err(AppError::Busy);
    };

    let config = state.config_snapshot()?;
    if let Err(e) = config.validate() {
        log::warn!("Send refused: {e}");
        state.set_error(Some(e.to_string()))?;
        return Err(e);
    }
    state.set_error(None)?;

    let session_id = ensure_session(state, target).await?;
    let user_msg = Message::user(text);
    log::info!(
        "send_message: session_id={}, content_len={}",
        session_id,
        text.len()
    );
    append_message(state, &session_id, user_msg).await?;

    let reply = match state.client.send(&config, text, Some(&session_id)).await {
        Ok(raw) => {
            let (content, actions) =
                normalize(&raw.body, raw.content_type.as_deref(), &config).into_parts();
            Message::assistant(content, actions)
        }
        Err(e) => {
            let message = e.to_string();
            state.set_error(Some(message.clone()))?;
            Message::error(&message)
        }
    };

    append_message(state, &session_id, reply.clone()).await?;
    Ok(reply)
}

/// The target session if it still exists, otherwise a new current session.
async fn ensure_session(state: &AppState, target: Option<String>) -> AppResult<String> {
    if let Some(id) = target {
        let exists = lock(&state.sessions)?.iter().any(|s| s.id == id);
        if exists {
            return Ok(id);
        }
    }

    let session = ChatSession::new(DEFAULT_TITLE);
    let id = session.id.clone();
    update_sessions_blocking(state, move |sessions| sessions.insert(0, session)).await?;
    state.set_current_session_id(Some(id.clone()))?;
    log::info!("Created session {}", id);
    Ok(id)
}

async fn append_message(state: &AppState, session_id: &str, message: Message) -> AppResult<()> {
    let session_id = session_id.to_string();
    update_sessions_blocking(state, move |sessions| {
        match sessions.iter_mut().find(|s| s.id == session_id) {
            Some(session) => session.push(message),
            // Deleted while the request was in flight.
            None => log::warn!("Session {} is gone, dropping message {}", session_id, message.id),
        }
    })
    .await
}

/// Session writes hit the store, so they run off the async executor.
async fn update_sessions_blocking<R: Send + 'static>(
    state: &AppState,
    f: impl FnOnce(&mut Vec<ChatSession>) -> R + Send + 'static,
) -> AppResult<R> {
    let state = state.clone();
    tokio::task::spawn_blocking(move || state.update_sessions(f))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
}

fn find_message(state: &AppState, message_id: &str) -> AppResult<(String, Message)> {
    let sessions = lock(&state.sessions)?;
    sessions
        .iter()
        .find_map(|s| s.find_message(message_id).map(|m| (s.id.clone(), m.clone())))
        .ok_or_else(|| AppError::NotFound(format!("Message {message_id} not found")))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, OnceLock};

    use super::*;
    use crate::commands::settings_commands::update_config;
    use crate::db::chat_repo;
    use crate::db::kv_store::{KeyValueStore, MemoryStore};
    use crate::models::config::WebhookConfig;
    use crate::models::message::Role;
    use crate::webhook::client::fakes::FakeTransport;
    use crate::webhook::transport::TransportResponse;

    fn ok_json(body: &str) -> AppResult<TransportResponse> {
        Ok(TransportResponse {
            status: 200,
            content_type: Some("application/json".into()),
            body: body.into(),
        })
    }

    fn configured_state(fake: Arc<FakeTransport>) -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), fake);
        update_config(
            &state,
            WebhookConfig {
                webhook_url: "https://n8n.example.com/webhook/chat".into(),
                ..Default::default()
            },
        )
        .unwrap();
        (state, store)
    }

    const MENU_REPLY: &str = r#"{
        "output": "What do you need?",
        "actions": [
            { "label": "Support", "value": "support", "subPrompt": "Which device?",
              "subActions": [ { "label": "Router", "value": "router help" } ] },
            { "label": "Pricing", "value": "pricing" }
        ]
    }"#;

    #[tokio::test]
    async fn test_send_creates_session_and_appends_reply() {
        let fake = Arc::new(FakeTransport::new(vec![ok_json(r#"{"output":"hello back"}"#)]));
        let (state, store) = configured_state(fake.clone());

        let reply = send_message(&state, "  Hello there, can you tell me about your plans?  ")
            .await
            .unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "hello back");

        let sessions = state.sessions_snapshot().unwrap();
        assert_eq!(sessions.len(), 1);
        let session = &sessions[0];
        assert_eq!(session.title, "Hello there, can you tell me a...");
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].content, "Hello there, can you tell me about your plans?");
        assert_eq!(state.current_session_id().unwrap(), Some(session.id.clone()));

        let sent = fake.bodies.lock().unwrap();
        assert_eq!(sent[0]["chatInput"], "Hello there, can you tell me about your plans?");
        assert_eq!(sent[0]["sessionId"], session.id.as_str());

        assert_eq!(chat_repo::load_sessions(store.as_ref()), sessions);
    }

    /// Accepts config writes but refuses to store sessions.
    struct SessionsReadOnly(MemoryStore);

    impl KeyValueStore for SessionsReadOnly {
        fn load(&self, key: &str) -> AppResult<Option<serde_json::Value>> {
            self.0.load(key)
        }

        fn save(&self, key: &str, value: &serde_json::Value) -> AppResult<()> {
            if key == chat_repo::SESSIONS_KEY {
                return Err(AppError::Database("disk is read-only".into()));
            }
            self.0.save(key, value)
        }
    }

    #[tokio::test]
    async fn test_unsaved_new_session_is_not_created() {
        let fake = Arc::new(FakeTransport::new(vec![ok_json(r#"{"output":"unused"}"#)]));
        let state = AppState::new(Arc::new(SessionsReadOnly(MemoryStore::new())), fake.clone());
        update_config(
            &state,
            WebhookConfig {
                webhook_url: "https://n8n.example.com/webhook/chat".into(),
                ..Default::default()
            },
        )
        .unwrap();

        let err = send_message(&state, "hello").await.unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
        assert!(state.sessions_snapshot().unwrap().is_empty());
        assert_eq!(state.current_session_id().unwrap(), None);
        assert_eq!(fake.call_count(), 0);
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_missing_webhook_sets_banner_without_io() {
        let fake = Arc::new(FakeTransport::new(vec![]));
        let state = AppState::new(Arc::new(MemoryStore::new()), fake.clone());

        let err = send_message(&state, "hi").await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(fake.call_count(), 0);
        assert_eq!(
            state.error_banner().unwrap().as_deref(),
            Some("n8n Webhook URL is not configured.")
        );
        assert!(state.sessions_snapshot().unwrap().is_empty());
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let fake = Arc::new(FakeTransport::new(vec![]));
        let (state, _) = configured_state(fake.clone());

        let err = send_message(&state, "   \n ").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test]
    async fn test_http_failure_is_recorded_in_history() {
        let fake = Arc::new(FakeTransport::new(vec![Ok(TransportResponse {
            status: 500,
            content_type: Some("text/plain".into()),
            body: "boom".into(),
        })]));
        let (state, _) = configured_state(fake);

        let reply = send_message(&state, "hi").await.unwrap();
        assert!(reply.is_error());
        assert_eq!(reply.content, "❌ Error: n8n error (500): boom");
        assert_eq!(state.error_banner().unwrap().as_deref(), Some("n8n error (500): boom"));

        let session = &state.sessions_snapshot().unwrap()[0];
        assert_eq!(session.messages.len(), 2);
        assert!(session.messages[1].is_error());
    }

    #[tokio::test]
    async fn test_next_send_clears_banner() {
        let fake = Arc::new(FakeTransport::new(vec![
            Err(AppError::Network("connection refused".into())),
            ok_json(r#"{"output":"back online"}"#),
        ]));
        let (state, _) = configured_state(fake);

        let failed = send_message(&state, "one").await.unwrap();
        assert!(failed.is_error());
        assert!(state.error_banner().unwrap().is_some());

        let ok = send_message(&state, "two").await.unwrap();
        assert_eq!(ok.content, "back online");
        assert_eq!(state.error_banner().unwrap(), None);
        assert_eq!(state.sessions_snapshot().unwrap()[0].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_loading_flag_spans_the_request() {
        let seen_state: Arc<OnceLock<AppState>> = Arc::new(OnceLock::new());
        let loading_during_call = Arc::new(AtomicBool::new(false));

        let observer_state = seen_state.clone();
        let observed = loading_during_call.clone();
        let fake = Arc::new(
            FakeTransport::new(vec![Err(AppError::Network("timed out".into()))]).with_observer(
                move || {
                    let state = observer_state.get().unwrap();
                    observed.store(state.is_loading(), Ordering::SeqCst);
                },
            ),
        );
        let (state, _) = configured_state(fake);
        let _ = seen_state.set(state.clone());

        assert!(!state.is_loading());
        send_message(&state, "hi").await.unwrap();
        assert!(loading_during_call.load(Ordering::SeqCst));
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_busy_while_loading() {
        let fake = Arc::new(FakeTransport::new(vec![]));
        let (state, _) = configured_state(fake.clone());

        let _in_flight = state.loading.try_begin().unwrap();
        let err = send_message(&state, "hi").await.unwrap_err();
        assert!(matches!(err, AppError::Busy));
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test]
    async fn test_action_menu_flow() {
        let fake = Arc::new(FakeTransport::new(vec![
            ok_json(MENU_REPLY),
            ok_json(r#"{"output":"Here are our prices"}"#),
            ok_json(r#"{"output":"Router steps"}"#),
        ]));
        let (state, _) = configured_state(fake.clone());

        let menu_msg = send_message(&state, "help").await.unwrap();
        assert_eq!(menu_msg.actions().len(), 2);

        // Terminal action sends its value straight away.
        let click = click_action(&state, &menu_msg.id, 1).await.unwrap();
        assert_eq!(click.event, MenuEvent::Submit("pricing".into()));
        assert_eq!(click.reply.unwrap().content, "Here are our prices");
        assert_eq!(fake.call_count(), 2);
        assert_eq!(fake.bodies.lock().unwrap()[1]["chatInput"], "pricing");

        // Branching action only expands.
        let click = click_action(&state, &menu_msg.id, 0).await.unwrap();
        assert!(matches!(click.event, MenuEvent::Expanded { index: 0, .. }));
        assert!(click.reply.is_none());
        assert_eq!(fake.call_count(), 2);
        assert_eq!(expanded_action(&state, &menu_msg.id).unwrap(), Some(0));

        // Sub-action sends and collapses.
        let click = click_sub_action(&state, &menu_msg.id, 0, 0).await.unwrap();
        assert_eq!(click.event, MenuEvent::Submit("router help".into()));
        assert_eq!(click.reply.unwrap().content, "Router steps");
        assert_eq!(expanded_action(&state, &menu_msg.id).unwrap(), None);
        assert_eq!(fake.call_count(), 3);

        let session = &state.sessions_snapshot().unwrap()[0];
        let user_turns: Vec<_> = session
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(user_turns, vec!["help", "pricing", "router help"]);
    }

    #[tokio::test]
    async fn test_branching_action_toggles_closed() {
        let fake = Arc::new(FakeTransport::new(vec![ok_json(MENU_REPLY)]));
        let (state, _) = configured_state(fake);

        let menu_msg = send_message(&state, "help").await.unwrap();
        click_action(&state, &menu_msg.id, 0).await.unwrap();
        let click = click_action(&state, &menu_msg.id, 0).await.unwrap();
        assert_eq!(click.event, MenuEvent::Collapsed);
        assert_eq!(expanded_action(&state, &menu_msg.id).unwrap(), None);
    }

    #[tokio::test]
    async fn test_refused_sub_action_keeps_menu_expanded() {
        let fake = Arc::new(FakeTransport::new(vec![ok_json(MENU_REPLY)]));
        let (state, _) = configured_state(fake.clone());

        let menu_msg = send_message(&state, "help").await.unwrap();
        click_action(&state, &menu_msg.id, 0).await.unwrap();
        assert_eq!(expanded_action(&state, &menu_msg.id).unwrap(), Some(0));

        let in_flight = state.loading.try_begin().unwrap();
        let err = click_sub_action(&state, &menu_msg.id, 0, 0).await.unwrap_err();
        assert!(matches!(err, AppError::Busy));
        assert_eq!(expanded_action(&state, &menu_msg.id).unwrap(), Some(0));
        assert_eq!(fake.call_count(), 1);
        drop(in_flight);

        update_config(&state, WebhookConfig::default()).unwrap();
        let err = click_sub_action(&state, &menu_msg.id, 0, 0).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(expanded_action(&state, &menu_msg.id).unwrap(), Some(0));
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_exchange_still_collapses_sub_menu() {
        let fake = Arc::new(FakeTransport::new(vec![
            ok_json(MENU_REPLY),
            Err(AppError::Network("connection reset".into())),
        ]));
        let (state, _) = configured_state(fake.clone());

        let menu_msg = send_message(&state, "help").await.unwrap();
        click_action(&state, &menu_msg.id, 0).await.unwrap();

        let click = click_sub_action(&state, &menu_msg.id, 0, 0).await.unwrap();
        assert!(click.reply.unwrap().is_error());
        assert_eq!(expanded_action(&state, &menu_msg.id).unwrap(), None);
        assert_eq!(fake.call_count(), 2);
    }

    #[tokio::test]
    async fn test_click_unknown_message() {
        let fake = Arc::new(FakeTransport::new(vec![]));
        let (state, _) = configured_state(fake);
        let err = click_action(&state, "ai-missing", 0).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_messages() {
        let fake = Arc::new(FakeTransport::new(vec![ok_json(r#"{"output":"ok"}"#)]));
        let (state, _) = configured_state(fake);
        send_message(&state, "hi").await.unwrap();

        let id = state.current_session_id().unwrap().unwrap();
        assert_eq!(get_messages(&state, &id).unwrap().len(), 2);
        assert!(matches!(get_messages(&state, "nope"), Err(AppError::NotFound(_))));

        dismiss_error(&state).unwrap();
        assert_eq!(state.error_banner().unwrap(), None);
    }
}
