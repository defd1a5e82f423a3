use crate::error::{AppError, AppResult};
use crate::models::session::{ChatSession, DEFAULT_TITLE};
use crate::state::{lock, AppState};

/// Start an empty session and make it current.
pub fn new_chat(state: &AppState) -> AppResult<ChatSession> {
    let session = ChatSession::new(DEFAULT_TITLE);
    let created = session.clone();
    state.update_sessions(|sessions| sessions.insert(0, session))?;
    state.set_current_session_id(Some(created.id.clone()))?;
    state.set_error(None)?;
    log::info!("Started new chat {}", created.id);
    Ok(created)
}

pub fn list_sessions(state: &AppState) -> AppResult<Vec<ChatSession>> {
    state.sessions_snapshot()
}

pub fn get_session(state: &AppState, id: &str) -> AppResult<ChatSession> {
    lock(&state.sessions)?
        .iter()
        .find(|s| s.id == id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
}

pub fn current_session(state: &AppState) -> AppResult<Option<ChatSession>> {
    match state.current_session_id()? {
        Some(id) => Ok(lock(&state.sessions)?.iter().find(|s| s.id == id).cloned()),
        None => Ok(None),
    }
}

pub fn select_session(state: &AppState, id: &str) -> AppResult<ChatSession> {
    let session = get_session(state, id)?;
    state.set_current_session_id(Some(session.id.clone()))?;
    Ok(session)
}

/// Remove a session. Deleting the current session leaves none selected.
pub fn delete_session(state: &AppState, id: &str) -> AppResult<()> {
    let removed = state.update_sessions(|sessions| {
        let idx = sessions.iter().position(|s| s.id == id)?;
        Some(sessions.remove(idx))
    })?;

    let Some(removed) = removed else {
        return Err(AppError::NotFound(format!("Session {id} not found")));
    };

    {
        let mut menus = lock(&state.menus)?;
        for message in &removed.messages {
            menus.remove(&message.id);
        }
    }

    if state.current_session_id()?.as_deref() == Some(id) {
        state.set_current_session_id(None)?;
    }
    log::info!("Deleted session {}", id);
    Ok(())
}
