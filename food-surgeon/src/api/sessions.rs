use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use super::{reject, SharedState};
use crate::chat::{ChatSession, INPUT_HINT};
use crate::models::{ChatRequest, ChatResponse, SessionId, SessionView};

fn view(session: &ChatSession) -> SessionView {
    SessionView {
        session_id: session.id,
        input_hint: INPUT_HINT,
        messages: session.messages.clone(),
        tabs: session.tabs(),
    }
}

pub async fn handle_create(state: SharedState) -> Result<impl Reply, Rejection> {
    for expired in state.sessions.sweep_idle().await {
        if let Err(e) = state.assistant.forget(expired).await {
            warn!(session = %expired, error = %e, "Failed to clear memory of idle session");
            state.metrics.record_failure(&e);
        }
    }

    let catalog = state
        .repository
        .load_all()
        .await
        .map_err(|e| reject(&state, e))?;

    let session = state.sessions.create(catalog).await;
    let session = session.lock().await;
    Ok(warp::reply::json(&view(&session)))
}

pub async fn handle_get(id: SessionId, state: SharedState) -> Result<impl Reply, Rejection> {
    let session = state.sessions.lock(id).await.map_err(|e| reject(&state, e))?;
    Ok(warp::reply::json(&view(&session)))
}

pub async fn handle_tabs(id: SessionId, state: SharedState) -> Result<impl Reply, Rejection> {
    let tabs = state
        .sessions
        .lock(id)
        .await
        .map_err(|e| reject(&state, e))?
        .tabs();
    Ok(warp::reply::json(&tabs))
}

pub async fn handle_message(
    id: SessionId,
    request: ChatRequest,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let mut session = state.sessions.lock(id).await.map_err(|e| reject(&state, e))?;
    info!(session = %id, "Processing chat message");

    match session.submit(&request.content, &state.assistant).await {
        Ok(turn) => {
            state.metrics.record_outcome(turn.outcome);
            Ok(warp::reply::json(&ChatResponse {
                session_id: id,
                messages: turn.messages,
            }))
        }
        Err(e) => {
            error!(session = %id, error = %e, "Chat turn failed");
            Err(reject(&state, e))
        }
    }
}

pub async fn handle_reset(id: SessionId, state: SharedState) -> Result<impl Reply, Rejection> {
    let mut session = state.sessions.lock(id).await.map_err(|e| reject(&state, e))?;

    let catalog = state
        .repository
        .load_all()
        .await
        .map_err(|e| reject(&state, e))?;
    state
        .assistant
        .forget(id)
        .await
        .map_err(|e| reject(&state, e))?;

    session.reset(catalog);
    info!(session = %id, "Session reset");
    Ok(warp::reply::json(&view(&session)))
}

/// Waits for any running turn of the session before dropping it and its memory.
pub async fn handle_delete(id: SessionId, state: SharedState) -> Result<impl Reply, Rejection> {
    let _turn = state.sessions.lock(id).await.map_err(|e| reject(&state, e))?;

    state.sessions.remove(id).await.map_err(|e| reject(&state, e))?;
    state
        .assistant
        .forget(id)
        .await
        .map_err(|e| reject(&state, e))?;
    Ok(StatusCode::NO_CONTENT)
}
