//! Foreground session endpoints.
//!
//! A client opens a session when the user is active, reports the outcome of
//! the permission prompts it was asked to show, and polls `/events` for
//! notifications and speech to render locally. Closing the session stops the
//! owner's foreground driver; the background driver keeps covering them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chime_channels::{ForegroundSession, PermissionState};
use chime_core::{ChannelKind, OwnerId, ReminderId};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use super::{not_found, ApiError};
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct PermissionReport {
    #[serde(default)]
    pub browser: Option<PermissionState>,
    #[serde(default)]
    pub voice: Option<PermissionState>,
}

fn session(state: &AppState, owner_id: &OwnerId) -> Result<Arc<ForegroundSession>, ApiError> {
    state.sessions.get(owner_id).ok_or_else(|| not_found("session"))
}

fn describe(session: &ForegroundSession) -> Value {
    json!({
        "owner_id": session.owner_id(),
        "opened_at": session.opened_at(),
        "permissions": {
            "browser": session.permission(ChannelKind::Browser),
            "voice": session.permission(ChannelKind::Voice),
        },
    })
}

/// POST /sessions/{owner_id}. Idempotent.
pub async fn open_handler(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let owner_id = OwnerId::from(owner_id);
    let session = state.open_session(&owner_id).map_err(|e| {
        error!(owner_id = %owner_id, error = %e, "failed to start foreground driver");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;
    Ok(Json(describe(&session)))
}

/// DELETE /sessions/{owner_id}
pub async fn close_handler(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.close_session(&OwnerId::from(owner_id)) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("session"))
    }
}

/// POST /sessions/{owner_id}/permissions
pub async fn permissions_handler(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
    Json(report): Json<PermissionReport>,
) -> Result<Json<Value>, ApiError> {
    let session = session(&state, &OwnerId::from(owner_id))?;
    if let Some(browser) = report.browser {
        session.set_permission(ChannelKind::Browser, browser);
    }
    if let Some(voice) = report.voice {
        session.set_permission(ChannelKind::Voice, voice);
    }
    Ok(Json(describe(&session)))
}

/// GET /sessions/{owner_id}/events. Drains the queue.
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = session(&state, &OwnerId::from(owner_id))?;
    Ok(Json(json!({ "events": session.drain() })))
}

/// GET /sessions/{owner_id}/surfaced
pub async fn surfaced_handler(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = session(&state, &OwnerId::from(owner_id))?;
    Ok(Json(json!({ "surfaced": session.surfaced() })))
}

/// DELETE /sessions/{owner_id}/surfaced/{id}
pub async fn unsurface_handler(
    State(state): State<Arc<AppState>>,
    Path((owner_id, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let session = session(&state, &OwnerId::from(owner_id))?;
    if session.unsurface(&ReminderId::from(id)) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("surfaced reminder"))
    }
}
