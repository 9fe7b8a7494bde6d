//! Reminder authoring endpoints.
//!
//! Thin wrappers over [`ReminderAuthoring`](chime_scheduler::ReminderAuthoring);
//! validation and activity logging happen there.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chime_core::{OwnerId, Reminder, ReminderId};
use chime_scheduler::{NewReminder, ReminderPatch};
use serde_json::{json, Value};
use std::sync::Arc;

use super::{scheduler_error, ApiError};
use crate::app::AppState;

/// POST /reminders
pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewReminder>,
) -> Result<(StatusCode, Json<Reminder>), ApiError> {
    let reminder = state.authoring.create(body).map_err(scheduler_error)?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

/// GET /reminders/{id}
pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Reminder>, ApiError> {
    state
        .authoring
        .get(&ReminderId::from(id))
        .map(Json)
        .map_err(scheduler_error)
}

/// GET /owners/{owner_id}/reminders
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let reminders = state
        .authoring
        .list(&OwnerId::from(owner_id))
        .map_err(scheduler_error)?;
    Ok(Json(json!({ "reminders": reminders })))
}

/// PATCH /reminders/{id}
pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<ReminderPatch>,
) -> Result<Json<Reminder>, ApiError> {
    state
        .authoring
        .update(&ReminderId::from(id), patch)
        .map(Json)
        .map_err(scheduler_error)
}

/// DELETE /reminders/{id}
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = state
        .authoring
        .delete(&ReminderId::from(id))
        .map_err(scheduler_error)?;
    if let Some(session) = state.sessions.get(&removed.owner_id) {
        session.unsurface(&removed.id);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /reminders/{id}/dismiss
///
/// Dismissal wins over any dispatch in flight. The reminder also leaves the
/// owner's surfaced list.
pub async fn dismiss_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = ReminderId::from(id);
    let outcome = state.authoring.dismiss(&id).map_err(scheduler_error)?;

    if let Ok(reminder) = state.authoring.get(&id) {
        if let Some(session) = state.sessions.get(&reminder.owner_id) {
            session.unsurface(&id);
        }
    }
    Ok(Json(json!({ "id": id, "outcome": outcome })))
}
