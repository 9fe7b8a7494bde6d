pub mod health;
pub mod reminders;
pub mod sessions;
pub mod trigger;

use axum::{http::StatusCode, Json};
use chime_scheduler::SchedulerError;
use serde_json::{json, Value};
use tracing::error;

pub type ApiError = (StatusCode, Json<Value>);

pub fn not_found(what: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "error": format!("{what} not found") })))
}

/// Map a scheduler error onto an HTTP status. Store failures are logged here.
pub fn scheduler_error(e: SchedulerError) -> ApiError {
    let status = match &e {
        SchedulerError::ReminderNotFound { .. } => StatusCode::NOT_FOUND,
        SchedulerError::InvalidReminder(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SchedulerError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SchedulerError::Database(_) | SchedulerError::Corrupt(_) | SchedulerError::LockPoisoned => {
            error!(error = %e, "reminder store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": e.to_string() })))
}
