//! Background trigger endpoint: POST /reminders/check.
//!
//! Meant for an external periodic caller (cron, platform scheduler). Runs one
//! tick of the background driver and returns `{processed, dispatched, errors}`.
//!
//! Auth: `Authorization: Bearer <gateway.trigger_token>` when a token is configured.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chime_scheduler::TickOutcome;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;

pub async fn check_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Some(expected) = state.config.gateway.trigger_token.as_deref() {
        verify_bearer_token(&headers, expected).map_err(|reason| {
            warn!(reason = %reason, "trigger authentication failed");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "authentication failed", "reason": reason})),
            )
        })?;
    }

    match state.background.tick(Utc::now()).await {
        TickOutcome::Completed(report) => {
            info!(
                processed = report.processed,
                dispatched = report.dispatched,
                "background check complete"
            );
            Ok(Json(json!(report)))
        }
        TickOutcome::Skipped => Err((StatusCode::CONFLICT, Json(json!({"skipped": true})))),
    }
}

/// Verify a static bearer token in the `Authorization: Bearer <token>` header.
fn verify_bearer_token(headers: &HeaderMap, expected: &str) -> Result<(), String> {
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing Authorization header".to_string())?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| "Authorization header must use Bearer scheme".to_string())?;

    if token == expected {
        Ok(())
    } else {
        Err("bearer token mismatch".to_string())
    }
}
