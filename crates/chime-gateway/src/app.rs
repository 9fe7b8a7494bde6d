use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use chime_channels::{Dispatcher, ForegroundSession, SessionRegistry};
use chime_core::{activity::ActivityRecorder, config::ChimeConfig, OwnerId};
use chime_scheduler::{
    ClaimCoordinator, ReminderAuthoring, ReminderStore, SchedulerDriver, SqliteActivityLog,
    SqliteOwnerDirectory,
};
use dashmap::DashMap;
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::info;

use crate::channels::build_dispatch_router;

/// Stop signal for one owner's foreground driver. Dropping it stops the driver.
pub struct ForegroundHandle {
    shutdown: watch::Sender<bool>,
}

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: ChimeConfig,
    pub authoring: ReminderAuthoring,
    pub sessions: Arc<SessionRegistry>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub activity: Arc<dyn ActivityRecorder>,
    /// Backs `POST /reminders/check` and the in-process background loop.
    pub background: Arc<SchedulerDriver>,
    /// Live foreground drivers, one per open session.
    pub foreground: DashMap<OwnerId, ForegroundHandle>,
}

impl AppState {
    /// Open every subsystem on the configured database.
    ///
    /// Each subsystem gets its own connection; the drivers coordinate only
    /// through the database.
    pub fn open(config: ChimeConfig) -> anyhow::Result<Self> {
        let db_path = config.database.path.clone();
        let activity: Arc<dyn ActivityRecorder> =
            Arc::new(SqliteActivityLog::new(Connection::open(&db_path)?)?);
        let directory = Arc::new(SqliteOwnerDirectory::new(Connection::open(&db_path)?)?);
        let sessions = Arc::new(SessionRegistry::new());
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(build_dispatch_router(
            &config,
            sessions.clone(),
            directory,
        ));

        let authoring = ReminderAuthoring::new(Arc::new(ReminderStore::open(&db_path)?))
            .with_activity(activity.clone());
        let background = Arc::new(SchedulerDriver::background(
            coordinator(&config, activity.clone())?,
            dispatcher.clone(),
        ));

        Ok(Self {
            config,
            authoring,
            sessions,
            dispatcher,
            activity,
            background,
            foreground: DashMap::new(),
        })
    }

    /// Open (or return) the owner's session and make sure its foreground
    /// driver is running.
    pub fn open_session(&self, owner_id: &OwnerId) -> anyhow::Result<Arc<ForegroundSession>> {
        let session = self.sessions.open(owner_id);
        if self.foreground.contains_key(owner_id) {
            return Ok(session);
        }

        let driver = Arc::new(SchedulerDriver::foreground(
            coordinator(&self.config, self.activity.clone())?,
            self.dispatcher.clone(),
            session.clone(),
        ));
        let (shutdown, rx) = watch::channel(false);
        let every = Duration::from_secs(self.config.scheduler.foreground_interval_secs.max(1));
        tokio::spawn(driver.run(every, rx));
        self.foreground
            .insert(owner_id.clone(), ForegroundHandle { shutdown });
        info!(owner_id = %owner_id, "foreground driver started");
        Ok(session)
    }

    /// Close the owner's session and stop its driver. Returns `false` if none was open.
    pub fn close_session(&self, owner_id: &OwnerId) -> bool {
        if let Some((_, handle)) = self.foreground.remove(owner_id) {
            let _ = handle.shutdown.send(true);
        }
        self.sessions.close(owner_id).is_some()
    }
}

/// A claim coordinator on a fresh connection to the configured database.
fn coordinator(
    config: &ChimeConfig,
    activity: Arc<dyn ActivityRecorder>,
) -> anyhow::Result<Arc<ClaimCoordinator>> {
    let store = Arc::new(ReminderStore::open(&config.database.path)?);
    Ok(Arc::new(
        ClaimCoordinator::new(store, Duration::from_secs(config.scheduler.stale_claim_secs))
            .with_activity(activity),
    ))
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    use crate::http::{health, reminders, sessions, trigger};

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/reminders", post(reminders::create_handler))
        .route("/reminders/check", post(trigger::check_handler))
        .route(
            "/reminders/{id}",
            get(reminders::get_handler)
                .patch(reminders::update_handler)
                .delete(reminders::delete_handler),
        )
        .route("/reminders/{id}/dismiss", post(reminders::dismiss_handler))
        .route("/owners/{owner_id}/reminders", get(reminders::list_handler))
        .route(
            "/sessions/{owner_id}",
            post(sessions::open_handler).delete(sessions::close_handler),
        )
        .route(
            "/sessions/{owner_id}/permissions",
            post(sessions::permissions_handler),
        )
        .route("/sessions/{owner_id}/events", get(sessions::events_handler))
        .route("/sessions/{owner_id}/surfaced", get(sessions::surfaced_handler))
        .route(
            "/sessions/{owner_id}/surfaced/{id}",
            delete(sessions::unsurface_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state(dir: &tempfile::TempDir, token: Option<&str>) -> Arc<AppState> {
        let mut config = ChimeConfig::default();
        config.database.path = dir.path().join("chime.db").to_string_lossy().into_owned();
        config.gateway.trigger_token = token.map(String::from);
        Arc::new(AppState::open(config).unwrap())
    }

    async fn call(
        state: &Arc<AppState>,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => req
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let resp = build_router(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, None);
        let (status, body) = call(&state, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 0);
    }

    #[tokio::test]
    async fn check_requires_configured_token() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, Some("s3cret"));

        let (status, _) = call(&state, "POST", "/reminders/check", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&state, "POST", "/reminders/check", None, Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(&state, "POST", "/reminders/check", None, Some("s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "processed": 0, "dispatched": 0, "errors": [] }));
    }

    #[tokio::test]
    async fn due_reminder_is_dispatched_by_check() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, None);

        let new = json!({
            "owner_id": "owner-1",
            "title": "Pay invoice",
            "trigger_at": "2026-01-31T09:00:00Z",
            "channels": ["email", "sms"],
        });
        let (status, created) = call(&state, "POST", "/reminders", Some(new), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["status"], "pending");

        // No mail or SMS provider configured: both channels are NotConfigured,
        // which is neither an error nor a reason to hold the reminder back.
        let (status, report) = call(&state, "POST", "/reminders/check", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["processed"], 1);
        assert_eq!(report["dispatched"], 1);
        assert_eq!(report["errors"], json!([]));

        let (_, stored) = call(&state, "GET", &format!("/reminders/{id}"), None, None).await;
        assert_eq!(stored["status"], "dispatched");
        assert_eq!(stored["dispatch_history"].as_array().unwrap().len(), 2);

        let (status, body) =
            call(&state, "POST", &format!("/reminders/{id}/dismiss"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "already_final");
    }

    #[tokio::test]
    async fn invalid_reminder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, None);
        let new = json!({
            "owner_id": "owner-1",
            "title": "Pay invoice",
            "trigger_at": "2026-01-31T09:00:00Z",
            "channels": [],
        });
        let (status, _) = call(&state, "POST", "/reminders", Some(new), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(&state, "POST", "/reminders/missing/dismiss", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, None);

        let (status, body) = call(&state, "POST", "/sessions/owner-1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["owner_id"], "owner-1");
        assert!(state.foreground.contains_key(&OwnerId::from("owner-1")));

        let report = json!({ "browser": "granted", "voice": "denied" });
        let (status, body) =
            call(&state, "POST", "/sessions/owner-1/permissions", Some(report), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["permissions"]["browser"], "granted");
        assert_eq!(body["permissions"]["voice"], "denied");

        let (status, body) = call(&state, "GET", "/sessions/owner-1/surfaced", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["surfaced"], json!([]));

        let (status, _) = call(&state, "DELETE", "/sessions/owner-1", None, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.foreground.is_empty());
        let (status, _) = call(&state, "DELETE", "/sessions/owner-1", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&state, "GET", "/sessions/owner-1/events", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
