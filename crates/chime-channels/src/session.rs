//! Live foreground sessions.
//!
//! A session exists while a user has the CRM open. Browser and Voice delivery
//! only work through one, and it carries the per-session permission state and
//! the "currently surfaced" list. Nothing here is persisted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chime_core::{ChannelKind, OwnerId, ReminderId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::types::{PermissionState, SessionEvent, SurfacedReminder};

/// Maximum queued events per session before the oldest are dropped.
const MAX_OUTBOX: usize = 256;
/// Maximum entries kept in the surfaced list.
const MAX_SURFACED: usize = 50;

#[derive(Debug, Default)]
struct SessionState {
    browser: PermissionState,
    voice: PermissionState,
    bootstrapped: bool,
    outbox: VecDeque<SessionEvent>,
    surfaced: Vec<SurfacedReminder>,
}

/// One owner's live foreground context.
#[derive(Debug)]
pub struct ForegroundSession {
    owner_id: OwnerId,
    opened_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

impl ForegroundSession {
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            opened_at: Utc::now(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    // Session state is plain data; a panic mid-update cannot leave it
    // inconsistent, so a poisoned lock is simply recovered.
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the client once for Browser and Voice permissions.
    ///
    /// Idempotent: only the first call in a session queues requests; later
    /// calls return `false` and change nothing.
    pub fn bootstrap_permissions(&self) -> bool {
        let mut state = self.state();
        if state.bootstrapped {
            return false;
        }
        state.bootstrapped = true;

        let mut requested = Vec::new();
        if state.browser == PermissionState::Unknown {
            state.browser = PermissionState::Requested;
            requested.push(ChannelKind::Browser);
        }
        if state.voice == PermissionState::Unknown {
            state.voice = PermissionState::Requested;
            requested.push(ChannelKind::Voice);
        }
        for channel in requested {
            push_bounded(&mut state.outbox, SessionEvent::PermissionRequest { channel });
        }
        info!(owner_id = %self.owner_id, "foreground permissions bootstrapped");
        true
    }

    /// Record the client's answer for a local channel. Remote channels are ignored.
    pub fn set_permission(&self, channel: ChannelKind, permission: PermissionState) {
        let mut state = self.state();
        match channel {
            ChannelKind::Browser => state.browser = permission,
            ChannelKind::Voice => state.voice = permission,
            other => {
                warn!(owner_id = %self.owner_id, channel = %other, "permission reported for non-local channel");
                return;
            }
        }
        debug!(owner_id = %self.owner_id, %channel, ?permission, "permission updated");
    }

    pub fn permission(&self, channel: ChannelKind) -> PermissionState {
        let state = self.state();
        match channel {
            ChannelKind::Browser => state.browser,
            ChannelKind::Voice => state.voice,
            _ => PermissionState::Unsupported,
        }
    }

    /// Queue an event for the client.
    pub fn push(&self, event: SessionEvent) {
        push_bounded(&mut self.state().outbox, event);
    }

    /// Remove and return all queued events, oldest first.
    pub fn drain(&self) -> Vec<SessionEvent> {
        self.state().outbox.drain(..).collect()
    }

    /// Add a reminder to the surfaced list, replacing an earlier entry for the same id.
    pub fn surface(&self, entry: SurfacedReminder) {
        let mut state = self.state();
        state.surfaced.retain(|s| s.reminder_id != entry.reminder_id);
        state.surfaced.push(entry);
        if state.surfaced.len() > MAX_SURFACED {
            let excess = state.surfaced.len() - MAX_SURFACED;
            state.surfaced.drain(..excess);
        }
    }

    pub fn surfaced(&self) -> Vec<SurfacedReminder> {
        self.state().surfaced.clone()
    }

    /// Drop one entry from the surfaced list. Returns whether it was present.
    pub fn unsurface(&self, reminder_id: &ReminderId) -> bool {
        let mut state = self.state();
        let before = state.surfaced.len();
        state.surfaced.retain(|s| &s.reminder_id != reminder_id);
        state.surfaced.len() < before
    }
}

fn push_bounded(outbox: &mut VecDeque<SessionEvent>, event: SessionEvent) {
    if outbox.len() >= MAX_OUTBOX {
        outbox.pop_front();
    }
    outbox.push_back(event);
}

/// All live foreground sessions, keyed by owner.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<OwnerId, Arc<ForegroundSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `owner_id`, or return the one already open.
    pub fn open(&self, owner_id: &OwnerId) -> Arc<ForegroundSession> {
        self.sessions
            .entry(owner_id.clone())
            .or_insert_with(|| {
                info!(%owner_id, "foreground session opened");
                Arc::new(ForegroundSession::new(owner_id.clone()))
            })
            .clone()
    }

    pub fn close(&self, owner_id: &OwnerId) -> Option<Arc<ForegroundSession>> {
        let removed = self.sessions.remove(owner_id).map(|(_, s)| s);
        if removed.is_some() {
            info!(%owner_id, "foreground session closed");
        }
        removed
    }

    pub fn get(&self, owner_id: &OwnerId) -> Option<Arc<ForegroundSession>> {
        self.sessions.get(owner_id).map(|s| Arc::clone(s.value()))
    }

    /// The owner's session, provided it is live and `channel` is permitted in it.
    pub fn require_permitted(
        &self,
        owner_id: &OwnerId,
        channel: ChannelKind,
    ) -> Result<Arc<ForegroundSession>, ChannelError> {
        let session = self.get(owner_id).ok_or_else(|| {
            ChannelError::NotConfigured(format!("no live foreground session for {owner_id}"))
        })?;
        match session.permission(channel) {
            PermissionState::Granted => Ok(session),
            PermissionState::Unsupported => Err(ChannelError::NotConfigured(format!(
                "{channel} is not supported by the client platform"
            ))),
            other => Err(ChannelError::PermissionDenied(format!(
                "{channel} permission is {other:?}"
            ))),
        }
    }

    pub fn is_live(&self, owner_id: &OwnerId) -> bool {
        self.sessions.contains_key(owner_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_requests_each_permission_once() {
        let session = ForegroundSession::new(OwnerId::from("u-1"));
        assert!(session.bootstrap_permissions());
        assert!(!session.bootstrap_permissions());

        let events = session.drain();
        assert_eq!(
            events,
            vec![
                SessionEvent::PermissionRequest { channel: ChannelKind::Browser },
                SessionEvent::PermissionRequest { channel: ChannelKind::Voice },
            ]
        );
        assert_eq!(session.permission(ChannelKind::Browser), PermissionState::Requested);
    }

    #[test]
    fn bootstrap_skips_already_answered_permissions() {
        let session = ForegroundSession::new(OwnerId::from("u-1"));
        session.set_permission(ChannelKind::Voice, PermissionState::Unsupported);
        session.bootstrap_permissions();
        assert_eq!(
            session.drain(),
            vec![SessionEvent::PermissionRequest { channel: ChannelKind::Browser }]
        );
        assert_eq!(session.permission(ChannelKind::Voice), PermissionState::Unsupported);
    }

    #[test]
    fn surfaced_list_replaces_duplicates() {
        let session = ForegroundSession::new(OwnerId::from("u-1"));
        let entry = |title: &str| SurfacedReminder {
            reminder_id: ReminderId::from("r-1"),
            title: title.to_string(),
            message: None,
            surfaced_at: Utc::now(),
        };
        session.surface(entry("first"));
        session.surface(entry("second"));
        let surfaced = session.surfaced();
        assert_eq!(surfaced.len(), 1);
        assert_eq!(surfaced[0].title, "second");

        assert!(session.unsurface(&ReminderId::from("r-1")));
        assert!(!session.unsurface(&ReminderId::from("r-1")));
    }

    #[test]
    fn outbox_is_bounded() {
        let session = ForegroundSession::new(OwnerId::from("u-1"));
        for i in 0..(MAX_OUTBOX + 10) {
            session.push(SessionEvent::Notification {
                reminder_id: ReminderId::from(format!("r-{i}")),
                title: "t".into(),
                body: String::new(),
            });
        }
        let events = session.drain();
        assert_eq!(events.len(), MAX_OUTBOX);
        match &events[0] {
            SessionEvent::Notification { reminder_id, .. } => assert_eq!(reminder_id.as_str(), "r-10"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn require_permitted_checks_liveness_then_permission() {
        let registry = SessionRegistry::new();
        let owner = OwnerId::from("u-1");
        assert!(matches!(
            registry.require_permitted(&owner, ChannelKind::Browser),
            Err(ChannelError::NotConfigured(_))
        ));

        let session = registry.open(&owner);
        assert!(matches!(
            registry.require_permitted(&owner, ChannelKind::Browser),
            Err(ChannelError::PermissionDenied(_))
        ));

        session.set_permission(ChannelKind::Browser, PermissionState::Granted);
        assert!(registry.require_permitted(&owner, ChannelKind::Browser).is_ok());
    }

    #[test]
    fn registry_open_is_idempotent() {
        let registry = SessionRegistry::new();
        let owner = OwnerId::from("u-1");
        let a = registry.open(&owner);
        let b = registry.open(&owner);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.is_live(&owner));
        assert!(registry.close(&owner).is_some());
        assert!(!registry.is_live(&owner));
        assert!(registry.close(&owner).is_none());
    }
}
