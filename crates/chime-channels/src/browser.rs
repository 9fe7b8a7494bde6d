use std::sync::Arc;

use async_trait::async_trait;
use chime_core::{ChannelKind, DispatchRecord, Reminder};
use chrono::Utc;
use tracing::debug;

use crate::{
    channel::ChannelAdapter,
    error::{to_record, ChannelError},
    session::SessionRegistry,
    types::SessionEvent,
};

/// Platform notification shown by the owner's live foreground client.
pub struct BrowserNotifier {
    sessions: Arc<SessionRegistry>,
}

impl BrowserNotifier {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }

    fn notify(&self, reminder: &Reminder) -> Result<(), ChannelError> {
        let session = self
            .sessions
            .require_permitted(&reminder.owner_id, ChannelKind::Browser)?;
        session.push(SessionEvent::Notification {
            reminder_id: reminder.id.clone(),
            title: reminder.title.clone(),
            body: reminder.message.clone().unwrap_or_default(),
        });
        debug!(reminder_id = %reminder.id, owner_id = %reminder.owner_id, "browser notification queued");
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for BrowserNotifier {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Browser
    }

    async fn send(&self, reminder: &Reminder) -> DispatchRecord {
        to_record(ChannelKind::Browser, Utc::now(), self.notify(reminder))
    }
}
