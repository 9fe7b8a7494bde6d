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

/// Spoken reminder, synthesized by the owner's live foreground client.
///
/// Best-effort: the client gives no confirmation that anything was heard.
pub struct VoiceNotifier {
    sessions: Arc<SessionRegistry>,
    locale: String,
}

impl VoiceNotifier {
    pub fn new(sessions: Arc<SessionRegistry>, locale: impl Into<String>) -> Self {
        Self {
            sessions,
            locale: locale.into(),
        }
    }

    fn speak(&self, reminder: &Reminder) -> Result<(), ChannelError> {
        let session = self
            .sessions
            .require_permitted(&reminder.owner_id, ChannelKind::Voice)?;
        session.push(SessionEvent::Speech {
            reminder_id: reminder.id.clone(),
            text: utterance(reminder),
            locale: self.locale.clone(),
        });
        debug!(reminder_id = %reminder.id, locale = %self.locale, "speech queued");
        Ok(())
    }
}

/// Text handed to the synthesizer: title, then the message when present.
pub fn utterance(reminder: &Reminder) -> String {
    match reminder.message.as_deref().map(str::trim) {
        Some(msg) if !msg.is_empty() => format!("Reminder: {}. {}", reminder.title.trim(), msg),
        _ => format!("Reminder: {}.", reminder.title.trim()),
    }
}

#[async_trait]
impl ChannelAdapter for VoiceNotifier {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Voice
    }

    async fn send(&self, reminder: &Reminder) -> DispatchRecord {
        to_record(ChannelKind::Voice, Utc::now(), self.speak(reminder))
    }
}
