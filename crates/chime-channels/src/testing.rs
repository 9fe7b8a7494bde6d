//! Shared fixtures for this crate's unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chime_core::{
    ChannelKind, DispatchRecord, OwnerId, Reminder, ReminderId, ReminderStatus,
};
use chrono::{TimeZone, Utc};
use tokio::time::Duration;

use crate::channel::ChannelAdapter;
use crate::error::ChannelError;
use crate::mail::{MailTransport, OutgoingMail};
use crate::whatsapp::SmsTransport;

pub fn reminder(channels: &[ChannelKind]) -> Reminder {
    let at = Utc.with_ymd_and_hms(2026, 1, 31, 9, 0, 0).unwrap();
    Reminder {
        id: ReminderId::from("rem-1"),
        owner_id: OwnerId::from("owner-1"),
        title: "Pay invoice".to_string(),
        message: None,
        trigger_at: at,
        timezone: "UTC".to_string(),
        channels: channels.iter().copied().collect(),
        status: ReminderStatus::Claimed,
        recurrence: None,
        linked_entity: None,
        recipient_override: None,
        template_id: None,
        dispatch_history: Vec::new(),
        created_at: at,
        updated_at: at,
    }
}

pub struct ScriptedAdapter {
    kind: ChannelKind,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn ok(kind: ChannelKind) -> Self {
        Self {
            kind,
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(kind: ChannelKind, detail: &str) -> Self {
        Self {
            failure: Some(detail.to_string()),
            ..Self::ok(kind)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelAdapter for ScriptedAdapter {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, _reminder: &Reminder) -> DispatchRecord {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(detail) => DispatchRecord::failure(self.kind, Utc::now(), detail.clone()),
            None => DispatchRecord::success(self.kind, Utc::now()),
        }
    }
}

#[derive(Default)]
pub struct RecordingMail {
    sent: Mutex<Vec<OutgoingMail>>,
    failure: Option<String>,
}

impl RecordingMail {
    pub fn failing(detail: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failure: Some(detail.to_string()),
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingMail {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), ChannelError> {
        if let Some(detail) = &self.failure {
            return Err(ChannelError::Transport(detail.clone()));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSms {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSms {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsTransport for RecordingSms {
    async fn send(&self, to: &str, payload: &str) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), payload.to_string()));
        Ok(())
    }
}
