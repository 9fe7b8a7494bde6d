//! Fixtures shared by the unit tests in this crate.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chime_channels::Dispatcher;
use chime_core::{
    activity::{ActivityEntry, ActivityRecorder, UndoEntry, UndoRecorder},
    ChannelKind, DispatchRecord, OwnerId, Reminder, ReminderId, ReminderStatus,
};
use chrono::{DateTime, TimeZone, Utc};

/// 2026-01-31 at `h:m` UTC.
pub fn ts(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 31, h, m, 0).unwrap()
}

/// A Pending, non-recurring Email reminder.
pub fn pending(id: &str, owner: &str, trigger_at: DateTime<Utc>) -> Reminder {
    Reminder {
        id: ReminderId::from(id),
        owner_id: OwnerId::from(owner),
        title: "Pay invoice".to_string(),
        message: None,
        trigger_at,
        timezone: "UTC".to_string(),
        channels: [ChannelKind::Email].into_iter().collect(),
        status: ReminderStatus::Pending,
        recurrence: None,
        linked_entity: None,
        recipient_override: None,
        template_id: None,
        dispatch_history: Vec::new(),
        created_at: trigger_at,
        updated_at: trigger_at,
    }
}

/// Dispatcher answering every requested channel with success, except for
/// reminders whose title is `"explode"`, which panic.
#[derive(Default)]
pub struct EchoDispatcher {
    delay: Option<Duration>,
}

impl EchoDispatcher {
    /// Takes `delay` before answering, like a slow provider.
    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }
}

#[async_trait]
impl Dispatcher for EchoDispatcher {
    async fn dispatch(&self, reminder: &Reminder) -> Vec<DispatchRecord> {
        if reminder.title == "explode" {
            panic!("adapter bug");
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        reminder
            .channels
            .iter()
            .map(|c| DispatchRecord::success(*c, Utc::now()))
            .collect()
    }
}

#[derive(Default)]
pub struct RecordingActivity {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl RecordingActivity {
    pub fn actions(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.action.to_string())
            .collect()
    }
}

impl ActivityRecorder for RecordingActivity {
    fn log(&self, entry: ActivityEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

#[derive(Default)]
pub struct RecordingUndo {
    entries: Mutex<Vec<UndoEntry>>,
}

impl RecordingUndo {
    pub fn entries(&self) -> Vec<UndoEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl UndoRecorder for RecordingUndo {
    fn record(&self, entry: UndoEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}
