use std::sync::Arc;

use chime_core::{
    activity::{
        ActivityAction, ActivityEntry, ActivityRecorder, NoopUndoRecorder,
        TracingActivityRecorder, UndoEntry, UndoOp, UndoRecorder,
    },
    OwnerId, Reminder, ReminderId, ReminderStatus,
};
use chrono::{SubsecRound, Utc};
use serde_json::json;
use tracing::info;

use crate::{
    error::{Result, SchedulerError},
    recurrence::parse_timezone,
    store::ReminderStore,
    types::{DismissOutcome, NewReminder, ReminderPatch},
};

/// User-facing reminder operations: create, update, dismiss, delete.
///
/// Every call is logged to the activity recorder. Create and delete also push
/// a compensating entry onto the undo stack; scheduler transitions never do.
pub struct ReminderAuthoring {
    store: Arc<ReminderStore>,
    activity: Arc<dyn ActivityRecorder>,
    undo: Arc<dyn UndoRecorder>,
}

impl ReminderAuthoring {
    pub fn new(store: Arc<ReminderStore>) -> Self {
        Self {
            store,
            activity: Arc::new(TracingActivityRecorder),
            undo: Arc::new(NoopUndoRecorder),
        }
    }

    pub fn with_activity(mut self, activity: Arc<dyn ActivityRecorder>) -> Self {
        self.activity = activity;
        self
    }

    pub fn with_undo(mut self, undo: Arc<dyn UndoRecorder>) -> Self {
        self.undo = undo;
        self
    }

    pub fn get(&self, id: &ReminderId) -> Result<Reminder> {
        self.store.get(id)
    }

    pub fn list(&self, owner_id: &OwnerId) -> Result<Vec<Reminder>> {
        self.store.list_for_owner(owner_id)
    }

    /// Validate and persist a new Pending reminder.
    pub fn create(&self, new: NewReminder) -> Result<Reminder> {
        validate(&new)?;
        let now = Utc::now().trunc_subsecs(3);
        let reminder = Reminder {
            id: ReminderId::new(),
            owner_id: new.owner_id,
            title: new.title.trim().to_string(),
            message: new.message.filter(|m| !m.trim().is_empty()),
            trigger_at: new.trigger_at.trunc_subsecs(3),
            timezone: new.timezone,
            channels: new.channels,
            status: ReminderStatus::Pending,
            recurrence: new.recurrence,
            linked_entity: new.linked_entity,
            recipient_override: new.recipient_override,
            template_id: new.template_id,
            dispatch_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&reminder)?;
        info!(reminder_id = %reminder.id, owner_id = %reminder.owner_id, "reminder created");

        self.activity.log(ActivityEntry::reminder(
            ActivityAction::Created,
            &reminder.id,
            json!({ "title": reminder.title, "trigger_at": reminder.trigger_at }),
        ));
        self.undo.record(UndoEntry {
            description: format!("Create reminder \"{}\"", reminder.title),
            undo: UndoOp::Delete {
                id: reminder.id.clone(),
            },
            redo: UndoOp::Restore {
                reminder: Box::new(reminder.clone()),
            },
        });
        Ok(reminder)
    }

    /// Patch a Pending reminder. Trigger time and channels cannot change.
    /// Title and message are normalized the same way as on create.
    pub fn update(&self, id: &ReminderId, mut patch: ReminderPatch) -> Result<Reminder> {
        if let Some(title) = patch.title.as_mut() {
            if title.trim().is_empty() {
                return Err(SchedulerError::InvalidReminder("title must not be empty".into()));
            }
            *title = title.trim().to_string();
        }
        if let Some(message) = patch.message.as_mut() {
            *message = message.take().filter(|m| !m.trim().is_empty());
        }
        if patch.is_empty() {
            return self.store.get(id);
        }
        let reminder = self.store.update(id, &patch, Utc::now())?;
        self.activity.log(ActivityEntry::reminder(
            ActivityAction::Updated,
            id,
            json!({ "title": reminder.title }),
        ));
        Ok(reminder)
    }

    /// Dismiss a reminder. Wins over any dispatch in flight.
    pub fn dismiss(&self, id: &ReminderId) -> Result<DismissOutcome> {
        let outcome = self.store.dismiss(id, Utc::now())?;
        if outcome == DismissOutcome::Dismissed {
            info!(reminder_id = %id, "reminder dismissed");
            self.activity.log(ActivityEntry::reminder(
                ActivityAction::Dismissed,
                id,
                json!({}),
            ));
        }
        Ok(outcome)
    }

    pub fn delete(&self, id: &ReminderId) -> Result<Reminder> {
        let removed = self.store.delete(id)?;
        self.activity.log(ActivityEntry::reminder(
            ActivityAction::Deleted,
            id,
            json!({ "title": removed.title }),
        ));
        self.undo.record(UndoEntry {
            description: format!("Delete reminder \"{}\"", removed.title),
            undo: UndoOp::Restore {
                reminder: Box::new(removed.clone()),
            },
            redo: UndoOp::Delete { id: id.clone() },
        });
        Ok(removed)
    }

    /// Replay an undo or redo operation. Does not push a new undo entry.
    pub fn apply(&self, op: &UndoOp) -> Result<()> {
        match op {
            UndoOp::Delete { id } => {
                self.store.delete(id)?;
                self.activity.log(ActivityEntry::reminder(
                    ActivityAction::Deleted,
                    id,
                    json!({ "via": "undo" }),
                ));
            }
            UndoOp::Restore { reminder } => {
                let mut restored = reminder.as_ref().clone();
                // A snapshot taken mid-dispatch must not come back claimed.
                if restored.status == ReminderStatus::Claimed {
                    restored.status = ReminderStatus::Pending;
                }
                restored.updated_at = Utc::now().trunc_subsecs(3);
                self.store.insert(&restored)?;
                self.activity.log(ActivityEntry::reminder(
                    ActivityAction::Restored,
                    &restored.id,
                    json!({ "title": restored.title }),
                ));
            }
        }
        Ok(())
    }
}

fn validate(new: &NewReminder) -> Result<()> {
    if new.title.trim().is_empty() {
        return Err(SchedulerError::InvalidReminder("title must not be empty".into()));
    }
    if new.channels.is_empty() {
        return Err(SchedulerError::InvalidReminder(
            "at least one channel is required".into(),
        ));
    }
    if let Some(rule) = &new.recurrence {
        if rule.occurrences_total == 0 {
            return Err(SchedulerError::InvalidReminder(
                "occurrences_total must be at least 1".into(),
            ));
        }
        if rule.occurrences_sent > rule.occurrences_total {
            return Err(SchedulerError::InvalidReminder(
                "occurrences_sent exceeds occurrences_total".into(),
            ));
        }
    }
    parse_timezone(&new.timezone)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ts, RecordingActivity, RecordingUndo};
    use chime_core::{ChannelKind, Recurrence, RecurrenceInterval};

    fn authoring() -> (ReminderAuthoring, Arc<RecordingActivity>, Arc<RecordingUndo>) {
        let store = Arc::new(ReminderStore::open_in_memory().unwrap());
        let activity = Arc::new(RecordingActivity::default());
        let undo = Arc::new(RecordingUndo::default());
        let authoring = ReminderAuthoring::new(store)
            .with_activity(activity.clone())
            .with_undo(undo.clone());
        (authoring, activity, undo)
    }

    fn new_reminder() -> NewReminder {
        NewReminder {
            owner_id: OwnerId::from("owner-1"),
            title: "Pay invoice".into(),
            message: None,
            trigger_at: ts(9, 0),
            timezone: "Europe/Paris".into(),
            channels: [ChannelKind::Email].into_iter().collect(),
            recurrence: None,
            linked_entity: None,
            recipient_override: None,
            template_id: None,
        }
    }

    #[test]
    fn create_persists_pending_and_records_undo() {
        let (authoring, activity, undo) = authoring();
        let created = authoring.create(new_reminder()).unwrap();
        assert_eq!(created.status, ReminderStatus::Pending);
        assert_eq!(authoring.get(&created.id).unwrap(), created);
        assert_eq!(activity.actions(), vec!["created"]);

        let entries = undo.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].undo, UndoOp::Delete { id: created.id.clone() });
    }

    #[test]
    fn create_rejects_invalid_input() {
        let (authoring, _, _) = authoring();

        let mut no_channels = new_reminder();
        no_channels.channels.clear();
        assert!(matches!(
            authoring.create(no_channels),
            Err(SchedulerError::InvalidReminder(_))
        ));

        let mut zero = new_reminder();
        zero.recurrence = Some(Recurrence::new(RecurrenceInterval::Daily, 0));
        assert!(matches!(
            authoring.create(zero),
            Err(SchedulerError::InvalidReminder(_))
        ));

        let mut bad_tz = new_reminder();
        bad_tz.timezone = "Atlantis/Capital".into();
        assert!(authoring.create(bad_tz).is_err());

        let mut blank = new_reminder();
        blank.title = "   ".into();
        assert!(authoring.create(blank).is_err());
    }

    #[test]
    fn delete_then_undo_restores_reminder() {
        let (authoring, activity, undo) = authoring();
        let created = authoring.create(new_reminder()).unwrap();
        authoring.delete(&created.id).unwrap();
        assert!(authoring.get(&created.id).is_err());

        let entries = undo.entries();
        let delete_entry = entries.last().unwrap();
        authoring.apply(&delete_entry.undo).unwrap();
        assert_eq!(authoring.get(&created.id).unwrap().title, "Pay invoice");

        // Replaying does not push more undo entries.
        assert_eq!(undo.entries().len(), 2);
        assert_eq!(activity.actions(), vec!["created", "deleted", "restored"]);
    }

    #[test]
    fn dismiss_is_logged_once() {
        let (authoring, activity, _) = authoring();
        let created = authoring.create(new_reminder()).unwrap();
        assert_eq!(authoring.dismiss(&created.id).unwrap(), DismissOutcome::Dismissed);
        assert_eq!(
            authoring.dismiss(&created.id).unwrap(),
            DismissOutcome::AlreadyDismissed
        );
        assert_eq!(activity.actions(), vec!["created", "dismissed"]);
    }

    #[test]
    fn update_patches_allowed_fields() {
        let (authoring, _, _) = authoring();
        let created = authoring.create(new_reminder()).unwrap();
        let patch = ReminderPatch {
            template_id: Some(Some("invoice-due".into())),
            ..ReminderPatch::default()
        };
        let updated = authoring.update(&created.id, patch).unwrap();
        assert_eq!(updated.template_id.as_deref(), Some("invoice-due"));
        assert_eq!(updated.trigger_at, created.trigger_at);

        let blank = ReminderPatch {
            title: Some(String::new()),
            ..ReminderPatch::default()
        };
        assert!(authoring.update(&created.id, blank).is_err());
    }

    #[test]
    fn update_normalizes_title_like_create() {
        let (authoring, _, _) = authoring();
        let created = authoring.create(new_reminder()).unwrap();
        let patch = ReminderPatch {
            title: Some("  Chase payment \n".into()),
            message: Some(Some("   ".into())),
            ..ReminderPatch::default()
        };
        let updated = authoring.update(&created.id, patch).unwrap();
        assert_eq!(updated.title, "Chase payment");
        assert_eq!(updated.message, None);
        assert_eq!(authoring.get(&created.id).unwrap().title, "Chase payment");
    }
}
