use std::collections::BTreeSet;

use chime_core::{
    ChannelKind, ClaimToken, LinkedEntity, OwnerId, RecipientOverride, Recurrence, Reminder,
    ReminderStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which reminders a claim may pick up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimScope {
    /// Every owner. Used by the background driver.
    All,
    /// One owner. A foreground session only claims its own reminders.
    Owner(OwnerId),
}

/// A reminder reserved for exactly one dispatch attempt.
///
/// Only the holder of `token` can commit it.
#[derive(Debug, Clone)]
pub struct ClaimedReminder {
    pub reminder: Reminder,
    pub token: ClaimToken,
    pub claimed_at: DateTime<Utc>,
    /// The row was still `Claimed` by an earlier, abandoned attempt.
    pub reclaimed: bool,
}

/// State a reminder moves to after an attempted occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextState {
    pub status: ReminderStatus,
    pub trigger_at: DateTime<Utc>,
    pub recurrence: Option<Recurrence>,
}

/// What a commit actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Final occurrence attempted; reminder is now `Dispatched`.
    Finalized,
    /// Next occurrence scheduled; reminder is `Pending` again.
    Rescheduled { next_trigger_at: DateTime<Utc> },
    /// The user dismissed the reminder mid-dispatch. History was kept, the
    /// computed state was discarded.
    DismissedDuringDispatch,
    /// The claim went stale and someone else reclaimed the row. Nothing was
    /// written.
    ClaimLost,
}

impl CommitOutcome {
    pub fn persisted(&self) -> bool {
        matches!(
            self,
            CommitOutcome::Finalized | CommitOutcome::Rescheduled { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissOutcome {
    Dismissed,
    AlreadyDismissed,
    /// Already `Dispatched`; terminal states do not change.
    AlreadyFinal,
}

/// Input to [`ReminderAuthoring::create`](crate::authoring::ReminderAuthoring::create).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReminder {
    pub owner_id: OwnerId,
    pub title: String,
    #[serde(default)]
    pub message: Option<String>,
    pub trigger_at: DateTime<Utc>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub channels: BTreeSet<ChannelKind>,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub linked_entity: Option<LinkedEntity>,
    #[serde(default)]
    pub recipient_override: Option<RecipientOverride>,
    #[serde(default)]
    pub template_id: Option<String>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Partial update. `trigger_at` and `channels` are fixed at creation and not patchable.
///
/// `Some(None)` clears an optional field; `None` leaves it unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReminderPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<Option<String>>,
    #[serde(default)]
    pub linked_entity: Option<Option<LinkedEntity>>,
    #[serde(default)]
    pub recipient_override: Option<Option<RecipientOverride>>,
    #[serde(default)]
    pub template_id: Option<Option<String>>,
}

impl ReminderPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.message.is_none()
            && self.linked_entity.is_none()
            && self.recipient_override.is_none()
            && self.template_id.is_none()
    }
}
