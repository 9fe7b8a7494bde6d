use std::sync::Arc;

use chime_core::{
    activity::{ActivityAction, ActivityEntry, ActivityRecorder, TracingActivityRecorder},
    config::DEFAULT_STALE_CLAIM_SECS,
    DispatchRecord,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;

use crate::{
    error::Result,
    recurrence::next_state,
    store::ReminderStore,
    types::{ClaimScope, ClaimedReminder, CommitOutcome},
};

/// Claim/commit protocol shared by both scheduler drivers.
///
/// Holds no state of its own beyond the store handle; two coordinators on two
/// connections to the same database coordinate purely through the store.
pub struct ClaimCoordinator {
    store: Arc<ReminderStore>,
    stale_after: chrono::Duration,
    activity: Arc<dyn ActivityRecorder>,
}

impl ClaimCoordinator {
    pub fn new(store: Arc<ReminderStore>, stale_after: std::time::Duration) -> Self {
        Self {
            store,
            stale_after: chrono::Duration::from_std(stale_after)
                .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_STALE_CLAIM_SECS as i64)),
            activity: Arc::new(TracingActivityRecorder),
        }
    }

    pub fn with_activity(mut self, activity: Arc<dyn ActivityRecorder>) -> Self {
        self.activity = activity;
        self
    }

    pub fn store(&self) -> &Arc<ReminderStore> {
        &self.store
    }

    /// Claim everything in `scope` that is due at `now`, including stale claims.
    pub fn claim_due(&self, now: DateTime<Utc>, scope: &ClaimScope) -> Result<Vec<ClaimedReminder>> {
        self.store.claim_due(now, scope, self.stale_after)
    }

    /// Compute the next state for an attempted occurrence and persist it
    /// together with its dispatch records.
    pub fn commit(
        &self,
        claimed: &ClaimedReminder,
        records: &[DispatchRecord],
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        let next = next_state(&claimed.reminder);
        let outcome = self.store.commit(claimed, records, &next, now)?;

        let reminder = &claimed.reminder;
        let channels: Vec<_> = records
            .iter()
            .map(|r| json!({ "channel": r.channel, "outcome": r.outcome }))
            .collect();
        match &outcome {
            CommitOutcome::Finalized => self.activity.log(ActivityEntry::reminder(
                ActivityAction::Dispatched,
                &reminder.id,
                json!({
                    "title": reminder.title,
                    "occurrence": reminder.current_occurrence(),
                    "channels": channels,
                }),
            )),
            CommitOutcome::Rescheduled { next_trigger_at } => {
                self.activity.log(ActivityEntry::reminder(
                    ActivityAction::Rescheduled,
                    &reminder.id,
                    json!({
                        "title": reminder.title,
                        "occurrence": reminder.current_occurrence(),
                        "channels": channels,
                        "next_trigger_at": next_trigger_at,
                    }),
                ))
            }
            CommitOutcome::DismissedDuringDispatch | CommitOutcome::ClaimLost => {
                debug!(reminder_id = %reminder.id, ?outcome, "commit not applied");
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pending, ts, RecordingActivity};
    use chime_core::{ChannelKind, Recurrence, RecurrenceInterval, ReminderStatus};
    use std::time::Duration;

    fn coordinator() -> (ClaimCoordinator, Arc<RecordingActivity>) {
        let store = Arc::new(ReminderStore::open_in_memory().unwrap());
        let activity = Arc::new(RecordingActivity::default());
        let coordinator = ClaimCoordinator::new(store, Duration::from_secs(300))
            .with_activity(activity.clone());
        (coordinator, activity)
    }

    #[test]
    fn recurring_commit_reschedules_and_logs() {
        let (coordinator, activity) = coordinator();
        let mut r = pending("r-1", "owner-1", ts(9, 0));
        r.recurrence = Some(Recurrence::new(RecurrenceInterval::Weekly, 2));
        coordinator.store().insert(&r).unwrap();

        let claimed = coordinator.claim_due(ts(9, 0), &ClaimScope::All).unwrap();
        let records = vec![DispatchRecord::success(ChannelKind::Email, ts(9, 0))];
        let outcome = coordinator.commit(&claimed[0], &records, ts(9, 0)).unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Rescheduled {
                next_trigger_at: ts(9, 0) + chrono::Duration::days(7)
            }
        );

        let stored = coordinator.store().get(&r.id).unwrap();
        assert_eq!(stored.status, ReminderStatus::Pending);
        assert_eq!(stored.recurrence.unwrap().occurrences_sent, 1);
        assert_eq!(activity.actions(), vec!["rescheduled"]);
    }

    #[test]
    fn failed_channel_still_finalizes() {
        let (coordinator, activity) = coordinator();
        coordinator
            .store()
            .insert(&pending("r-1", "owner-1", ts(9, 0)))
            .unwrap();

        let claimed = coordinator.claim_due(ts(9, 5), &ClaimScope::All).unwrap();
        let records = vec![DispatchRecord::failure(
            ChannelKind::Email,
            ts(9, 5),
            "550 mailbox unavailable",
        )];
        let outcome = coordinator.commit(&claimed[0], &records, ts(9, 5)).unwrap();
        assert_eq!(outcome, CommitOutcome::Finalized);

        let stored = coordinator.store().get(&claimed[0].reminder.id).unwrap();
        assert_eq!(stored.status, ReminderStatus::Dispatched);
        assert_eq!(stored.dispatch_history, records);
        assert_eq!(activity.actions(), vec!["dispatched"]);
    }
}
