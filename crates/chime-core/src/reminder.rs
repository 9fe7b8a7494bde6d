//! Reminder model shared by the store, the scheduler drivers and the channel adapters.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{OwnerId, ReminderId};

/// Delivery medium a reminder can be sent through.
///
/// Ordering is the order in which dispatch records are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Platform notification inside a live foreground session.
    Browser,
    /// Speech synthesis inside a live foreground session.
    Voice,
    /// Email through the configured mail transport.
    Email,
    /// SMS / WhatsApp through the configured messaging transport.
    Sms,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Browser => "browser",
            ChannelKind::Voice => "voice",
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
        }
    }

    /// Local channels only reach a user through a live foreground session.
    pub fn is_local(&self) -> bool {
        matches!(self, ChannelKind::Browser | ChannelKind::Voice)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "browser" => Ok(ChannelKind::Browser),
            "voice" => Ok(ChannelKind::Voice),
            "email" => Ok(ChannelKind::Email),
            // WhatsApp rides the same transport slot as SMS
            "sms" | "whatsapp" => Ok(ChannelKind::Sms),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// Lifecycle state of a reminder.
///
/// `Pending → Claimed → { Dispatched | Pending }`, and any non-terminal state
/// may move to `Dismissed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    /// Waiting for its trigger time.
    Pending,
    /// Reserved by exactly one scheduler for a dispatch attempt.
    Claimed,
    /// Final occurrence attempted. Terminal.
    Dispatched,
    /// Dismissed by the user. Terminal; wins over any in-flight commit.
    Dismissed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Claimed => "claimed",
            ReminderStatus::Dispatched => "dispatched",
            ReminderStatus::Dismissed => "dismissed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReminderStatus::Dispatched | ReminderStatus::Dismissed)
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReminderStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReminderStatus::Pending),
            "claimed" => Ok(ReminderStatus::Claimed),
            "dispatched" => Ok(ReminderStatus::Dispatched),
            "dismissed" => Ok(ReminderStatus::Dismissed),
            other => Err(format!("unknown reminder status: {other}")),
        }
    }
}

/// Calendar step between two occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceInterval {
    Daily,
    Weekly,
    Monthly,
}

/// Repetition rule. `occurrences_sent` never exceeds `occurrences_total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub interval: RecurrenceInterval,
    pub occurrences_total: u32,
    #[serde(default)]
    pub occurrences_sent: u32,
    /// Local time of day every occurrence aims for. Set from the first
    /// occurrence, so a time skipped by a DST gap shifts only that day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_time: Option<NaiveTime>,
}

impl Recurrence {
    pub fn new(interval: RecurrenceInterval, occurrences_total: u32) -> Self {
        Self {
            interval,
            occurrences_total,
            occurrences_sent: 0,
            local_time: None,
        }
    }
}

/// Read-only reference to the CRM record a reminder is about (client, invoice, task, …).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedEntity {
    pub entity_type: String,
    pub id: String,
}

/// Per-reminder recipient that takes priority over the owner's profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Result of a single channel attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Success,
    Failure,
    /// The channel is not set up for this owner or platform. Benign.
    NotConfigured,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Success => "success",
            DispatchOutcome::Failure => "failure",
            DispatchOutcome::NotConfigured => "not_configured",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DispatchOutcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(DispatchOutcome::Success),
            "failure" => Ok(DispatchOutcome::Failure),
            "not_configured" => Ok(DispatchOutcome::NotConfigured),
            other => Err(format!("unknown dispatch outcome: {other}")),
        }
    }
}

/// One entry of a reminder's append-only dispatch history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub channel: ChannelKind,
    pub attempted_at: DateTime<Utc>,
    pub outcome: DispatchOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl DispatchRecord {
    pub fn success(channel: ChannelKind, attempted_at: DateTime<Utc>) -> Self {
        Self {
            channel,
            attempted_at,
            outcome: DispatchOutcome::Success,
            error_detail: None,
        }
    }

    pub fn failure(
        channel: ChannelKind,
        attempted_at: DateTime<Utc>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            attempted_at,
            outcome: DispatchOutcome::Failure,
            error_detail: Some(detail.into()),
        }
    }

    pub fn not_configured(
        channel: ChannelKind,
        attempted_at: DateTime<Utc>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            attempted_at,
            outcome: DispatchOutcome::NotConfigured,
            error_detail: Some(detail.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == DispatchOutcome::Failure
    }
}

/// A persisted reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ReminderId,
    pub owner_id: OwnerId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Next instant this reminder becomes due. Only ever moves forward.
    pub trigger_at: DateTime<Utc>,
    /// IANA zone whose wall clock recurrence is computed in.
    pub timezone: String,
    /// Non-empty; fixed at creation.
    pub channels: BTreeSet<ChannelKind>,
    pub status: ReminderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_entity: Option<LinkedEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_override: Option<RecipientOverride>,
    /// Email template to render instead of the default layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Oldest first. Appended by commits, never rewritten.
    #[serde(default)]
    pub dispatch_history: Vec<DispatchRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    /// Due means Pending with a trigger time at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ReminderStatus::Pending && self.trigger_at <= now
    }

    /// 1-based number of the occurrence currently being attempted.
    pub fn current_occurrence(&self) -> u32 {
        self.recurrence
            .as_ref()
            .map(|r| r.occurrences_sent + 1)
            .unwrap_or(1)
    }

    pub fn recipient_email(&self) -> Option<&str> {
        self.recipient_override
            .as_ref()
            .and_then(|r| r.email.as_deref())
            .filter(|e| !e.trim().is_empty())
    }

    pub fn recipient_phone(&self) -> Option<&str> {
        self.recipient_override
            .as_ref()
            .and_then(|r| r.phone.as_deref())
            .filter(|p| !p.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Reminder {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        Reminder {
            id: ReminderId::from("r-1"),
            owner_id: OwnerId::from("u-1"),
            title: "Pay invoice".to_string(),
            message: None,
            trigger_at: at,
            timezone: "UTC".to_string(),
            channels: [ChannelKind::Email].into_iter().collect(),
            status: ReminderStatus::Pending,
            recurrence: None,
            linked_entity: None,
            recipient_override: None,
            template_id: None,
            dispatch_history: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn due_only_when_pending_and_reached() {
        let mut r = sample();
        assert!(!r.is_due(r.trigger_at - chrono::Duration::seconds(1)));
        assert!(r.is_due(r.trigger_at));
        r.status = ReminderStatus::Claimed;
        assert!(!r.is_due(r.trigger_at));
    }

    #[test]
    fn whatsapp_parses_as_sms() {
        assert_eq!("whatsapp".parse::<ChannelKind>().unwrap(), ChannelKind::Sms);
        assert!("pager".parse::<ChannelKind>().is_err());
    }

    #[test]
    fn blank_override_does_not_count_as_recipient() {
        let mut r = sample();
        r.recipient_override = Some(RecipientOverride {
            email: Some("  ".to_string()),
            phone: Some("+15550100".to_string()),
        });
        assert_eq!(r.recipient_email(), None);
        assert_eq!(r.recipient_phone(), Some("+15550100"));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for s in ["pending", "claimed", "dispatched", "dismissed"] {
            let status: ReminderStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!(ReminderStatus::Dismissed.is_terminal());
        assert!(!ReminderStatus::Claimed.is_terminal());
    }
}
