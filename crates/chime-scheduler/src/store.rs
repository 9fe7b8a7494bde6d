use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chime_core::{
    ChannelKind, ClaimToken, DispatchOutcome, DispatchRecord, LinkedEntity, OwnerId,
    RecipientOverride, Recurrence, Reminder, ReminderId, ReminderStatus,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    db::{configure, fmt_ts, init_db, parse_ts},
    error::{Result, SchedulerError},
    types::{ClaimScope, ClaimedReminder, CommitOutcome, DismissOutcome, NextState, ReminderPatch},
};

const COLUMNS: &str = "id, owner_id, title, message, trigger_at, timezone, channels, status,
     recurrence, linked_entity, recipient_override, template_id, created_at, updated_at";

/// SQLite-backed reminder persistence.
///
/// Every mutation of a reminder row is conditional on its current state; there
/// are no unconditional overwrites. Each driver owns its own store (and thus its
/// own connection) on the shared database file, so all coordination between
/// drivers happens inside SQLite.
pub struct ReminderStore {
    conn: Mutex<Connection>,
}

impl ReminderStore {
    /// Wrap an open connection, applying pragmas and creating the schema.
    pub fn new(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SchedulerError::LockPoisoned)
    }

    /// Insert a reminder together with any dispatch history it carries.
    ///
    /// Used for new reminders and for restoring a deleted one.
    pub fn insert(&self, reminder: &Reminder) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO reminders
             (id, owner_id, title, message, trigger_at, timezone, channels, status,
              recurrence, linked_entity, recipient_override, template_id,
              claim_token, claimed_at, claim_count, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,NULL,NULL,0,?13,?14)",
            params![
                reminder.id.as_str(),
                reminder.owner_id.as_str(),
                reminder.title,
                reminder.message,
                fmt_ts(reminder.trigger_at),
                reminder.timezone,
                to_json(&reminder.channels)?,
                reminder.status.as_str(),
                to_json_opt(&reminder.recurrence)?,
                to_json_opt(&reminder.linked_entity)?,
                to_json_opt(&reminder.recipient_override)?,
                reminder.template_id,
                fmt_ts(reminder.created_at),
                fmt_ts(reminder.updated_at),
            ],
        )?;
        // History carries no occurrence numbers of its own; restored rows count as 0.
        append_history(&tx, &reminder.id, 0, &reminder.dispatch_history)?;
        tx.commit()?;
        debug!(reminder_id = %reminder.id, "reminder inserted");
        Ok(())
    }

    pub fn find(&self, id: &ReminderId) -> Result<Option<Reminder>> {
        let conn = self.lock()?;
        load(&conn, id)
    }

    pub fn get(&self, id: &ReminderId) -> Result<Reminder> {
        self.find(id)?
            .ok_or_else(|| SchedulerError::ReminderNotFound { id: id.clone() })
    }

    /// All reminders of one owner, earliest trigger first. Undecodable rows
    /// are skipped with an error log.
    pub fn list_for_owner(&self, owner_id: &OwnerId) -> Result<Vec<Reminder>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM reminders WHERE owner_id = ?1 ORDER BY trigger_at, id"
        ))?;
        let rows = stmt
            .query_map([owner_id.as_str()], RawReminder::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut reminders = Vec::with_capacity(rows.len());
        for raw in rows {
            let id = raw.id.clone();
            match raw.decode().and_then(|r| with_history(&conn, r)) {
                Ok(r) => reminders.push(r),
                Err(e) => error!(reminder_id = %id, error = %e, "skipping undecodable reminder"),
            }
        }
        Ok(reminders)
    }

    /// Dispatch history of one reminder, oldest first.
    pub fn history(&self, id: &ReminderId) -> Result<Vec<DispatchRecord>> {
        let conn = self.lock()?;
        load_history(&conn, id)
    }

    /// Atomically claim every due reminder in `scope`.
    ///
    /// One `UPDATE … RETURNING` statement selects and transitions the rows, so
    /// two callers can never both receive the same reminder. Rows still
    /// `Claimed` since before `now - stale_after` are taken over as well; the
    /// fresh `claim_token` invalidates the abandoned claimant's commit.
    pub fn claim_due(
        &self,
        now: DateTime<Utc>,
        scope: &ClaimScope,
        stale_after: chrono::Duration,
    ) -> Result<Vec<ClaimedReminder>> {
        let conn = self.lock()?;
        let now_s = fmt_ts(now);
        let stale_cutoff = fmt_ts(now - stale_after);
        let token = ClaimToken::new();
        let owner = match scope {
            ClaimScope::All => None,
            ClaimScope::Owner(owner) => Some(owner.as_str()),
        };

        let mut stmt = conn.prepare(&format!(
            "UPDATE reminders
             SET status = 'claimed', claim_token = ?1, claimed_at = ?2,
                 claim_count = claim_count + 1, updated_at = ?2
             WHERE ((status = 'pending' AND trigger_at <= ?2)
                 OR (status = 'claimed' AND claimed_at <= ?3))
               AND (?4 IS NULL OR owner_id = ?4)
             RETURNING {COLUMNS}, claim_count"
        ))?;
        let rows = stmt
            .query_map(params![token.as_str(), now_s, stale_cutoff, owner], |row| {
                Ok((RawReminder::from_row(row)?, row.get::<_, i64>(14)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut claimed = Vec::with_capacity(rows.len());
        for (raw, claim_count) in rows {
            let id = raw.id.clone();
            match raw.decode().and_then(|r| with_history(&conn, r)) {
                Ok(reminder) => {
                    let reclaimed = claim_count > 1;
                    if reclaimed {
                        warn!(reminder_id = %reminder.id, "reclaimed stale claim");
                    }
                    claimed.push(ClaimedReminder {
                        reminder,
                        token: token.clone(),
                        claimed_at: now,
                        reclaimed,
                    });
                }
                // Left Claimed; it is retried when the claim goes stale.
                Err(e) => error!(reminder_id = %id, error = %e, "claimed undecodable reminder"),
            }
        }
        if !claimed.is_empty() {
            info!(count = claimed.len(), "claimed due reminders");
        }
        Ok(claimed)
    }

    /// Persist the result of one dispatch attempt.
    ///
    /// Runs as one immediate transaction: the row is re-read, and only a row
    /// still `Claimed` under `claimed.token` takes `next`. A row dismissed in
    /// the meantime keeps `Dismissed` but still receives the history records.
    /// A row reclaimed by someone else (or deleted) receives nothing.
    pub fn commit(
        &self,
        claimed: &ClaimedReminder,
        records: &[DispatchRecord],
        next: &NextState,
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = &claimed.reminder.id;

        let current: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT status, claim_token FROM reminders WHERE id = ?1",
                [id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((status, token)) = current else {
            debug!(reminder_id = %id, "reminder deleted during dispatch");
            return Ok(CommitOutcome::ClaimLost);
        };
        let occurrence = claimed.reminder.current_occurrence();

        if status == ReminderStatus::Dismissed.as_str() {
            append_history(&tx, id, occurrence, records)?;
            tx.commit()?;
            info!(reminder_id = %id, "reminder dismissed during dispatch");
            return Ok(CommitOutcome::DismissedDuringDispatch);
        }
        if status != ReminderStatus::Claimed.as_str()
            || token.as_deref() != Some(claimed.token.as_str())
        {
            warn!(reminder_id = %id, %status, "claim lost before commit");
            return Ok(CommitOutcome::ClaimLost);
        }

        append_history(&tx, id, occurrence, records)?;
        let changed = tx.execute(
            "UPDATE reminders
             SET status = ?1, trigger_at = ?2, recurrence = ?3,
                 claim_token = NULL, claimed_at = NULL, claim_count = 0, updated_at = ?4
             WHERE id = ?5 AND status = 'claimed' AND claim_token = ?6",
            params![
                next.status.as_str(),
                fmt_ts(next.trigger_at),
                to_json_opt(&next.recurrence)?,
                fmt_ts(now),
                id.as_str(),
                claimed.token.as_str(),
            ],
        )?;
        if changed == 0 {
            return Ok(CommitOutcome::ClaimLost);
        }
        tx.commit()?;

        Ok(match next.status {
            ReminderStatus::Pending => CommitOutcome::Rescheduled {
                next_trigger_at: next.trigger_at,
            },
            _ => CommitOutcome::Finalized,
        })
    }

    /// Move a Pending or Claimed reminder to `Dismissed`.
    pub fn dismiss(&self, id: &ReminderId, now: DateTime<Utc>) -> Result<DismissOutcome> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE reminders
             SET status = 'dismissed', claim_token = NULL, claimed_at = NULL, updated_at = ?1
             WHERE id = ?2 AND status IN ('pending', 'claimed')",
            params![fmt_ts(now), id.as_str()],
        )?;
        if changed == 1 {
            return Ok(DismissOutcome::Dismissed);
        }

        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM reminders WHERE id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match status.as_deref() {
            None => Err(SchedulerError::ReminderNotFound { id: id.clone() }),
            Some("dismissed") => Ok(DismissOutcome::AlreadyDismissed),
            Some(_) => Ok(DismissOutcome::AlreadyFinal),
        }
    }

    /// Apply `patch` to a Pending reminder and return the updated reminder.
    pub fn update(
        &self,
        id: &ReminderId,
        patch: &ReminderPatch,
        now: DateTime<Utc>,
    ) -> Result<Reminder> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut reminder =
            load(&tx, id)?.ok_or_else(|| SchedulerError::ReminderNotFound { id: id.clone() })?;
        if reminder.status != ReminderStatus::Pending {
            return Err(SchedulerError::InvalidTransition {
                id: id.clone(),
                from: reminder.status,
            });
        }

        if let Some(title) = &patch.title {
            reminder.title = title.clone();
        }
        if let Some(message) = &patch.message {
            reminder.message = message.clone();
        }
        if let Some(linked) = &patch.linked_entity {
            reminder.linked_entity = linked.clone();
        }
        if let Some(recipient) = &patch.recipient_override {
            reminder.recipient_override = recipient.clone();
        }
        if let Some(template_id) = &patch.template_id {
            reminder.template_id = template_id.clone();
        }
        reminder.updated_at = now;

        let changed = tx.execute(
            "UPDATE reminders
             SET title = ?1, message = ?2, linked_entity = ?3, recipient_override = ?4,
                 template_id = ?5, updated_at = ?6
             WHERE id = ?7 AND status = 'pending'",
            params![
                reminder.title,
                reminder.message,
                to_json_opt(&reminder.linked_entity)?,
                to_json_opt(&reminder.recipient_override)?,
                reminder.template_id,
                fmt_ts(now),
                id.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(SchedulerError::InvalidTransition {
                id: id.clone(),
                from: reminder.status,
            });
        }
        tx.commit()?;
        Ok(reminder)
    }

    /// Delete a reminder and its history, returning what was removed.
    pub fn delete(&self, id: &ReminderId) -> Result<Reminder> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let reminder =
            load(&tx, id)?.ok_or_else(|| SchedulerError::ReminderNotFound { id: id.clone() })?;
        tx.execute("DELETE FROM reminders WHERE id = ?1", [id.as_str()])?;
        tx.commit()?;
        info!(reminder_id = %id, "reminder deleted");
        Ok(reminder)
    }
}

// ---- row mapping ----------------------------------------------------------

struct RawReminder {
    id: String,
    owner_id: String,
    title: String,
    message: Option<String>,
    trigger_at: String,
    timezone: String,
    channels: String,
    status: String,
    recurrence: Option<String>,
    linked_entity: Option<String>,
    recipient_override: Option<String>,
    template_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawReminder {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            message: row.get(3)?,
            trigger_at: row.get(4)?,
            timezone: row.get(5)?,
            channels: row.get(6)?,
            status: row.get(7)?,
            recurrence: row.get(8)?,
            linked_entity: row.get(9)?,
            recipient_override: row.get(10)?,
            template_id: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn decode(self) -> Result<Reminder> {
        let status: ReminderStatus = self.status.parse().map_err(SchedulerError::Corrupt)?;
        let channels: BTreeSet<ChannelKind> = from_json(&self.channels)?;
        Ok(Reminder {
            id: ReminderId::from(self.id),
            owner_id: OwnerId::from(self.owner_id),
            title: self.title,
            message: self.message,
            trigger_at: parse_ts(&self.trigger_at)?,
            timezone: self.timezone,
            channels,
            status,
            recurrence: from_json_opt::<Recurrence>(self.recurrence.as_deref())?,
            linked_entity: from_json_opt::<LinkedEntity>(self.linked_entity.as_deref())?,
            recipient_override: from_json_opt::<RecipientOverride>(
                self.recipient_override.as_deref(),
            )?,
            template_id: self.template_id,
            dispatch_history: Vec::new(),
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

fn load(conn: &Connection, id: &ReminderId) -> Result<Option<Reminder>> {
    let raw = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM reminders WHERE id = ?1"),
            [id.as_str()],
            RawReminder::from_row,
        )
        .optional()?;
    match raw {
        Some(raw) => Ok(Some(with_history(conn, raw.decode()?)?)),
        None => Ok(None),
    }
}

fn with_history(conn: &Connection, mut reminder: Reminder) -> Result<Reminder> {
    reminder.dispatch_history = load_history(conn, &reminder.id)?;
    Ok(reminder)
}

fn load_history(conn: &Connection, id: &ReminderId) -> Result<Vec<DispatchRecord>> {
    let mut stmt = conn.prepare(
        "SELECT channel, attempted_at, outcome, error_detail
         FROM reminder_dispatches WHERE reminder_id = ?1 ORDER BY seq",
    )?;
    let rows = stmt
        .query_map([id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(channel, attempted_at, outcome, error_detail)| {
            Ok(DispatchRecord {
                channel: channel.parse().map_err(SchedulerError::Corrupt)?,
                attempted_at: parse_ts(&attempted_at)?,
                outcome: outcome
                    .parse::<DispatchOutcome>()
                    .map_err(SchedulerError::Corrupt)?,
                error_detail,
            })
        })
        .collect()
}

fn append_history(
    conn: &Connection,
    id: &ReminderId,
    occurrence: u32,
    records: &[DispatchRecord],
) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO reminder_dispatches
         (reminder_id, occurrence, channel, attempted_at, outcome, error_detail)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for record in records {
        stmt.execute(params![
            id.as_str(),
            occurrence,
            record.channel.as_str(),
            fmt_ts(record.attempted_at),
            record.outcome.as_str(),
            record.error_detail,
        ])?;
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| SchedulerError::Corrupt(e.to_string()))
}

fn to_json_opt<T: Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value.as_ref().map(to_json).transpose()
}

fn from_json<T: DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| SchedulerError::Corrupt(format!("{e}: {s}")))
}

fn from_json_opt<T: DeserializeOwned>(s: Option<&str>) -> Result<Option<T>> {
    s.map(from_json).transpose()
}
