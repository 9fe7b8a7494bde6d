use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::{Result, SchedulerError};

/// Initialise the reminder schema in `conn`.
///
/// Creates the `reminders` table and its append-only `reminder_dispatches`
/// history (idempotent), plus the owner profile and activity tables the
/// gateway wires in.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reminders (
            id                  TEXT    NOT NULL PRIMARY KEY,
            owner_id            TEXT    NOT NULL,
            title               TEXT    NOT NULL,
            message             TEXT,
            trigger_at          TEXT    NOT NULL,   -- fixed-width RFC 3339 UTC
            timezone            TEXT    NOT NULL DEFAULT 'UTC',
            channels            TEXT    NOT NULL,   -- JSON array of channel kinds
            status              TEXT    NOT NULL DEFAULT 'pending',
            recurrence          TEXT,               -- JSON or NULL
            linked_entity       TEXT,               -- JSON or NULL
            recipient_override  TEXT,               -- JSON or NULL
            template_id         TEXT,
            claim_token         TEXT,               -- set only while claimed
            claimed_at          TEXT,
            claim_count         INTEGER NOT NULL DEFAULT 0,  -- claims since last commit
            created_at          TEXT    NOT NULL,
            updated_at          TEXT    NOT NULL
        ) STRICT;

        -- Claim query: WHERE status = 'pending' AND trigger_at <= ?
        CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders (status, trigger_at);
        CREATE INDEX IF NOT EXISTS idx_reminders_owner ON reminders (owner_id);

        CREATE TABLE IF NOT EXISTS reminder_dispatches (
            seq           INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            reminder_id   TEXT    NOT NULL REFERENCES reminders(id) ON DELETE CASCADE,
            occurrence    INTEGER NOT NULL,
            channel       TEXT    NOT NULL,
            attempted_at  TEXT    NOT NULL,
            outcome       TEXT    NOT NULL,
            error_detail  TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_dispatches_reminder
            ON reminder_dispatches (reminder_id, seq);

        CREATE TABLE IF NOT EXISTS owner_profiles (
            owner_id      TEXT NOT NULL PRIMARY KEY,
            display_name  TEXT,
            email         TEXT,
            phone         TEXT
        ) STRICT;

        CREATE TABLE IF NOT EXISTS activity_log (
            id           INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            action       TEXT    NOT NULL,
            entity_type  TEXT    NOT NULL,
            entity_id    TEXT    NOT NULL,
            details      TEXT    NOT NULL,
            created_at   TEXT    NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}

/// Per-connection settings every store connection needs.
///
/// WAL lets the drivers' connections read while another writes; the busy
/// timeout makes a writer wait for the lock instead of failing with
/// `SQLITE_BUSY`.
pub fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

/// Format a timestamp so that lexical order equals chronological order.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SchedulerError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}
