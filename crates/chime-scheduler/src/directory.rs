use std::sync::Mutex;

use async_trait::async_trait;
use chime_channels::{ChannelError, OwnerDirectory, OwnerProfile};
use chime_core::{
    activity::{ActivityEntry, ActivityRecorder},
    OwnerId,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::error;

use crate::{
    db::{configure, fmt_ts, init_db},
    error::{Result, SchedulerError},
};

/// Owner contact details from the `owner_profiles` table.
pub struct SqliteOwnerDirectory {
    conn: Mutex<Connection>,
}

impl SqliteOwnerDirectory {
    pub fn new(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn upsert(&self, owner_id: &OwnerId, profile: &OwnerProfile) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| SchedulerError::LockPoisoned)?;
        conn.execute(
            "INSERT INTO owner_profiles (owner_id, display_name, email, phone)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(owner_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 email = excluded.email,
                 phone = excluded.phone",
            params![
                owner_id.as_str(),
                profile.display_name,
                profile.email,
                profile.phone
            ],
        )?;
        Ok(())
    }

    fn lookup(&self, owner_id: &OwnerId) -> Result<Option<OwnerProfile>> {
        let conn = self.conn.lock().map_err(|_| SchedulerError::LockPoisoned)?;
        let profile = conn
            .query_row(
                "SELECT display_name, email, phone FROM owner_profiles WHERE owner_id = ?1",
                [owner_id.as_str()],
                |row| {
                    Ok(OwnerProfile {
                        display_name: row.get(0)?,
                        email: row.get(1)?,
                        phone: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }
}

#[async_trait]
impl OwnerDirectory for SqliteOwnerDirectory {
    async fn profile(&self, owner_id: &OwnerId) -> std::result::Result<Option<OwnerProfile>, ChannelError> {
        self.lookup(owner_id)
            .map_err(|e| ChannelError::Transport(format!("owner directory: {e}")))
    }
}

/// Activity recorder writing to the `activity_log` table.
///
/// Write failures are logged and swallowed; auditing never blocks reminder
/// processing.
pub struct SqliteActivityLog {
    conn: Mutex<Connection>,
}

impl SqliteActivityLog {
    pub fn new(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn write(&self, entry: &ActivityEntry) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| SchedulerError::LockPoisoned)?;
        conn.execute(
            "INSERT INTO activity_log (action, entity_type, entity_id, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.action.as_str(),
                entry.entity_type,
                entry.entity_id,
                entry.details.to_string(),
                fmt_ts(Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Most recent entries for one entity, newest first.
    pub fn recent(&self, entity_id: &str, limit: usize) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock().map_err(|_| SchedulerError::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT action, details FROM activity_log
             WHERE entity_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![entity_id, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl ActivityRecorder for SqliteActivityLog {
    fn log(&self, entry: ActivityEntry) {
        if let Err(e) = self.write(&entry) {
            error!(
                action = %entry.action,
                entity_id = %entry.entity_id,
                error = %e,
                "failed to write activity log"
            );
        }
    }
}
