use chime_core::{ReminderId, ReminderStatus};
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No reminder with the given ID exists in the store.
    #[error("Reminder not found: {id}")]
    ReminderNotFound { id: ReminderId },

    /// Rejected by authoring-time validation.
    #[error("Invalid reminder: {0}")]
    InvalidReminder(String),

    /// The requested change is not allowed from the reminder's current state.
    #[error("Reminder {id} cannot change while {from}")]
    InvalidTransition { id: ReminderId, from: ReminderStatus },

    /// A stored row could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A thread panicked while holding the store connection.
    #[error("Store lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
