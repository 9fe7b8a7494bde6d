//! `chime-core`: types and collaborator contracts shared by every Chime crate.
//!
//! The reminder model lives in [`reminder`]; external collaborators the engine
//! talks to (activity log, undo stack) are declared in [`activity`].

pub mod activity;
pub mod config;
pub mod error;
pub mod reminder;
pub mod types;

pub use error::{ChimeError, Result};
pub use reminder::{
    ChannelKind, DispatchOutcome, DispatchRecord, LinkedEntity, RecipientOverride, Recurrence,
    RecurrenceInterval, Reminder, ReminderStatus,
};
pub use types::{ClaimToken, OwnerId, ReminderId};
