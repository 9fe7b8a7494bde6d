//! `chime-scheduler`: reminder persistence, recurrence and the scheduler drivers.
//!
//! # Overview
//!
//! Reminders live in a SQLite `reminders` table with an append-only
//! `reminder_dispatches` history. A [`driver::SchedulerDriver`] ticks on an
//! interval: it claims due reminders through the [`coordinator::ClaimCoordinator`],
//! fans each one out through a [`chime_channels::Dispatcher`], and commits the
//! next state computed by [`recurrence::next_state`].
//!
//! # Lifecycle
//!
//! | From      | To           | Via                                         |
//! |-----------|--------------|---------------------------------------------|
//! | `Pending` | `Claimed`    | [`store::ReminderStore::claim_due`]         |
//! | `Claimed` | `Pending`    | commit, recurrence continues                |
//! | `Claimed` | `Dispatched` | commit, last occurrence                     |
//! | `Claimed` | `Claimed`    | reclaim after the stale window              |
//! | any live  | `Dismissed`  | [`authoring::ReminderAuthoring::dismiss`]   |

pub mod authoring;
pub mod coordinator;
pub mod db;
pub mod directory;
pub mod driver;
pub mod error;
pub mod recurrence;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use authoring::ReminderAuthoring;
pub use coordinator::ClaimCoordinator;
pub use directory::{SqliteActivityLog, SqliteOwnerDirectory};
pub use driver::{DriverKind, SchedulerDriver, TickOutcome, TickReport};
pub use error::{Result, SchedulerError};
pub use store::ReminderStore;
pub use types::{
    ClaimScope, ClaimedReminder, CommitOutcome, DismissOutcome, NewReminder, NextState,
    ReminderPatch,
};
