//! Contracts for the two external collaborators that observe reminder changes:
//! the activity log (audit trail) and the undo/redo stack.
//!
//! Both are fire-and-forget from the engine's point of view. Neither trait
//! returns an error; a recorder that fails logs locally and moves on.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::reminder::Reminder;
use crate::types::ReminderId;

/// Entity type stamped on every activity entry emitted by this engine.
pub const ENTITY_TYPE: &str = "reminder";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Created,
    Updated,
    Dismissed,
    Deleted,
    Restored,
    /// Final occurrence attempted.
    Dispatched,
    /// Occurrence attempted, next one scheduled.
    Rescheduled,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Created => "created",
            ActivityAction::Updated => "updated",
            ActivityAction::Dismissed => "dismissed",
            ActivityAction::Deleted => "deleted",
            ActivityAction::Restored => "restored",
            ActivityAction::Dispatched => "dispatched",
            ActivityAction::Rescheduled => "rescheduled",
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub action: ActivityAction,
    pub entity_type: String,
    pub entity_id: String,
    pub details: Value,
}

impl ActivityEntry {
    pub fn reminder(action: ActivityAction, id: &ReminderId, details: Value) -> Self {
        Self {
            action,
            entity_type: ENTITY_TYPE.to_string(),
            entity_id: id.to_string(),
            details,
        }
    }
}

/// Audit sink. Must never block or fail reminder processing.
pub trait ActivityRecorder: Send + Sync {
    fn log(&self, entry: ActivityEntry);
}

/// Recorder that only emits a tracing event. Used when no audit table is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivityRecorder;

impl ActivityRecorder for TracingActivityRecorder {
    fn log(&self, entry: ActivityEntry) {
        info!(
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            details = %entry.details,
            "activity"
        );
    }
}

/// A compensating operation the undo stack can replay through the authoring layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum UndoOp {
    Delete { id: ReminderId },
    Restore { reminder: Box<Reminder> },
}

/// Descriptor handed to the undo/redo collaborator after a direct user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub description: String,
    pub undo: UndoOp,
    pub redo: UndoOp,
}

/// Undo/redo stack. Only receives entries for user create/delete, never for
/// scheduler-driven transitions.
pub trait UndoRecorder: Send + Sync {
    fn record(&self, entry: UndoEntry);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUndoRecorder;

impl UndoRecorder for NoopUndoRecorder {
    fn record(&self, _entry: UndoEntry) {}
}
