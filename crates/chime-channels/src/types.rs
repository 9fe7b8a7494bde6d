use chime_core::{ChannelKind, ReminderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of asking the foreground client for a local-channel permission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// Never asked in this session.
    #[default]
    Unknown,
    /// Asked; waiting for the client to report back.
    Requested,
    Granted,
    Denied,
    /// The client platform has no such capability.
    Unsupported,
}

/// Event queued for a live foreground session; drained by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Ask the client to prompt the user for a local-channel permission.
    PermissionRequest { channel: ChannelKind },

    /// Show a platform notification.
    Notification {
        reminder_id: ReminderId,
        title: String,
        body: String,
    },

    /// Speak `text` with a synthesizer voice for `locale`.
    Speech {
        reminder_id: ReminderId,
        text: String,
        locale: String,
    },
}

/// Entry of the session-local "currently surfaced" list shown by the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfacedReminder {
    pub reminder_id: ReminderId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub surfaced_at: DateTime<Utc>,
}

/// Contact details of a reminder owner, as held by the CRM profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}
