use chime_core::{ChannelKind, DispatchRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur within any channel adapter.
///
/// These never leave the adapter: [`ChannelError::into_record`] turns them
/// into a dispatch record before the router sees them.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel is not set up for this owner or deployment. Benign.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// The user has not granted (or the platform cannot grant) the permission
    /// a local channel needs.
    #[error("Permission not granted: {0}")]
    PermissionDenied(String),

    /// A message could not be delivered to the remote endpoint.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The provider answered with an error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An operation exceeded its allowed time budget.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl ChannelError {
    /// Whether this error is an expected "channel unavailable" condition
    /// rather than an operational failure.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ChannelError::NotConfigured(_) | ChannelError::PermissionDenied(_)
        )
    }

    pub fn into_record(self, channel: ChannelKind, at: DateTime<Utc>) -> DispatchRecord {
        if self.is_benign() {
            DispatchRecord::not_configured(channel, at, self.to_string())
        } else {
            DispatchRecord::failure(channel, at, self.to_string())
        }
    }
}

/// Convert an adapter's internal result into its dispatch record.
pub fn to_record(
    channel: ChannelKind,
    at: DateTime<Utc>,
    result: Result<(), ChannelError>,
) -> DispatchRecord {
    match result {
        Ok(()) => DispatchRecord::success(channel, at),
        Err(e) => e.into_record(channel, at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_core::DispatchOutcome;

    #[test]
    fn benign_errors_become_not_configured() {
        let at = Utc::now();
        let rec = ChannelError::PermissionDenied("browser".into()).into_record(ChannelKind::Browser, at);
        assert_eq!(rec.outcome, DispatchOutcome::NotConfigured);

        let rec = ChannelError::Timeout { ms: 50 }.into_record(ChannelKind::Email, at);
        assert_eq!(rec.outcome, DispatchOutcome::Failure);
        assert_eq!(rec.error_detail.as_deref(), Some("Operation timed out after 50ms"));
    }
}
