use async_trait::async_trait;
use chime_core::{ChannelKind, DispatchRecord, Reminder};

/// Common interface implemented by every channel adapter (Browser, Voice, Email, SMS).
///
/// Implementations must be `Send + Sync` so they can be stored in a
/// [`DispatchRouter`](crate::router::DispatchRouter) and driven from multiple
/// Tokio tasks.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// The registry key for this adapter. Unique per router.
    fn kind(&self) -> ChannelKind;

    /// Attempt delivery of one occurrence of `reminder`.
    ///
    /// Never fails: every channel-local error is folded into the returned
    /// record as `Failure` or `NotConfigured`.
    async fn send(&self, reminder: &Reminder) -> DispatchRecord;
}

/// Fans a claimed reminder out to its channels.
///
/// The scheduler drivers only depend on this seam, so tests can substitute a
/// scripted dispatcher for the real router.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Returns exactly one record per channel in `reminder.channels`.
    async fn dispatch(&self, reminder: &Reminder) -> Vec<DispatchRecord>;
}
