use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chime_core::{ChannelKind, DispatchOutcome, DispatchRecord, Reminder};
use chrono::Utc;
use futures_util::future::join_all;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::channel::{ChannelAdapter, Dispatcher};

/// Registry of channel adapters keyed by [`ChannelKind`].
///
/// A reminder is fanned out to exactly the channels it requests; each
/// adapter call runs concurrently and is bounded by `channel_timeout`, so a
/// slow provider costs at most one timeout per tick.
pub struct DispatchRouter {
    adapters: HashMap<ChannelKind, Arc<dyn ChannelAdapter>>,
    channel_timeout: Duration,
}

impl DispatchRouter {
    /// Create an empty router with no registered adapters.
    pub fn new(channel_timeout: Duration) -> Self {
        Self {
            adapters: HashMap::new(),
            channel_timeout,
        }
    }

    /// Register an adapter under its [`ChannelAdapter::kind`].
    ///
    /// If an adapter of the same kind is already registered it is replaced.
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        let kind = adapter.kind();
        info!(channel = %kind, "registering channel adapter");
        self.adapters.insert(kind, adapter);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.register(adapter);
        self
    }

    async fn send_one(&self, kind: ChannelKind, reminder: &Reminder) -> DispatchRecord {
        let Some(adapter) = self.adapters.get(&kind) else {
            debug!(reminder_id = %reminder.id, channel = %kind, "no adapter registered");
            return DispatchRecord::not_configured(kind, Utc::now(), "no adapter registered");
        };

        let started = Utc::now();
        match timeout(self.channel_timeout, adapter.send(reminder)).await {
            Ok(record) => record,
            Err(_) => {
                let ms = self.channel_timeout.as_millis() as u64;
                warn!(reminder_id = %reminder.id, channel = %kind, timeout_ms = ms, "channel send timed out");
                DispatchRecord::failure(kind, started, format!("timed out after {ms}ms"))
            }
        }
    }

    /// Send one occurrence of `reminder` on every requested channel.
    ///
    /// Returns one record per entry in `reminder.channels`, in channel order.
    pub async fn dispatch(&self, reminder: &Reminder) -> Vec<DispatchRecord> {
        let records = join_all(
            reminder
                .channels
                .iter()
                .map(|kind| self.send_one(*kind, reminder)),
        )
        .await;

        let failed = records
            .iter()
            .filter(|r| r.outcome == DispatchOutcome::Failure)
            .count();
        info!(
            reminder_id = %reminder.id,
            channels = records.len(),
            failed,
            "reminder dispatched"
        );
        records
    }
}

#[async_trait]
impl Dispatcher for DispatchRouter {
    async fn dispatch(&self, reminder: &Reminder) -> Vec<DispatchRecord> {
        DispatchRouter::dispatch(self, reminder).await
    }
}
