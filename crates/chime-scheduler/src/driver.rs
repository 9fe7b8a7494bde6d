use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chime_channels::{Dispatcher, ForegroundSession, SurfacedReminder};
use chime_core::{DispatchOutcome, DispatchRecord, Reminder};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    coordinator::ClaimCoordinator,
    error::Result,
    types::{ClaimScope, ClaimedReminder, CommitOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Runs while a user session is open; claims only that owner's reminders.
    Foreground,
    /// Reliability backstop; claims every owner's reminders.
    Background,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Foreground => "foreground",
            DriverKind::Background => "background",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one tick, as returned by the background trigger surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Reminders claimed this tick.
    pub processed: usize,
    /// Reminders whose commit landed (finalized or rescheduled).
    pub dispatched: usize,
    /// Item failures and per-channel `Failure` details. Never `NotConfigured`.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickReport),
    /// The previous tick on this driver was still running.
    Skipped,
}

/// Resets the busy flag once the batch it guards is over, even if that batch
/// panicked.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct ItemResult {
    reminder: Reminder,
    records: Vec<DispatchRecord>,
    outcome: CommitOutcome,
}

/// A periodically ticking scheduler.
///
/// Both drivers run the same claim, dispatch, commit cycle. They share no
/// in-process state with each other; each has its own coordinator on its own
/// store connection.
pub struct SchedulerDriver {
    cycle: Arc<Cycle>,
    busy: Arc<AtomicBool>,
}

/// Everything one tick needs, shareable with the detached batch task.
struct Cycle {
    kind: DriverKind,
    scope: ClaimScope,
    coordinator: Arc<ClaimCoordinator>,
    dispatcher: Arc<dyn Dispatcher>,
    session: Option<Arc<ForegroundSession>>,
}

impl SchedulerDriver {
    pub fn background(coordinator: Arc<ClaimCoordinator>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self::with_cycle(Cycle {
            kind: DriverKind::Background,
            scope: ClaimScope::All,
            coordinator,
            dispatcher,
            session: None,
        })
    }

    pub fn foreground(
        coordinator: Arc<ClaimCoordinator>,
        dispatcher: Arc<dyn Dispatcher>,
        session: Arc<ForegroundSession>,
    ) -> Self {
        Self::with_cycle(Cycle {
            kind: DriverKind::Foreground,
            scope: ClaimScope::Owner(session.owner_id().clone()),
            coordinator,
            dispatcher,
            session: Some(session),
        })
    }

    fn with_cycle(cycle: Cycle) -> Self {
        Self {
            cycle: Arc::new(cycle),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn kind(&self) -> DriverKind {
        self.cycle.kind
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// One-time session setup. Safe to call more than once.
    pub fn start(&self) {
        if let Some(session) = &self.cycle.session {
            if session.bootstrap_permissions() {
                debug!(owner_id = %session.owner_id(), "requested local channel permissions");
            }
        }
    }

    /// Claim, dispatch and commit everything due at `now`.
    ///
    /// Returns [`TickOutcome::Skipped`] without touching the store if the
    /// previous tick has not finished. The batch runs on its own task: dropping
    /// this future (a trigger caller hanging up) does not stop claimed items
    /// from being dispatched and committed, and the driver stays busy until
    /// they are.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(driver = %self.cycle.kind, "tick skipped, previous tick still running");
            return TickOutcome::Skipped;
        }
        let guard = BusyGuard(Arc::clone(&self.busy));
        let cycle = Arc::clone(&self.cycle);
        let batch = tokio::spawn(async move {
            let _guard = guard;
            cycle.run_batch(now).await
        });

        match batch.await {
            Ok(report) => TickOutcome::Completed(report),
            Err(e) => {
                error!(driver = %self.cycle.kind, error = %e, "tick task failed");
                TickOutcome::Completed(TickReport {
                    errors: vec![format!("tick task failed: {e}")],
                    ..TickReport::default()
                })
            }
        }
    }

    /// Tick every `every` until `shutdown` flips to `true` or its sender drops.
    pub async fn run(self: Arc<Self>, every: Duration, mut shutdown: watch::Receiver<bool>) {
        self.start();
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let kind = self.cycle.kind;
        info!(driver = %kind, interval_secs = every.as_secs(), "scheduler driver started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let TickOutcome::Completed(report) = self.tick(Utc::now()).await {
                        for e in &report.errors {
                            warn!(driver = %kind, error = %e, "tick error");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(driver = %kind, "scheduler driver stopping");
                        break;
                    }
                }
            }
        }
    }
}

impl Cycle {
    async fn run_batch(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let claimed = match self.coordinator.claim_due(now, &self.scope) {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(driver = %self.kind, error = %e, "claim failed");
                report.errors.push(format!("claim failed: {e}"));
                return report;
            }
        };
        report.processed = claimed.len();

        let mut tasks = JoinSet::new();
        for item in claimed {
            let coordinator = Arc::clone(&self.coordinator);
            let dispatcher = Arc::clone(&self.dispatcher);
            let id = item.reminder.id.clone();
            tasks.spawn(async move {
                process(coordinator, dispatcher, item)
                    .await
                    .map_err(|e| format!("{id}: {e}"))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(item)) => self.record(&mut report, item),
                Ok(Err(e)) => {
                    error!(driver = %self.kind, error = %e, "reminder commit failed");
                    report.errors.push(e);
                }
                // The item stays Claimed and is picked up again once stale.
                Err(e) => {
                    error!(driver = %self.kind, error = %e, "dispatch task panicked");
                    report.errors.push(format!("dispatch task failed: {e}"));
                }
            }
        }

        if report.processed > 0 {
            info!(
                driver = %self.kind,
                processed = report.processed,
                dispatched = report.dispatched,
                errors = report.errors.len(),
                "tick complete"
            );
        }
        report
    }

    fn record(&self, report: &mut TickReport, item: ItemResult) {
        for record in item.records.iter().filter(|r| r.is_failure()) {
            report.errors.push(format!(
                "{} {}: {}",
                item.reminder.id,
                record.channel,
                record.error_detail.as_deref().unwrap_or("failed")
            ));
        }
        if !item.outcome.persisted() {
            return;
        }
        report.dispatched += 1;

        let Some(session) = &self.session else {
            return;
        };
        let shown_locally = item
            .records
            .iter()
            .any(|r| r.channel.is_local() && r.outcome == DispatchOutcome::Success);
        if shown_locally {
            session.surface(SurfacedReminder {
                reminder_id: item.reminder.id.clone(),
                title: item.reminder.title.clone(),
                message: item.reminder.message.clone(),
                surfaced_at: Utc::now(),
            });
        }
    }
}

async fn process(
    coordinator: Arc<ClaimCoordinator>,
    dispatcher: Arc<dyn Dispatcher>,
    item: ClaimedReminder,
) -> Result<ItemResult> {
    let records = dispatcher.dispatch(&item.reminder).await;
    let outcome = coordinator.commit(&item, &records, Utc::now())?;
    Ok(ItemResult {
        reminder: item.reminder,
        records,
        outcome,
    })
}
