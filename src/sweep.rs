//! Periodic deadline sweep.
//!
//! One tick evaluates every tracked record under the store lock, writes the
//! results back, releases the lock, dispatches each record's actions and
//! finally saves the snapshot once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::ids::UserId;
use crate::observability::metrics;
use crate::phase::Action;
use crate::tracker::{Tracker, persist};

/// Smallest accepted tick period.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Tally of one sweep tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records evaluated.
    pub evaluated: usize,
    /// Warnings issued.
    pub warnings: usize,
    /// Members jailed.
    pub jails: usize,
    /// Records skipped because they could not be evaluated.
    pub errors: usize,
    /// Platform calls that failed (closed DMs excluded).
    pub dispatch_failures: usize,
}

/// Runs one tick and saves the store.
pub async fn run_once(tracker: &Tracker, now: DateTime<Utc>) -> SweepReport {
    tick(tracker, now, true).await
}

/// Runs one tick without saving. The in-memory store is still updated.
pub async fn preview(tracker: &Tracker, now: DateTime<Utc>) -> SweepReport {
    tick(tracker, now, false).await
}

async fn tick(tracker: &Tracker, now: DateTime<Utc>, save: bool) -> SweepReport {
    let started = Instant::now();
    let mut report = SweepReport::default();

    let batches: Vec<(UserId, Vec<Action>)> = {
        let mut store = tracker.store().lock().await;
        let steps: Vec<_> = store
            .iter()
            .map(|(user, record)| (user, tracker.machine().evaluate(user, record, now)))
            .collect();

        let mut batches = Vec::new();
        for (user, step) in steps {
            report.evaluated += 1;
            match step {
                Ok(step) => {
                    for action in &step.actions {
                        match action {
                            Action::Warn { .. } => report.warnings += 1,
                            Action::Jail { .. } => report.jails += 1,
                            _ => {}
                        }
                    }
                    if !step.actions.is_empty() {
                        store.insert(user, step.record);
                        batches.push((user, step.actions));
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    error!(%user, error = %e, "skipping record");
                }
            }
        }
        batches
    };

    for (user, actions) in &batches {
        debug!(%user, actions = actions.len(), "dispatching sweep actions");
        let outcome = tracker.dispatcher().apply(actions, now).await;
        report.dispatch_failures += outcome.failed;
    }

    if save {
        persist(&*tracker.store().lock().await);
    }

    metrics::record_sweep(started.elapsed());
    info!(
        evaluated = report.evaluated,
        warnings = report.warnings,
        jails = report.jails,
        errors = report.errors,
        dispatch_failures = report.dispatch_failures,
        "sweep complete"
    );
    report
}

/// Starts the sweep loop. The first tick runs immediately; the task stops
/// when `cancel` fires, never in the middle of a tick.
#[must_use]
pub fn spawn(tracker: Arc<Tracker>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(MIN_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("sweep task cancelled");
                    break;
                }
                _ = interval.tick() => {
                    run_once(&tracker, Utc::now()).await;
                }
            }
        }
    })
}
