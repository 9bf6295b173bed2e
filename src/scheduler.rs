//! Monthly clock that drives the materializer.
//!
//! The scheduler runs as one spawned task: it sleeps until the first instant
//! of the next month, books that month's fixed transactions, and repeats. The
//! sleep races a shutdown signal so the task ends cleanly when the server
//! stops. On start it first repairs the current month in case the process was
//! down when the last boundary passed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use crate::clock::Clock;
use crate::db::Database;
use crate::materializer::{DedupPolicy, MaterializationReport, Materializer};
use crate::models::Period;

/// What the startup check found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchUpOutcome {
    /// Nothing to book.
    NoActiveDefinitions,
    /// The current month already has its entries; `found` generated entries
    /// against `expected` active fixed transactions.
    AlreadyComplete { found: i64, expected: i64 },
    /// A materialization pass ran for the current month.
    Materialized(MaterializationReport),
}

#[derive(Clone)]
pub struct Scheduler {
    db: Database,
    materializer: Materializer,
    clock: Arc<dyn Clock>,
}

/// Owner's side of a running scheduler task.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) detaches
/// the task: the monthly loop keeps running until the runtime stops.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask the scheduler to stop and wait for the task to finish. A firing in
    /// progress completes before the task exits.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        let _ = self.shutdown.send(true);
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Scheduler {
    pub fn new(db: Database, materializer: Materializer, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            materializer,
            clock,
        }
    }

    /// First instant of the month after `now`.
    pub fn next_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
        Period::containing(now).next().start()
    }

    /// Book the current month if the process missed its boundary.
    ///
    /// Under [`DedupPolicy::Legacy`] this compares the number of active fixed
    /// transactions with the number of entries in the current month whose
    /// description carries a generated-entry marker, so renamed or colliding
    /// fixed transactions can skew the count. Under
    /// [`DedupPolicy::Identity`] it counts fixed transactions with no
    /// generated entry for the month.
    pub async fn check_and_process_current_month(&self) -> Result<CatchUpOutcome> {
        let period = Period::containing(self.clock.now());
        tracing::info!("Checking whether {} still needs fixed transactions", period);

        let expected = self.db.count_active_definitions()?;
        if expected == 0 {
            tracing::info!("No active fixed transactions, skipping catch-up");
            return Ok(CatchUpOutcome::NoActiveDefinitions);
        }

        let (found, needed) = match self.materializer.policy() {
            DedupPolicy::Legacy => {
                let found = self.db.count_marker_entries(period)?;
                (found, found < expected)
            }
            DedupPolicy::Identity => {
                let missing = self.db.count_definitions_missing_entry(period)?;
                (expected - missing, missing > 0)
            }
        };

        if !needed {
            tracing::info!(
                "{} already processed: found {} generated entries",
                period,
                found
            );
            return Ok(CatchUpOutcome::AlreadyComplete { found, expected });
        }

        tracing::info!(
            "Catch-up needed for {}: found {} generated entries, expected {}",
            period,
            found,
            expected
        );
        let report = self.materializer.materialize(period).await?;
        Ok(CatchUpOutcome::Materialized(report))
    }

    /// Materialize `period` (default: the current month) in the background.
    ///
    /// Returns immediately. The handle may be awaited for the report or
    /// dropped; dropping it does not cancel the run.
    pub fn trigger_now(&self, period: Option<Period>) -> JoinHandle<Result<MaterializationReport>> {
        self.trigger_after(Duration::ZERO, period)
    }

    /// Like [`trigger_now`](Self::trigger_now), after a delay. The target month
    /// is resolved when the delay has elapsed.
    pub fn trigger_after(
        &self,
        delay: Duration,
        period: Option<Period>,
    ) -> JoinHandle<Result<MaterializationReport>> {
        let materializer = self.materializer.clone();
        tracing::info!("Fixed transaction run requested in {:?}", delay);

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let period = period.unwrap_or_else(|| materializer.current_period());
            materializer.materialize(period).await
        })
    }

    /// Spawn the monthly loop, optionally preceded by the startup catch-up.
    pub fn start(self, catch_up: bool) -> SchedulerHandle {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(self.run(catch_up, receiver));
        SchedulerHandle { shutdown, task }
    }

    async fn run(self, catch_up: bool, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Starting scheduler for monthly fixed transactions");

        if catch_up {
            if let Err(e) = self.check_and_process_current_month().await {
                tracing::error!("Catch-up for current month failed: {:#}", e);
            }
        }

        let mut detached = false;
        loop {
            if *shutdown.borrow() {
                break;
            }

            // Sampled after the previous firing finished, so the wait is
            // always measured up to a boundary that is still ahead.
            let now = self.clock.now();
            let next = Self::next_boundary(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            tracing::info!(
                "Next fixed transaction run scheduled for {} (in {:?})",
                next.format("%Y-%m-%d %H:%M:%S"),
                wait
            );

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed(), if !detached => match changed {
                    Ok(()) => break,
                    Err(_) => {
                        tracing::debug!("Scheduler handle dropped; running detached");
                        detached = true;
                        continue;
                    }
                },
            }

            let period = Period::containing(next);
            tracing::info!("Executing scheduled fixed transaction run for {}", period);
            if let Err(e) = self.materializer.materialize(period).await {
                tracing::error!("Scheduled run for {} failed: {:#}", period, e);
            }
        }

        tracing::info!("Scheduler stopped");
    }
}
