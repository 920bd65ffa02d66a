//! One reconciliation run: resolve target plants, fetch the last 24 hours of
//! readings for each plant in turn, merge them. A failed monitoring call
//! aborts the run and the whole run is retried with a fixed backoff.

use chrono::{DateTime, Utc};
use diesel::PgConnection;
use log::{info, warn};
use serde::Serialize;
use std::thread;
use std::time::Duration;

use crate::client::{MonitoringError, ReadingSource};
use crate::db::pool::{PgPool, StoreError};
use crate::db::queries::{select_active_plants, PlantSelector};
use crate::services::reconcile::{reconcile_plant, MergeSummary};
use crate::utils::fetch_window;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("monitoring fetch for plant {plant:?} failed: {source}")]
    Fetch {
        plant: String,
        #[source]
        source: MonitoringError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RunError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RunError::Fetch { .. })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub plants: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped_readings: usize,
}

impl RunSummary {
    fn record(&mut self, merged: MergeSummary, skipped: usize) {
        self.plants += 1;
        self.created += merged.created;
        self.updated += merged.updated;
        self.skipped_readings += skipped;
    }
}

/// Progress notifications emitted while a run is being attempted.
#[derive(Debug)]
pub enum AttemptEvent<'a> {
    Started { attempt: u32 },
    Retrying { attempt: u32, error: &'a RunError, delay: Duration },
}

/// Execute a single attempt over the plants picked by `selector`.
pub fn run_once<S>(
    conn: &mut PgConnection,
    source: &S,
    selector: &PlantSelector,
    now: DateTime<Utc>,
) -> Result<RunSummary, RunError>
where
    S: ReadingSource + ?Sized,
{
    let plants = select_active_plants(conn, selector)?;
    let mut summary = RunSummary::default();
    if plants.is_empty() {
        info!("Reconcile: no active plants found");
        return Ok(summary);
    }

    let (from, to) = fetch_window(now);
    info!("Reconcile: {} plant(s), window {} .. {}", plants.len(), from, to);

    for plant in &plants {
        let outcome = source
            .fetch_readings(&plant.name, from, to)
            .map_err(|err| RunError::Fetch {
                plant: plant.name.clone(),
                source: err,
            })?;
        for skipped in &outcome.skipped {
            warn!("Reconcile: plant {} dropped {}", plant.name, skipped);
        }

        let merged = reconcile_plant(conn, plant, &outcome.readings)?;
        info!(
            "Reconcile: plant {} complete ({} created, {} updated, {} skipped)",
            plant.name,
            merged.created,
            merged.updated,
            outcome.skipped.len()
        );
        summary.record(merged, outcome.skipped.len());
    }

    Ok(summary)
}

/// Drive `attempt` until it succeeds, fails fatally, or exhausts the policy.
pub fn run_with_retry<A, E, S>(policy: &RetryPolicy, mut attempt: A, mut on_event: E, sleep: S) -> Result<RunSummary, RunError>
where
    A: FnMut() -> Result<RunSummary, RunError>,
    E: FnMut(AttemptEvent<'_>),
    S: Fn(Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut current = 1;
    loop {
        on_event(AttemptEvent::Started { attempt: current });
        match attempt() {
            Ok(summary) => return Ok(summary),
            Err(err) if err.is_transient() && current < max_attempts => {
                warn!(
                    "Reconcile: attempt {}/{} failed ({}); retrying in {}s",
                    current,
                    max_attempts,
                    err,
                    policy.backoff.as_secs()
                );
                on_event(AttemptEvent::Retrying {
                    attempt: current,
                    error: &err,
                    delay: policy.backoff,
                });
                sleep(policy.backoff);
                current += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Full run against the pool: one pooled connection per attempt, real sleeps
/// between attempts.
pub fn execute<S, E>(
    pool: &PgPool,
    source: &S,
    selector: &PlantSelector,
    policy: &RetryPolicy,
    on_event: E,
) -> Result<RunSummary, RunError>
where
    S: ReadingSource + ?Sized,
    E: FnMut(AttemptEvent<'_>),
{
    run_with_retry(
        policy,
        || {
            let mut conn = pool.get().map_err(StoreError::from)?;
            run_once(&mut conn, source, selector, Utc::now())
        },
        on_event,
        thread::sleep,
    )
}
