use crate::db::queries::PlantSelector;
use crate::services::jobs::{JobQueue, JobTrigger};
use crate::utils::next_daily_run;
use chrono::{DateTime, Utc};
use log::{error, info};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest single sleep; the wall clock is re-read after each one.
const MAX_NAP: Duration = Duration::from_secs(300);

/// How long to sleep before checking the clock again on the way to `target`.
fn nap_until(now: DateTime<Utc>, target: DateTime<Utc>) -> Option<Duration> {
    let remaining = (target - now).to_std().ok().filter(|d| !d.is_zero())?;
    Some(remaining.min(MAX_NAP))
}

/// Spawn the daily trigger: every day at `hour`:00 UTC a run over every
/// active plant is queued.
pub fn spawn_daily(queue: JobQueue, hour: u32) -> Result<JoinHandle<()>, String> {
    thread::Builder::new()
        .name("reconcile-schedule".to_string())
        .spawn(move || run_loop(&queue, hour))
        .map_err(|e| format!("spawning scheduler failed: {}", e))
}

fn run_loop(queue: &JobQueue, hour: u32) {
    loop {
        let next = next_daily_run(Utc::now(), hour);
        info!("Schedule: next reconciliation run at {}", next);

        while let Some(nap) = nap_until(Utc::now(), next) {
            thread::sleep(nap);
        }

        match queue.submit(PlantSelector::All, JobTrigger::Scheduled) {
            Ok(id) => info!("Schedule: submitted daily run {}", id),
            Err(e) => {
                error!("Schedule: {}; stopping", e);
                return;
            }
        }
    }
}
