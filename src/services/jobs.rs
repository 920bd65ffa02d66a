//! Background reconciliation jobs.
//!
//! Submitting a job records it as `pending` and pushes it onto a channel;
//! worker threads consume the channel and drive each job through
//! `running` (and `retrying` between attempts) to `succeeded` or `failed`.
//! Callers only ever get the job id back.

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use log::{error, info};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use uuid::Uuid;

use crate::client::ReadingSource;
use crate::db::pool::PgPool;
use crate::db::queries::PlantSelector;
use crate::services::runner::{self, AttemptEvent, RetryPolicy, RunError, RunSummary};

/// Finished jobs beyond this count are forgotten, oldest first.
pub const MAX_TRACKED_JOBS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_finished(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTrigger {
    Manual,
    Scheduled,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub state: JobState,
    pub trigger: JobTrigger,
    pub targets: PlantSelector,
    pub attempts: u32,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub selector: PlantSelector,
    pub trigger: JobTrigger,
}

#[derive(Debug, Default)]
struct RegistryInner {
    records: HashMap<JobId, JobRecord>,
    order: VecDeque<JobId>,
}

impl RegistryInner {
    fn prune(&mut self) {
        while self.order.len() > MAX_TRACKED_JOBS {
            let Some(pos) = self
                .order
                .iter()
                .position(|id| self.records.get(id).is_none_or(|r| r.state.is_finished()))
            else {
                break;
            };
            if let Some(id) = self.order.remove(pos) {
                self.records.remove(&id);
            }
        }
    }
}

/// Status of submitted jobs, shared between the API and the workers.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl JobRegistry {
    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        self.inner.read().records.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, record: JobRecord) {
        let mut inner = self.inner.write();
        inner.order.push_back(record.id);
        inner.records.insert(record.id, record);
        inner.prune();
    }

    fn update(&self, id: JobId, f: impl FnOnce(&mut JobRecord)) {
        if let Some(record) = self.inner.write().records.get_mut(&id) {
            f(record);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("job queue is closed; no worker is consuming it")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: Sender<Job>,
    registry: JobRegistry,
}

impl JobQueue {
    pub fn new(registry: JobRegistry) -> (JobQueue, Receiver<Job>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (JobQueue { sender, registry }, receiver)
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Record and enqueue a run. Returns as soon as the job is queued.
    pub fn submit(&self, selector: PlantSelector, trigger: JobTrigger) -> Result<JobId, SubmitError> {
        let id = JobId::new();
        self.registry.insert(JobRecord {
            id,
            state: JobState::Pending,
            trigger,
            targets: selector.clone(),
            attempts: 0,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            summary: None,
            error: None,
        });

        let job = Job { id, selector, trigger };
        let targets = format!("{:?}", job.selector);
        if self.sender.send(job).is_err() {
            self.registry.update(id, |r| {
                r.state = JobState::Failed;
                r.finished_at = Some(Utc::now());
                r.error = Some(SubmitError::Closed.to_string());
            });
            return Err(SubmitError::Closed);
        }
        info!("Jobs: queued {:?} job {} for {}", trigger, id, targets);
        Ok(id)
    }
}

/// Run `job` through `run`, mirroring every state change into `registry`.
pub fn process_job<R>(job: &Job, registry: &JobRegistry, run: R)
where
    R: FnOnce(&mut dyn FnMut(AttemptEvent<'_>)) -> Result<RunSummary, RunError>,
{
    registry.update(job.id, |r| r.started_at = Some(Utc::now()));

    let mut on_event = |event: AttemptEvent<'_>| match event {
        AttemptEvent::Started { attempt } => registry.update(job.id, |r| {
            r.state = JobState::Running;
            r.attempts = attempt;
        }),
        AttemptEvent::Retrying { error, .. } => registry.update(job.id, |r| {
            r.state = JobState::Retrying;
            r.error = Some(error.to_string());
        }),
    };

    let result = run(&mut on_event);
    let finished_at = Utc::now();
    match result {
        Ok(summary) => {
            info!(
                "Jobs: job {} succeeded ({} plant(s), {} created, {} updated)",
                job.id, summary.plants, summary.created, summary.updated
            );
            registry.update(job.id, |r| {
                r.state = JobState::Succeeded;
                r.finished_at = Some(finished_at);
                r.summary = Some(summary);
                r.error = None;
            });
        }
        Err(err) => {
            let kind = if err.is_transient() { "retries exhausted" } else { "fatal error" };
            error!("Jobs: job {} failed ({}): {}", job.id, kind, err);
            registry.update(job.id, |r| {
                r.state = JobState::Failed;
                r.finished_at = Some(finished_at);
                r.error = Some(err.to_string());
            });
        }
    }
}

/// Start `count` worker threads consuming `receiver` until every sender is gone.
pub fn spawn_workers<S>(
    count: usize,
    receiver: Receiver<Job>,
    registry: JobRegistry,
    pool: PgPool,
    source: Arc<S>,
    policy: RetryPolicy,
) -> Result<Vec<JoinHandle<()>>, String>
where
    S: ReadingSource + Send + Sync + 'static,
{
    (0..count.max(1))
        .map(|n| {
            let receiver = receiver.clone();
            let registry = registry.clone();
            let pool = pool.clone();
            let source = Arc::clone(&source);
            thread::Builder::new()
                .name(format!("reconcile-worker-{n}"))
                .spawn(move || {
                    for job in receiver.iter() {
                        process_job(&job, &registry, |on_event| {
                            runner::execute(&pool, &*source, &job.selector, &policy, on_event)
                        });
                    }
                })
                .map_err(|e| format!("spawning worker {n} failed: {e}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MonitoringError;
    use crate::db::pool::StoreError;

    fn transient() -> RunError {
        RunError::Fetch {
            plant: "solar-a".to_string(),
            source: MonitoringError::Transport("timed out".to_string()),
        }
    }

    fn summary() -> RunSummary {
        RunSummary {
            plants: 2,
            created: 30,
            updated: 18,
            skipped_readings: 1,
        }
    }

    #[test]
    fn submit_returns_immediately_with_pending_record() {
        let (queue, receiver) = JobQueue::new(JobRegistry::default());
        let plant = Uuid::new_v4();

        let id = queue
            .submit(PlantSelector::from_ids(vec![plant]), JobTrigger::Manual)
            .unwrap();

        let record = queue.registry().get(id).unwrap();
        assert_eq!(record.state, JobState::Pending);
        assert_eq!(record.attempts, 0);
        assert_eq!(record.targets, PlantSelector::Ids(vec![plant]));

        let job = receiver.try_recv().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.trigger, JobTrigger::Manual);
    }

    #[test]
    fn submit_fails_without_consumers() {
        let (queue, receiver) = JobQueue::new(JobRegistry::default());
        drop(receiver);

        let err = queue.submit(PlantSelector::All, JobTrigger::Scheduled).unwrap_err();
        assert!(matches!(err, SubmitError::Closed));
        assert_eq!(queue.registry().len(), 1);
    }

    #[test]
    fn successful_job_after_retry() {
        let (queue, receiver) = JobQueue::new(JobRegistry::default());
        let id = queue.submit(PlantSelector::All, JobTrigger::Scheduled).unwrap();
        let job = receiver.try_recv().unwrap();

        process_job(&job, queue.registry(), |on_event| {
            on_event(AttemptEvent::Started { attempt: 1 });
            let err = transient();
            on_event(AttemptEvent::Retrying {
                attempt: 1,
                error: &err,
                delay: std::time::Duration::ZERO,
            });
            assert_eq!(queue.registry().get(id).unwrap().state, JobState::Retrying);
            on_event(AttemptEvent::Started { attempt: 2 });
            assert_eq!(queue.registry().get(id).unwrap().state, JobState::Running);
            Ok(summary())
        });

        let record = queue.registry().get(id).unwrap();
        assert_eq!(record.state, JobState::Succeeded);
        assert_eq!(record.attempts, 2);
        assert_eq!(record.summary, Some(summary()));
        assert!(record.error.is_none());
        assert!(record.started_at.is_some());
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn failed_job_keeps_the_error() {
        let (queue, receiver) = JobQueue::new(JobRegistry::default());
        let id = queue.submit(PlantSelector::All, JobTrigger::Manual).unwrap();
        let job = receiver.try_recv().unwrap();

        process_job(&job, queue.registry(), |on_event| {
            on_event(AttemptEvent::Started { attempt: 1 });
            Err(RunError::Store(StoreError::Diesel(diesel::result::Error::NotFound)))
        });

        let record = queue.registry().get(id).unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.attempts, 1);
        assert!(record.error.unwrap().contains("database error"));
    }

    #[test]
    fn registry_forgets_oldest_finished_jobs() {
        let (queue, receiver) = JobQueue::new(JobRegistry::default());
        let first = queue.submit(PlantSelector::All, JobTrigger::Manual).unwrap();
        let job = receiver.try_recv().unwrap();
        process_job(&job, queue.registry(), |_| Ok(RunSummary::default()));

        for _ in 0..MAX_TRACKED_JOBS {
            queue.submit(PlantSelector::All, JobTrigger::Manual).unwrap();
        }

        assert_eq!(queue.registry().len(), MAX_TRACKED_JOBS);
        assert!(queue.registry().get(first).is_none());
    }
}
