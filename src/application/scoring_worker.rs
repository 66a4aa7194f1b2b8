//! Scoring worker: drives discovery, fetch, dedup, routing, scoring and
//! write-back for every pending attempt, one job at a time.
//!
//! A failure anywhere after discovery is confined to its job. The job stays
//! pending and is picked up again on a later cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::adapters::scorers::ScorerRegistry;
use crate::domain::models::{Config, PendingJob, TaskFamily, WriteOutcome};
use crate::domain::ports::{BundleFetcher, FetchError, JobLeaseRepository, RecordingRepository};
use crate::services::{dedup, task_router, JobDiscovery, RetryPolicy, ScoreAggregator};

const MIN_LEASE_RENEWAL: Duration = Duration::from_millis(10);

/// Where the worker is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Waiting for the next cycle
    Idle,
    /// Querying pending jobs
    Polling,
    /// Fetching a bundle
    Fetching,
    /// Deduplicating and routing recordings
    Routing,
    /// Running scorers
    Scoring,
    /// Writing scores back
    Writing,
}

/// Errors that abandon a whole job for this cycle.
#[derive(Debug, Error)]
pub enum JobError {
    /// The bundle could not be fetched this time
    #[error("bundle unavailable: {0}")]
    TransientFetch(String),

    /// The bundle is unreadable
    #[error("malformed bundle: {0}")]
    MalformedBundle(String),

    /// A job stage ran past its timeout
    #[error("{stage} timed out after {after:?}")]
    Timeout {
        /// Stage that timed out
        stage: &'static str,
        /// The stage's timeout
        after: Duration,
    },

    /// The record store rejected a write
    #[error("write-back failed: {0}")]
    Persistence(String),

    /// The lease store failed
    #[error("lease error: {0}")]
    Lease(String),
}

impl From<FetchError> for JobError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transient(msg) => Self::TransientFetch(msg),
            FetchError::Malformed(msg) => Self::MalformedBundle(msg),
        }
    }
}

/// A family that contributed nothing to its job.
#[derive(Debug, Clone, Serialize)]
pub struct FamilyFailure {
    /// Family that failed
    pub family: TaskFamily,
    /// Why it failed
    pub reason: String,
}

/// A family that was scored and written.
#[derive(Debug, Clone, Serialize)]
pub struct FamilyResult {
    /// Family scored
    pub family: TaskFamily,
    /// One rounded value per scorer call
    pub values: Vec<f64>,
    /// Family-level score, when the family has one
    pub total: Option<f64>,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum JobOutcome {
    /// Every routed family was scored and written
    Completed,
    /// Some families failed; their recordings stay pending
    Partial,
    /// Another worker holds the job's lease
    Leased,
    /// The job was abandoned for this cycle
    Failed(String),
}

/// What happened to one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    /// Patient ID
    pub patient_id: String,
    /// Attempt number
    pub attempt: i64,
    /// How the job ended
    pub outcome: JobOutcome,
    /// Recordings in the fetched bundle
    pub fetched: usize,
    /// Recordings left after deduplication
    pub canonical: usize,
    /// Families scored and written
    pub scored: Vec<FamilyResult>,
    /// Families short of recordings
    pub skipped: Vec<TaskFamily>,
    /// Families that failed
    pub failures: Vec<FamilyFailure>,
    /// Rows written back
    pub written: WriteOutcome,
}

impl JobReport {
    fn new(job: &PendingJob, outcome: JobOutcome) -> Self {
        Self {
            patient_id: job.patient_id.clone(),
            attempt: job.attempt,
            outcome,
            fetched: 0,
            canonical: 0,
            scored: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            written: WriteOutcome::default(),
        }
    }

    /// Total written for `family`, if it was scored.
    pub fn family_total(&self, family: TaskFamily) -> Option<f64> {
        self.scored.iter().find(|r| r.family == family).and_then(|r| r.total)
    }

    /// Per-call values written for `family`, if it was scored.
    pub fn family_values(&self, family: TaskFamily) -> Option<&[f64]> {
        self.scored
            .iter()
            .find(|r| r.family == family)
            .map(|r| r.values.as_slice())
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// When the cycle began
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the pending-job query itself failed
    pub discovery_error: Option<String>,
    /// One report per job attempted
    pub jobs: Vec<JobReport>,
}

impl CycleReport {
    /// Jobs that completed.
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Completed))
    }

    /// Jobs that failed outright or in part.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Failed(_) | JobOutcome::Partial))
    }

    fn count(&self, pred: impl Fn(&JobOutcome) -> bool) -> usize {
        self.jobs.iter().filter(|j| pred(&j.outcome)).count()
    }
}

/// Worker tunables, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Pause between cycles
    pub poll_interval: Duration,
    /// Bound on one bundle fetch
    pub fetch_timeout: Duration,
    /// Bound on one scorer call
    pub scorer_timeout: Duration,
    /// Lease TTL; `None` disables leasing
    pub lease_ttl: Option<Duration>,
    /// Lease owner name
    pub worker_id: String,
}

impl WorkerOptions {
    /// Create options from `config`, with a fresh worker id.
    pub fn from_config(config: &Config) -> Self {
        let worker = &config.worker;
        Self {
            poll_interval: Duration::from_secs(worker.poll_interval_secs),
            fetch_timeout: Duration::from_secs(worker.fetch_timeout_secs),
            scorer_timeout: Duration::from_secs(worker.scorer_timeout_secs),
            lease_ttl: worker
                .leasing_enabled
                .then(|| Duration::from_secs(worker.lease_ttl_secs)),
            worker_id: format!("worker-{}", uuid::Uuid::new_v4().simple()),
        }
    }
}

/// Polls for pending attempts and scores them one at a time.
pub struct ScoringWorker {
    discovery: JobDiscovery,
    fetcher: Arc<dyn BundleFetcher>,
    aggregator: ScoreAggregator,
    leases: Arc<dyn JobLeaseRepository>,
    retry: RetryPolicy,
    options: WorkerOptions,
    state: Arc<RwLock<WorkerState>>,
}

impl ScoringWorker {
    /// Create a new worker.
    pub fn new(
        recordings: Arc<dyn RecordingRepository>,
        leases: Arc<dyn JobLeaseRepository>,
        fetcher: Arc<dyn BundleFetcher>,
        scorers: Arc<ScorerRegistry>,
        retry: RetryPolicy,
        options: WorkerOptions,
    ) -> Self {
        Self {
            discovery: JobDiscovery::new(recordings.clone(), leases.clone()),
            aggregator: ScoreAggregator::new(scorers, recordings, options.scorer_timeout),
            fetcher,
            leases,
            retry,
            options,
            state: Arc::new(RwLock::new(WorkerState::Idle)),
        }
    }

    /// Current stage of the cycle.
    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
    }

    /// Process every currently pending job once.
    pub async fn run_once(&self) -> CycleReport {
        self.run_cycle(None).await.0
    }

    /// Poll forever until `shutdown` fires. A job in flight when the signal
    /// arrives is finished; the rest of its cycle is not started.
    /// Returns the number of cycles run.
    pub async fn run_continuous(&self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut cycles = 0u64;

        info!(
            worker_id = %self.options.worker_id,
            interval_secs = self.options.poll_interval.as_secs(),
            fetcher = self.fetcher.name(),
            "Scoring worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let (report, stopped) = self.run_cycle(Some(&mut shutdown)).await;
                    cycles += 1;
                    info!(
                        jobs = report.jobs.len(),
                        completed = report.completed(),
                        failed = report.failed(),
                        "Cycle finished"
                    );
                    if stopped {
                        break;
                    }
                }

                _ = shutdown.recv() => break,
            }
        }

        info!(cycles, "Scoring worker stopped");
        cycles
    }

    async fn run_cycle(&self, mut shutdown: Option<&mut broadcast::Receiver<()>>) -> (CycleReport, bool) {
        let now = Utc::now();
        let mut report = CycleReport {
            started_at: Some(now),
            ..CycleReport::default()
        };

        self.set_state(WorkerState::Polling).await;
        let jobs = match self.discovery.discover(now).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Pending-job query failed");
                report.discovery_error = Some(e.to_string());
                self.set_state(WorkerState::Idle).await;
                return (report, false);
            }
        };

        if jobs.is_empty() {
            info!("No pending scoring jobs");
        } else {
            info!(count = jobs.len(), "Processing pending jobs");
        }

        let mut stopped = false;
        for job in &jobs {
            report.jobs.push(self.process_job(job).await);

            if let Some(rx) = shutdown.as_deref_mut() {
                if !matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)) {
                    info!("Shutdown requested; leaving remaining jobs for the next run");
                    stopped = true;
                    break;
                }
            }
        }

        self.set_state(WorkerState::Idle).await;
        (report, stopped)
    }

    /// Process one job. Never fails: every error ends up in the report.
    pub async fn process_job(&self, job: &PendingJob) -> JobReport {
        let span = info_span!("job", patient_id = %job.patient_id, attempt = job.attempt);
        async move {
            if let Some(ttl) = self.options.lease_ttl {
                match self
                    .leases
                    .try_claim(&job.patient_id, job.attempt, &self.options.worker_id, ttl)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("Job leased by another worker");
                        return JobReport::new(job, JobOutcome::Leased);
                    }
                    Err(e) => {
                        let err = JobError::Lease(e.to_string());
                        warn!(error = %err, "Could not claim job");
                        return JobReport::new(job, JobOutcome::Failed(err.to_string()));
                    }
                }
            }

            let run = self.run_job(job);
            let result = match self.options.lease_ttl {
                Some(ttl) => self.holding_lease(job, ttl, run).await,
                None => run.await,
            };
            let report = match result {
                Ok(report) => report,
                Err(err) => {
                    warn!(error = %err, "Job failed; will retry next cycle");
                    JobReport::new(job, JobOutcome::Failed(err.to_string()))
                }
            };

            self.record_outcome(job, &report).await;

            if self.options.lease_ttl.is_some() {
                if let Err(e) = self
                    .leases
                    .release(&job.patient_id, job.attempt, &self.options.worker_id)
                    .await
                {
                    warn!(error = %e, "Failed to release job lease");
                }
            }

            report
        }
        .instrument(span)
        .await
    }

    /// Drive `work` to completion, renewing the job's lease every third of
    /// its TTL so a long job is not claimed by another worker mid-flight.
    async fn holding_lease<F: Future>(&self, job: &PendingJob, ttl: Duration, work: F) -> F::Output {
        let mut renew = tokio::time::interval((ttl / 3).max(MIN_LEASE_RENEWAL));
        renew.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately; the claim was just made
        renew.tick().await;
        tokio::pin!(work);

        loop {
            tokio::select! {
                output = &mut work => return output,

                _ = renew.tick() => {
                    match self
                        .leases
                        .try_claim(&job.patient_id, job.attempt, &self.options.worker_id, ttl)
                        .await
                    {
                        Ok(true) => debug!("Job lease renewed"),
                        Ok(false) => warn!("Job lease lost to another worker"),
                        Err(e) => warn!(error = %e, "Failed to renew job lease"),
                    }
                }
            }
        }
    }

    async fn run_job(&self, job: &PendingJob) -> Result<JobReport, JobError> {
        self.set_state(WorkerState::Fetching).await;
        let bundle = tokio::time::timeout(self.options.fetch_timeout, self.fetcher.fetch(job))
            .await
            .map_err(|_| JobError::Timeout {
                stage: "bundle fetch",
                after: self.options.fetch_timeout,
            })??;
        if bundle.is_empty() {
            return Err(JobError::MalformedBundle(
                "bundle holds no recordings for a pending attempt".to_string(),
            ));
        }
        // _workspace is removed when this function returns, on every path
        let (recordings, _workspace) = bundle.into_recordings();

        self.set_state(WorkerState::Routing).await;
        let fetched = recordings.len();
        let canonical = dedup::resolve(recordings);
        let canonical_count = canonical.len();
        let routed = task_router::route(canonical);
        debug!(
            fetched,
            canonical = canonical_count,
            families = routed.plans.len(),
            skipped = routed.skipped.len(),
            unrouted = routed.unrouted.len(),
            "Attempt routed"
        );

        self.set_state(WorkerState::Scoring).await;
        let mut scoring = self.aggregator.score_attempt(&routed).await;

        self.set_state(WorkerState::Writing).await;
        let written = self
            .aggregator
            .write_attempt(&job.patient_id, job.attempt, &mut scoring)
            .await
            .map_err(JobError::Persistence)?;

        let outcome = if scoring.failed.is_empty() {
            JobOutcome::Completed
        } else {
            JobOutcome::Partial
        };
        info!(
            scored = scoring.scored.len(),
            failed = scoring.failed.len(),
            completed = written.completed,
            "Job finished"
        );

        Ok(JobReport {
            patient_id: job.patient_id.clone(),
            attempt: job.attempt,
            outcome,
            fetched,
            canonical: canonical_count,
            scored: scoring
                .scored
                .iter()
                .map(|s| FamilyResult {
                    family: s.family,
                    values: s.values.clone(),
                    total: s.total,
                })
                .collect(),
            skipped: routed.skipped.iter().map(|s| s.family).collect(),
            failures: scoring
                .failed
                .iter()
                .map(|f| FamilyFailure {
                    family: f.family(),
                    reason: f.to_string(),
                })
                .collect(),
            written,
        })
    }

    /// Update the job's failure record: cleared on success, advanced on any
    /// failure that leaves recordings pending.
    async fn record_outcome(&self, job: &PendingJob, report: &JobReport) {
        let error = match &report.outcome {
            JobOutcome::Completed => {
                if let Err(e) = self.leases.clear_failures(&job.patient_id, job.attempt).await {
                    warn!(error = %e, "Failed to clear failure record");
                }
                return;
            }
            JobOutcome::Leased => return,
            JobOutcome::Failed(reason) => reason.clone(),
            JobOutcome::Partial => report
                .failures
                .iter()
                .map(|f| f.reason.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        };

        let previous = match self.leases.failure(&job.patient_id, job.attempt).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(error = %e, "Failed to read failure record");
                None
            }
        };
        let failure = self
            .retry
            .record_failure(&job.patient_id, job.attempt, previous.as_ref(), &error, Utc::now());
        if failure.stuck {
            error!(
                failures = failure.consecutive_failures,
                last_error = %failure.last_error,
                "Job marked stuck; reset it to retry"
            );
        }
        if let Err(e) = self.leases.save_failure(&failure).await {
            warn!(error = %e, "Failed to save failure record");
        }
    }
}
