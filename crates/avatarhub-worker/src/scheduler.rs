//! Admission-controlled job scheduling.
//!
//! The scheduler owns every job state transition: creation with
//! deduplication, FIFO admission under the concurrency ceiling, attempt
//! accounting with requeue-or-fail decisions, terminal bookkeeping mirrored
//! onto the avatar row, and manual retry.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use avatarhub_core::config::worker::WorkerConfig;
use avatarhub_core::result::AppResult;
use avatarhub_core::traits::notify::JobNotifier;
use avatarhub_core::{AppError, ErrorKind};
use avatarhub_entity::avatar::model::Avatar;
use avatarhub_entity::avatar::store::AvatarStore;
use avatarhub_entity::job::model::{AvatarJob, NewAvatarJob};
use avatarhub_entity::job::status::JobStatus;
use avatarhub_entity::job::store::JobStore;

use crate::executor::{truncate_error, AvatarExecutor, ExecutionOutcome};
use crate::selector::{ExecutionMode, ModeSelector};

/// Point-in-time view of the queue, served on the operator surface.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Jobs currently processing.
    pub running: i64,
    /// Jobs waiting for a slot.
    pub pending: i64,
    /// Concurrency ceiling.
    pub max_concurrent: i64,
    /// Jobs completed since UTC midnight.
    pub completed_today: i64,
    /// Jobs terminally failed since UTC midnight.
    pub failed_today: i64,
}

/// The job scheduler.
pub struct JobScheduler {
    jobs: Arc<dyn JobStore>,
    avatars: Arc<dyn AvatarStore>,
    notifier: Arc<dyn JobNotifier>,
    selector: ModeSelector,
    cli: Arc<dyn AvatarExecutor>,
    remote: Arc<dyn AvatarExecutor>,
    config: WorkerConfig,
}

impl JobScheduler {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        avatars: Arc<dyn AvatarStore>,
        notifier: Arc<dyn JobNotifier>,
        selector: ModeSelector,
        cli: Arc<dyn AvatarExecutor>,
        remote: Arc<dyn AvatarExecutor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            jobs,
            avatars,
            notifier,
            selector,
            cli,
            remote,
            config,
        }
    }

    /// Create a job for an avatar, or return the avatar's active job if one
    /// already exists. Newly created jobs are admitted immediately when a
    /// slot is free.
    pub async fn create_job(&self, avatar_id: Uuid) -> AppResult<AvatarJob> {
        let avatar = self
            .avatars
            .find_by_id(avatar_id)
            .await?
            .ok_or_else(|| AppError::not_found("Avatar not found"))?;
        if !avatar.has_source_video() {
            return Err(AppError::validation("Avatar has no source video"));
        }

        if let Some(existing) = self.jobs.find_active_for_avatar(avatar_id).await? {
            info!(job_id = %existing.id, %avatar_id, "Returning existing active job");
            return Ok(existing);
        }

        let new = NewAvatarJob {
            avatar_id,
            owner_id: avatar.owner_id,
            max_attempts: self.config.max_attempts,
        };
        let job = match self.jobs.insert(&new).await {
            Ok(job) => job,
            // Lost a creation race; the winner's job is the job.
            Err(e) if e.kind == ErrorKind::Conflict => self
                .jobs
                .find_active_for_avatar(avatar_id)
                .await?
                .ok_or(e)?,
            Err(e) => return Err(e),
        };

        info!(job_id = %job.id, %avatar_id, "Created avatar generation job");
        self.admit_pending().await?;

        self.jobs
            .find_by_id(job.id)
            .await?
            .ok_or_else(|| AppError::not_found("Job not found"))
    }

    /// Current queue counters.
    pub async fn queue_status(&self) -> AppResult<QueueStatus> {
        let today = Utc::now()
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        Ok(QueueStatus {
            running: self.jobs.count_with_status(JobStatus::Processing).await?,
            pending: self.jobs.count_with_status(JobStatus::Pending).await?,
            max_concurrent: self.config.max_concurrent,
            completed_today: self
                .jobs
                .count_finished_since(JobStatus::Completed, today)
                .await?,
            failed_today: self
                .jobs
                .count_finished_since(JobStatus::Failed, today)
                .await?,
        })
    }

    /// Admit pending jobs oldest-first while slots are free. Returns the
    /// number of jobs that actually began an attempt; jobs failed
    /// permanently before dispatch are not counted.
    ///
    /// Runs in passes because a synchronous backend can finish a job within
    /// its trigger call, freeing the slot for the next pending job. Each
    /// job is triggered at most once per invocation so a failing attempt
    /// waits for the next scheduler tick instead of spinning here.
    pub async fn admit_pending(&self) -> AppResult<usize> {
        let mut attempted: HashSet<Uuid> = HashSet::new();
        let mut started = 0usize;

        loop {
            let running = self.jobs.count_with_status(JobStatus::Processing).await?;
            let slots = self.config.max_concurrent - running;
            if slots <= 0 {
                return Ok(started);
            }

            let batch: Vec<AvatarJob> = self
                .jobs
                .find_pending(self.config.max_concurrent)
                .await?
                .into_iter()
                .filter(|job| !attempted.contains(&job.id))
                .take(slots as usize)
                .collect();
            if batch.is_empty() {
                return Ok(started);
            }

            for job in batch {
                attempted.insert(job.id);
                match self.trigger(&job).await {
                    Ok(true) => started += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "Failed to trigger job");
                    }
                }
            }
        }
    }

    /// Run one attempt for a pending job. Returns whether the job was
    /// moved into processing.
    async fn trigger(&self, job: &AvatarJob) -> AppResult<bool> {
        let avatar = match self.avatars.find_by_id(job.avatar_id).await? {
            Some(avatar) => avatar,
            None => {
                // Permanent: retrying cannot bring the avatar back.
                self.jobs.fail(job.id, "Avatar not found").await?;
                return Ok(false);
            }
        };
        if !avatar.has_source_video() {
            self.fail_terminal(job.id, &avatar, "Avatar has no source video")
                .await?;
            return Ok(false);
        }

        let Some(job) = self.jobs.begin_attempt(job.id).await? else {
            // Another admission pass took the job.
            return Ok(false);
        };
        self.avatars.begin_processing(avatar.id).await?;

        let mode = self.selector.select().await;
        let executor = match mode {
            ExecutionMode::Cli => &self.cli,
            ExecutionMode::Api => &self.remote,
        };
        info!(
            job_id = %job.id,
            avatar_id = %avatar.id,
            attempt = job.attempts,
            mode = mode.as_str(),
            "Executing avatar generation attempt"
        );

        match executor.execute(&job, &avatar).await {
            ExecutionOutcome::Dispatched { pid, log_path } => {
                self.jobs.record_dispatch(job.id, pid, &log_path).await?;
                info!(job_id = %job.id, pid, "Detached pipeline run dispatched");
            }
            ExecutionOutcome::Completed {
                result_key,
                remote_job_ref,
                ..
            } => {
                self.complete_job(&job, &result_key, remote_job_ref.as_deref(), mode)
                    .await?;
            }
            ExecutionOutcome::Failed { kind, message } => {
                warn!(
                    job_id = %job.id,
                    kind = kind.as_str(),
                    error = %message,
                    "Execution attempt failed"
                );
                self.fail_attempt(&job, &message).await?;
            }
        }
        Ok(true)
    }

    /// Mark a job completed and mirror the result onto its avatar.
    pub async fn complete_job(
        &self,
        job: &AvatarJob,
        result_key: &str,
        remote_job_ref: Option<&str>,
        mode: ExecutionMode,
    ) -> AppResult<()> {
        self.jobs.complete(job.id, result_key, remote_job_ref).await?;

        if let Some(avatar) = self.avatars.find_by_id(job.avatar_id).await? {
            self.avatars
                .complete(avatar.id, result_key, mode.as_str())
                .await?;
            self.notifier
                .generation_completed(avatar.owner_id, &avatar.name)
                .await;
        }

        info!(job_id = %job.id, result_key, mode = mode.as_str(), "Job completed");
        Ok(())
    }

    /// Account a failed attempt: requeue while the budget lasts, otherwise
    /// fail terminally. `job` must reflect the attempt just taken.
    pub async fn fail_attempt(&self, job: &AvatarJob, message: &str) -> AppResult<()> {
        let message = truncate_error(message);

        if job.has_attempts_left() {
            let tagged = format!("Attempt {} failed: {message}", job.attempts);
            info!(
                job_id = %job.id,
                attempt = job.attempts,
                max_attempts = job.max_attempts,
                "Requeueing job for retry"
            );
            return self.jobs.requeue(job.id, &tagged).await;
        }

        let tagged = format!("Max attempts reached. Last error: {message}");
        let avatar = self.avatars.find_by_id(job.avatar_id).await?;
        match avatar {
            Some(avatar) => self.fail_terminal(job.id, &avatar, &tagged).await,
            None => self.jobs.fail(job.id, &tagged).await,
        }
    }

    async fn fail_terminal(&self, job_id: Uuid, avatar: &Avatar, message: &str) -> AppResult<()> {
        self.jobs.fail(job_id, message).await?;
        self.avatars.fail(avatar.id, message).await?;
        self.notifier
            .generation_failed(avatar.owner_id, &avatar.name, message)
            .await;
        warn!(%job_id, avatar_id = %avatar.id, "Job terminally failed");
        Ok(())
    }

    /// Manually retry a terminally failed job: reset its attempt budget,
    /// return the avatar to pending, and admit it when a slot is free.
    pub async fn retry_job(&self, job_id: Uuid) -> AppResult<AvatarJob> {
        let job = self
            .jobs
            .reset_for_retry(job_id)
            .await?
            .ok_or_else(|| AppError::not_found("Job not found or not retryable"))?;
        self.avatars.reset_pending(job.avatar_id).await?;

        info!(%job_id, avatar_id = %job.avatar_id, "Job reset for retry");
        self.admit_pending().await?;

        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::not_found("Job not found"))
    }

    /// Fetch a job by id.
    pub async fn get_job(&self, job_id: Uuid) -> AppResult<AvatarJob> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::not_found("Job not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use avatarhub_core::config::remote::{ModePreference, RemoteConfig};
    use crate::selector::CapacityProbe;
    use crate::testing::{sample_avatar, InMemoryAvatarStore, InMemoryJobStore, RecordingNotifier};

    struct StubExecutor {
        mode: ExecutionMode,
        outcomes: Mutex<VecDeque<ExecutionOutcome>>,
    }

    impl StubExecutor {
        fn new(mode: ExecutionMode, outcomes: Vec<ExecutionOutcome>) -> Arc<Self> {
            Arc::new(Self {
                mode,
                outcomes: Mutex::new(outcomes.into()),
            })
        }
    }

    #[async_trait]
    impl AvatarExecutor for StubExecutor {
        fn mode(&self) -> ExecutionMode {
            self.mode
        }

        async fn execute(&self, _job: &AvatarJob, _avatar: &Avatar) -> ExecutionOutcome {
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ExecutionOutcome::Dispatched {
                    pid: 4242,
                    log_path: "/tmp/avatar_jobs/test.log".to_string(),
                })
        }
    }

    struct NoCapacity;

    #[async_trait]
    impl CapacityProbe for NoCapacity {
        async fn has_capacity(&self) -> bool {
            false
        }
    }

    struct Harness {
        jobs: Arc<InMemoryJobStore>,
        avatars: Arc<InMemoryAvatarStore>,
        notifier: Arc<RecordingNotifier>,
        scheduler: JobScheduler,
    }

    fn harness(
        mode: ModePreference,
        cli_outcomes: Vec<ExecutionOutcome>,
        remote_outcomes: Vec<ExecutionOutcome>,
        max_concurrent: i64,
    ) -> Harness {
        let jobs = Arc::new(InMemoryJobStore::new());
        let avatars = Arc::new(InMemoryAvatarStore::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let remote_config = RemoteConfig {
            mode,
            base_url: "https://gpu.example.test/v2/abc".to_string(),
            api_key: "key".to_string(),
            run_timeout_seconds: 300,
            probe_timeout_seconds: 10,
        };
        let probe: Arc<dyn CapacityProbe> = match mode {
            ModePreference::Api => Arc::new(AlwaysCapacity),
            _ => Arc::new(NoCapacity),
        };
        let scheduler = JobScheduler::new(
            jobs.clone(),
            avatars.clone(),
            notifier.clone(),
            ModeSelector::new(&remote_config, probe),
            StubExecutor::new(ExecutionMode::Cli, cli_outcomes),
            StubExecutor::new(ExecutionMode::Api, remote_outcomes),
            WorkerConfig {
                enabled: true,
                max_concurrent,
                max_attempts: 3,
                check_interval_seconds: 10,
                initial_delay_seconds: 5,
            },
        );

        Harness {
            jobs,
            avatars,
            notifier,
            scheduler,
        }
    }

    struct AlwaysCapacity;

    #[async_trait]
    impl CapacityProbe for AlwaysCapacity {
        async fn has_capacity(&self) -> bool {
            true
        }
    }

    fn seed_avatar(h: &Harness) -> Uuid {
        let avatar = sample_avatar(Uuid::new_v4(), Uuid::new_v4());
        let id = avatar.id;
        h.avatars.put(avatar);
        id
    }

    #[tokio::test]
    async fn create_job_returns_existing_active_job() {
        let h = harness(ModePreference::Cli, vec![], vec![], 3);
        let avatar_id = seed_avatar(&h);

        let first = h.scheduler.create_job(avatar_id).await.unwrap();
        assert_eq!(first.status, JobStatus::Processing);

        let second = h.scheduler.create_job(avatar_id).await.unwrap();
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn create_job_rejects_avatar_without_source() {
        let h = harness(ModePreference::Cli, vec![], vec![], 3);
        let mut avatar = sample_avatar(Uuid::new_v4(), Uuid::new_v4());
        avatar.source_video_key = None;
        let id = avatar.id;
        h.avatars.put(avatar);

        let err = h.scheduler.create_job(id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn admission_respects_concurrency_ceiling() {
        let h = harness(ModePreference::Cli, vec![], vec![], 2);
        for _ in 0..3 {
            let avatar_id = seed_avatar(&h);
            h.scheduler.create_job(avatar_id).await.unwrap();
        }

        let status = h.scheduler.queue_status().await.unwrap();
        assert_eq!(status.running, 2);
        assert_eq!(status.pending, 1);
        assert_eq!(status.max_concurrent, 2);
    }

    #[tokio::test]
    async fn admission_is_oldest_first() {
        let h = harness(ModePreference::Cli, vec![], vec![], 2);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let avatar_id = seed_avatar(&h);
            let new = NewAvatarJob {
                avatar_id,
                owner_id: Uuid::new_v4(),
                max_attempts: 3,
            };
            let mut job = h.jobs.insert(&new).await.unwrap();
            job.created_at = Utc::now() + chrono::Duration::seconds(ids.len() as i64);
            h.jobs.put(job.clone());
            ids.push(job.id);
        }

        h.scheduler.admit_pending().await.unwrap();

        assert_eq!(h.jobs.job(ids[0]).unwrap().status, JobStatus::Processing);
        assert_eq!(h.jobs.job(ids[1]).unwrap().status, JobStatus::Processing);
        assert_eq!(h.jobs.job(ids[2]).unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn synchronous_completion_frees_slot_within_one_admission() {
        let completed = ExecutionOutcome::Completed {
            result_key: "avatars/o/a.tar".to_string(),
            remote_job_ref: Some("rp-1".to_string()),
            frame_count: Some(100),
        };
        let h = harness(
            ModePreference::Api,
            vec![],
            vec![completed.clone(), completed.clone(), completed],
            1,
        );
        for _ in 0..3 {
            let avatar_id = seed_avatar(&h);
            let new = NewAvatarJob {
                avatar_id,
                owner_id: Uuid::new_v4(),
                max_attempts: 3,
            };
            h.jobs.insert(&new).await.unwrap();
        }

        h.scheduler.admit_pending().await.unwrap();

        let status = h.scheduler.queue_status().await.unwrap();
        assert_eq!(status.pending, 0);
        assert_eq!(status.completed_today, 3);
    }

    #[tokio::test]
    async fn remote_completion_mirrors_avatar_and_notifies() {
        let h = harness(
            ModePreference::Api,
            vec![],
            vec![ExecutionOutcome::Completed {
                result_key: "avatars/o/a.tar".to_string(),
                remote_job_ref: Some("rp-1".to_string()),
                frame_count: Some(412),
            }],
            3,
        );
        let avatar_id = seed_avatar(&h);

        let job = h.scheduler.create_job(avatar_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.remote_job_ref.as_deref(), Some("rp-1"));

        let avatar = h.avatars.avatar(avatar_id).unwrap();
        assert_eq!(avatar.progress_percent, 100);
        assert_eq!(avatar.execution_mode.as_deref(), Some("api"));
        assert_eq!(h.notifier.completed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transient_failure_requeues_with_attempt_message() {
        let h = harness(
            ModePreference::Cli,
            vec![ExecutionOutcome::Failed {
                kind: crate::executor::FailureKind::Backend,
                message: "boom".to_string(),
            }],
            vec![],
            3,
        );
        let avatar_id = seed_avatar(&h);

        let job = h.scheduler.create_job(avatar_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.error_message.as_deref(), Some("Attempt 1 failed: boom"));
    }

    #[tokio::test]
    async fn exhausted_attempts_fail_terminally() {
        let h = harness(
            ModePreference::Cli,
            vec![ExecutionOutcome::Failed {
                kind: crate::executor::FailureKind::Backend,
                message: "boom".to_string(),
            }],
            vec![],
            3,
        );
        let avatar_id = seed_avatar(&h);
        let new = NewAvatarJob {
            avatar_id,
            owner_id: Uuid::new_v4(),
            max_attempts: 3,
        };
        let mut job = h.jobs.insert(&new).await.unwrap();
        job.attempts = 2;
        h.jobs.put(job.clone());

        h.scheduler.admit_pending().await.unwrap();

        let job = h.jobs.job(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 3);
        assert_eq!(
            job.error_message.as_deref(),
            Some("Max attempts reached. Last error: boom")
        );
        let avatar = h.avatars.avatar(avatar_id).unwrap();
        assert_eq!(avatar.error_message.as_deref(), job.error_message.as_deref());
        assert_eq!(h.notifier.failed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn admission_count_excludes_jobs_failed_before_dispatch() {
        let h = harness(ModePreference::Cli, vec![], vec![], 3);

        // This avatar lost its source, so its job fails without starting.
        let mut orphaned = sample_avatar(Uuid::new_v4(), Uuid::new_v4());
        orphaned.source_video_key = None;
        let orphaned_id = orphaned.id;
        h.avatars.put(orphaned);
        h.jobs
            .insert(&NewAvatarJob {
                avatar_id: orphaned_id,
                owner_id: Uuid::new_v4(),
                max_attempts: 3,
            })
            .await
            .unwrap();

        let avatar_id = seed_avatar(&h);
        h.jobs
            .insert(&NewAvatarJob {
                avatar_id,
                owner_id: Uuid::new_v4(),
                max_attempts: 3,
            })
            .await
            .unwrap();

        let started = h.scheduler.admit_pending().await.unwrap();
        assert_eq!(started, 1);

        let status = h.scheduler.queue_status().await.unwrap();
        assert_eq!(status.running, 1);
    }

    #[tokio::test]
    async fn missing_source_video_fails_without_consuming_attempts() {
        let h = harness(ModePreference::Cli, vec![], vec![], 3);
        let mut avatar = sample_avatar(Uuid::new_v4(), Uuid::new_v4());
        avatar.source_video_key = None;
        let avatar_id = avatar.id;
        h.avatars.put(avatar);
        let new = NewAvatarJob {
            avatar_id,
            owner_id: Uuid::new_v4(),
            max_attempts: 3,
        };
        let job = h.jobs.insert(&new).await.unwrap();

        h.scheduler.admit_pending().await.unwrap();

        let job = h.jobs.job(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn retry_resets_attempt_budget() {
        // Ceiling 0 keeps the retried job pending so the reset is visible.
        let h = harness(ModePreference::Cli, vec![], vec![], 0);
        let avatar_id = seed_avatar(&h);
        let new = NewAvatarJob {
            avatar_id,
            owner_id: Uuid::new_v4(),
            max_attempts: 3,
        };
        let mut job = h.jobs.insert(&new).await.unwrap();
        job.status = JobStatus::Failed;
        job.attempts = 3;
        job.error_message = Some("Max attempts reached. Last error: boom".to_string());
        h.jobs.put(job.clone());

        let retried = h.scheduler.retry_job(job.id).await.unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.attempts, 0);
        assert!(retried.error_message.is_none());

        let avatar = h.avatars.avatar(avatar_id).unwrap();
        assert_eq!(avatar.progress_percent, 0);
    }

    #[tokio::test]
    async fn retry_of_active_job_is_not_found() {
        let h = harness(ModePreference::Cli, vec![], vec![], 3);
        let avatar_id = seed_avatar(&h);
        let job = h.scheduler.create_job(avatar_id).await.unwrap();

        let err = h.scheduler.retry_job(job.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
