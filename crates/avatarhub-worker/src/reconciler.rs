//! Background reconciler for detached pipeline runs.
//!
//! Runs on a fixed interval: inspects every processing job that tracks a
//! detached process, settles finished runs, refreshes training progress
//! for live ones, and then admits pending jobs into freed slots. Because
//! pid and log path live on the job row, the loop also settles runs that
//! were dispatched before an orchestrator restart.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use avatarhub_core::progress;
use avatarhub_core::result::AppResult;
use avatarhub_entity::avatar::status::ProcessingStage;
use avatarhub_entity::avatar::store::AvatarStore;
use avatarhub_entity::job::model::AvatarJob;
use avatarhub_entity::job::store::JobStore;

use avatarhub_core::config::worker::WorkerConfig;

use crate::cli::{CliExecutor, GenerationVerdict};
use crate::executor::ExecutionOutcome;
use crate::scheduler::JobScheduler;
use crate::selector::ExecutionMode;

/// The reconciliation loop.
pub struct Reconciler {
    scheduler: Arc<JobScheduler>,
    jobs: Arc<dyn JobStore>,
    avatars: Arc<dyn AvatarStore>,
    cli: Arc<CliExecutor>,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
}

impl Reconciler {
    pub fn new(
        scheduler: Arc<JobScheduler>,
        jobs: Arc<dyn JobStore>,
        avatars: Arc<dyn AvatarStore>,
        cli: Arc<CliExecutor>,
        config: WorkerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            scheduler,
            jobs,
            avatars,
            cli,
            config,
            shutdown,
        }
    }

    /// Run until shutdown is signalled.
    pub async fn run(mut self) {
        info!(
            interval_seconds = self.config.check_interval_seconds,
            "Reconciler starting"
        );

        let initial_delay = Duration::from_secs(self.config.initial_delay_seconds);
        tokio::select! {
            _ = tokio::time::sleep(initial_delay) => {}
            _ = self.shutdown.changed() => {
                info!("Reconciler stopped before first tick");
                return;
            }
        }

        let interval = Duration::from_secs(self.config.check_interval_seconds);
        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "Reconciliation tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown.changed() => {
                    info!("Reconciler shutting down");
                    return;
                }
            }
        }
    }

    /// One reconciliation pass: settle tracked runs, then fill free slots.
    pub async fn tick(&self) -> AppResult<()> {
        let tracked = self.jobs.find_processing_with_pid().await?;
        for job in tracked {
            if let Err(e) = self.reconcile_job(&job).await {
                error!(job_id = %job.id, error = %e, "Failed to reconcile job");
            }
        }

        let started = self.scheduler.admit_pending().await?;
        if started > 0 {
            debug!(started, "Admitted pending jobs");
        }
        Ok(())
    }

    async fn reconcile_job(&self, job: &AvatarJob) -> AppResult<()> {
        let log_path = job.output_log_path.as_deref().map(Path::new);
        let verdict = self.cli.check_result(job.process_id, log_path, job.avatar_id);

        match verdict {
            GenerationVerdict::Running => {
                if self.run_expired(job) {
                    return self.reap_hung_run(job).await;
                }
                self.refresh_training_progress(job).await;
                Ok(())
            }
            GenerationVerdict::Succeeded { frame_count } => {
                info!(job_id = %job.id, frame_count, "Detached run finished, finalizing");
                match self.cli.finalize(job).await {
                    ExecutionOutcome::Completed { result_key, .. } => {
                        self.scheduler
                            .complete_job(job, &result_key, None, ExecutionMode::Cli)
                            .await
                    }
                    ExecutionOutcome::Failed { message, .. } => {
                        warn!(job_id = %job.id, error = %message, "Finalization failed");
                        self.scheduler.fail_attempt(job, &message).await
                    }
                    ExecutionOutcome::Dispatched { .. } => Ok(()),
                }
            }
            GenerationVerdict::Failed { message } => {
                warn!(job_id = %job.id, error = %message, "Detached run failed");
                self.cli.cleanup_job_files(job).await;
                self.scheduler.fail_attempt(job, &message).await
            }
        }
    }

    /// True when a live run has outlasted its configured lifetime ceiling.
    fn run_expired(&self, job: &AvatarJob) -> bool {
        let Some(started_at) = job.started_at else {
            return false;
        };
        let elapsed = (Utc::now() - started_at).num_seconds();
        elapsed >= self.cli.run_timeout().as_secs() as i64
    }

    /// Kill a hung run and account the attempt as a retryable timeout.
    async fn reap_hung_run(&self, job: &AvatarJob) -> AppResult<()> {
        let ceiling = self.cli.run_timeout().as_secs();
        warn!(job_id = %job.id, ceiling_seconds = ceiling, "Detached run exceeded its time ceiling, killing");

        if let Some(pid) = job.process_id {
            self.cli.kill_detached(pid);
        }
        self.cli.cleanup_job_files(job).await;
        self.scheduler
            .fail_attempt(job, &format!("timeout: generation run exceeded {ceiling}s ceiling"))
            .await
    }

    /// Move the avatar's training progress along the asymptotic curve.
    async fn refresh_training_progress(&self, job: &AvatarJob) {
        let Some(started_at) = job.started_at else {
            return;
        };
        let elapsed = (Utc::now() - started_at).num_seconds() as f64;
        let expected = self.cli.expected_training_duration().as_secs() as f64;
        let percent = progress::estimate_training_progress(elapsed, expected);

        debug!(job_id = %job.id, percent, "Updating training progress");
        if let Err(e) = self
            .avatars
            .update_progress(job.avatar_id, ProcessingStage::Training, percent)
            .await
        {
            warn!(job_id = %job.id, error = %e, "Failed to update training progress");
        }
    }
}
