//! Execution backend seam and the outcome taxonomy shared by both
//! backends.

use async_trait::async_trait;

use avatarhub_entity::avatar::model::Avatar;
use avatarhub_entity::job::model::AvatarJob;

use crate::selector::ExecutionMode;

/// Maximum length of error messages stored on jobs and avatars.
pub const MAX_ERROR_LEN: usize = 500;

/// Why an execution attempt failed. All failure kinds are retryable while
/// the attempt budget lasts; permanent failures (missing resource, no
/// source video) are decided by the scheduler before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The backend rejected or could not finish the run.
    Backend,
    /// The run exceeded its time budget.
    Timeout,
    /// A local I/O problem (spawn, download, packaging).
    Io,
}

impl FailureKind {
    /// Lowercase tag used in stored error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Timeout => "timeout",
            Self::Io => "io",
        }
    }
}

/// Result of handing a job to an execution backend.
///
/// The two backends differ in dispatch style and that difference is data
/// here, not control flow: the CLI path reports `Dispatched` and leaves
/// completion to the reconciler, while the remote path blocks and reports
/// `Completed` or `Failed` directly.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// A detached process was spawned; completion will be observed later.
    Dispatched {
        /// Process id of the detached pipeline run.
        pid: i64,
        /// Log file capturing the process's stdout and stderr.
        log_path: String,
    },
    /// The run finished successfully.
    Completed {
        /// Storage key of the produced avatar archive.
        result_key: String,
        /// Backend job reference, for remote runs.
        remote_job_ref: Option<String>,
        /// Number of face frames extracted, when reported.
        frame_count: Option<i64>,
    },
    /// The run failed; the scheduler decides between requeue and terminal
    /// failure based on the attempt budget.
    Failed {
        /// Failure classification.
        kind: FailureKind,
        /// Diagnostic message (truncated before storage).
        message: String,
    },
}

/// An avatar generation execution backend.
#[async_trait]
pub trait AvatarExecutor: Send + Sync + 'static {
    /// Which mode this backend implements.
    fn mode(&self) -> ExecutionMode;

    /// Run (or dispatch) generation for the given job.
    ///
    /// Job-level failures are reported through the outcome, never as an
    /// error.
    async fn execute(&self, job: &AvatarJob, avatar: &Avatar) -> ExecutionOutcome;
}

/// Truncate an error message for storage.
pub fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_LEN).collect()
}
