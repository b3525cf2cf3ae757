//! Local CLI execution backend.
//!
//! Spawns the generation pipeline as a detached subprocess in its own
//! session, with stdout and stderr appended to a per-job log file. The
//! spawned process survives orchestrator restarts; the job row keeps the
//! pid and log path, and the reconciler owns completion detection.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use avatarhub_core::config::pipeline::PipelineConfig;
use avatarhub_core::progress;
use avatarhub_core::result::AppResult;
use avatarhub_core::traits::storage::ObjectStorage;
use avatarhub_core::AppError;
use avatarhub_entity::avatar::model::Avatar;
use avatarhub_entity::avatar::status::ProcessingStage;
use avatarhub_entity::avatar::store::AvatarStore;
use avatarhub_entity::job::model::AvatarJob;

use crate::executor::{truncate_error, AvatarExecutor, ExecutionOutcome, FailureKind};
use crate::selector::ExecutionMode;

/// Result line emitted by the generation script on its last line of output.
/// Advisory progress lines are also JSON but carry no `success` field.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineResult {
    /// Whether generation succeeded.
    pub success: bool,
    /// Error description on failure.
    #[serde(default)]
    pub error: Option<String>,
    /// Number of face frames extracted.
    #[serde(default)]
    pub frame_count: Option<i64>,
}

/// What the reconciler learned about a detached run.
#[derive(Debug, Clone)]
pub enum GenerationVerdict {
    /// The process is still running.
    Running,
    /// Generation finished and produced a usable avatar directory.
    Succeeded {
        /// Frames extracted, from the result line or an artifact scan.
        frame_count: i64,
    },
    /// Generation finished without a usable avatar.
    Failed {
        /// Diagnostic from the result line or the log tail.
        message: String,
    },
}

/// Executor that runs the local generation pipeline.
pub struct CliExecutor {
    storage: Arc<dyn ObjectStorage>,
    avatars: Arc<dyn AvatarStore>,
    config: PipelineConfig,
}

impl CliExecutor {
    /// Create a new CLI executor.
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        avatars: Arc<dyn AvatarStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            storage,
            avatars,
            config,
        }
    }

    /// Directory the pipeline writes the avatar into.
    pub fn avatar_dir(&self, avatar_id: Uuid) -> PathBuf {
        Path::new(&self.config.root_dir)
            .join("data/avatars")
            .join(avatar_id.to_string())
    }

    fn log_path(&self, job_id: Uuid) -> PathBuf {
        Path::new(&self.config.scratch_dir).join(format!("{job_id}.log"))
    }

    /// Best-effort progress mirror; a failed write must not fail the run.
    async fn report_progress(&self, avatar_id: Uuid, stage: ProcessingStage, percent: i32) {
        if let Err(e) = self.avatars.update_progress(avatar_id, stage, percent).await {
            warn!(%avatar_id, error = %e, "Failed to update avatar progress");
        }
    }

    /// Resolve the source video to a local path.
    ///
    /// Prefers the locally uploaded file when it still exists, re-uploading
    /// it to storage if the object went missing (recovers interrupted
    /// uploads). Otherwise downloads the object into the scratch directory
    /// as `{job_id}_source{ext}`.
    async fn resolve_input(&self, job: &AvatarJob, avatar: &Avatar) -> AppResult<PathBuf> {
        let source_key = avatar
            .source_video_key
            .as_deref()
            .ok_or_else(|| AppError::validation("Avatar has no source video"))?;

        if let Some(local) = avatar.local_video_path.as_deref() {
            let local = Path::new(local);
            if local.exists() {
                info!(path = %local.display(), "Using local source video");

                if !self.storage.exists(source_key).await.unwrap_or(true) {
                    info!(key = source_key, "Storage object missing, re-uploading local file");
                    self.report_progress(avatar.id, ProcessingStage::Preparing, 8)
                        .await;
                    if let Err(e) = self.storage.upload_file(local, source_key, "video/mp4").await
                    {
                        warn!(key = source_key, error = %e, "Source re-upload failed, continuing with local file");
                    }
                }

                self.report_progress(avatar.id, ProcessingStage::Preparing, 18)
                    .await;
                return Ok(local.to_path_buf());
            }
        }

        info!(key = source_key, "Local source missing, downloading from storage");
        self.report_progress(avatar.id, ProcessingStage::Preparing, 12)
            .await;

        let ext = Path::new(source_key)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let dest = Path::new(&self.config.scratch_dir).join(format!("{}_source.{ext}", job.id));

        tokio::fs::create_dir_all(&self.config.scratch_dir).await?;
        self.storage.download_file(source_key, &dest).await?;

        self.report_progress(avatar.id, ProcessingStage::Preparing, 18)
            .await;
        Ok(dest)
    }

    /// Spawn the generation script detached, in a fresh process group, with
    /// output appended to the job's log file.
    fn spawn_detached(&self, avatar_id: Uuid, video_path: &Path, log_path: &Path) -> AppResult<i64> {
        use std::os::unix::process::CommandExt;

        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let log_file = std::fs::File::create(log_path)?;
        let log_err = log_file.try_clone()?;

        let root = Path::new(&self.config.root_dir);
        let pythonpath = format!(
            "{}:{}",
            root.display(),
            root.join("wav2lip").display()
        );

        let mut command = std::process::Command::new(&self.config.python_bin);
        command
            .arg(&self.config.script)
            .arg("--avatar_id")
            .arg(avatar_id.to_string())
            .arg("--video_path")
            .arg(video_path)
            .arg("--img_size")
            .arg(self.config.img_size.to_string())
            .arg("--pads")
            .args(self.config.pads.split_whitespace())
            .arg("--face_det_batch_size")
            .arg(self.config.face_det_batch_size.to_string())
            .arg("--max_frames")
            .arg(self.config.max_frames.to_string())
            .current_dir(root)
            .env("PYTHONPATH", pythonpath)
            .stdin(Stdio::null())
            .stdout(log_file)
            .stderr(log_err)
            .process_group(0);

        let child = command.spawn()?;
        let pid = child.id() as i64;
        info!(pid, log = %log_path.display(), "Spawned detached generation process");
        Ok(pid)
    }

    /// Inspect a detached run: log verdict first (robust against pid
    /// reuse), then process liveness, then the artifact scan.
    pub fn check_result(
        &self,
        pid: Option<i64>,
        log_path: Option<&Path>,
        avatar_id: Uuid,
    ) -> GenerationVerdict {
        let log_content = log_path.and_then(|p| std::fs::read_to_string(p).ok());
        let result = log_content.as_deref().and_then(parse_result_line);

        if let Some(result) = &result {
            if !result.success {
                let message = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "Avatar generation failed".to_string());
                return GenerationVerdict::Failed {
                    message: truncate_error(&message),
                };
            }

            let avatar_dir = self.avatar_dir(avatar_id);
            if avatar_dir.exists() {
                let frame_count = result
                    .frame_count
                    .unwrap_or_else(|| count_face_frames(&avatar_dir));
                return GenerationVerdict::Succeeded { frame_count };
            }
            // Success claimed but no artifact yet; fall through to the
            // liveness check.
        }

        if pid.map(is_process_running).unwrap_or(false) {
            return GenerationVerdict::Running;
        }

        // Process gone without a verdict: trust the artifacts.
        let avatar_dir = self.avatar_dir(avatar_id);
        if avatar_dir.exists() {
            let frame_count = count_face_frames(&avatar_dir);
            if frame_count > 0 {
                return GenerationVerdict::Succeeded { frame_count };
            }
        }

        let message = log_content
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(log_tail)
            .unwrap_or_else(|| "Avatar generation failed - no frames generated".to_string());
        GenerationVerdict::Failed { message }
    }

    /// Package the generated avatar and upload it, then clean up scratch
    /// files. Returns the terminal outcome for the job.
    pub async fn finalize(&self, job: &AvatarJob) -> ExecutionOutcome {
        let avatar_id = job.avatar_id;
        let avatar_dir = self.avatar_dir(avatar_id);
        let result_key = format!("avatars/{}/{}.tar", job.owner_id, avatar_id);
        let frame_count = count_face_frames(&avatar_dir);

        let outcome = self.package_and_upload(&avatar_dir, avatar_id, &result_key).await;

        self.report_progress(
            avatar_id,
            ProcessingStage::Finalizing,
            progress::band_progress(progress::FINALIZE_START, progress::FINALIZE_END, 25),
        )
        .await;
        self.cleanup_job_files(job).await;

        match outcome {
            Ok(()) => ExecutionOutcome::Completed {
                result_key,
                remote_job_ref: None,
                frame_count: Some(frame_count),
            },
            Err(e) => ExecutionOutcome::Failed {
                kind: FailureKind::Io,
                message: truncate_error(&e.to_string()),
            },
        }
    }

    async fn package_and_upload(
        &self,
        avatar_dir: &Path,
        avatar_id: Uuid,
        result_key: &str,
    ) -> AppResult<()> {
        if !avatar_dir.exists() {
            return Err(AppError::storage(format!(
                "Avatar directory not found after generation: {}",
                avatar_dir.display()
            )));
        }

        let tar_path = avatar_dir.with_extension("tar");
        let archive_dir = avatar_dir.to_path_buf();
        let archive_tar = tar_path.clone();
        let arcname = avatar_id.to_string();

        // tar is synchronous; keep it off the runtime threads.
        tokio::task::spawn_blocking(move || -> AppResult<()> {
            let file = std::fs::File::create(&archive_tar)?;
            let mut builder = tar::Builder::new(file);
            builder.append_dir_all(&arcname, &archive_dir)?;
            builder.finish()?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::internal(format!("Archive task panicked: {e}")))??;

        let upload = self
            .storage
            .upload_file(&tar_path, result_key, "application/x-tar")
            .await;

        if let Err(e) = tokio::fs::remove_file(&tar_path).await {
            warn!(path = %tar_path.display(), error = %e, "Failed to remove avatar archive");
        }

        upload?;
        info!(key = result_key, "Uploaded avatar archive");
        Ok(())
    }

    /// Remove the job's log file and any downloaded source video.
    pub async fn cleanup_job_files(&self, job: &AvatarJob) {
        if let Some(log_path) = job.output_log_path.as_deref() {
            if let Err(e) = tokio::fs::remove_file(log_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = log_path, error = %e, "Failed to remove job log");
                }
            }
        }

        let scratch = Path::new(&self.config.scratch_dir);
        let prefix = format!("{}_source", job.id);
        if let Ok(mut entries) = tokio::fs::read_dir(scratch).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(&prefix)
                {
                    if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                        warn!(path = %entry.path().display(), error = %e, "Failed to remove source file");
                    }
                }
            }
        }
    }

    /// Expected training duration used by the progress estimator.
    pub fn expected_training_duration(&self) -> Duration {
        Duration::from_secs(self.config.expected_training_seconds)
    }

    /// Hard lifetime ceiling for a detached run.
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.config.run_timeout_seconds)
    }

    /// Kill a detached run. The run leads its own process group, so the
    /// negative pid reaches the script and any children it forked.
    pub fn kill_detached(&self, pid: i64) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let group = Pid::from_raw(-(pid as i32));
        match kill(group, Signal::SIGKILL) {
            Ok(()) => info!(pid, "Killed generation process group"),
            // Already gone.
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => warn!(pid, error = %e, "Failed to kill generation process group"),
        }
    }
}

#[async_trait]
impl AvatarExecutor for CliExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Cli
    }

    async fn execute(&self, job: &AvatarJob, avatar: &Avatar) -> ExecutionOutcome {
        let video_path = match self.resolve_input(job, avatar).await {
            Ok(path) => path,
            Err(e) => {
                return ExecutionOutcome::Failed {
                    kind: FailureKind::Io,
                    message: truncate_error(&e.to_string()),
                };
            }
        };

        self.report_progress(avatar.id, ProcessingStage::Training, progress::TRAINING_START)
            .await;

        let log_path = self.log_path(job.id);
        match self.spawn_detached(avatar.id, &video_path, &log_path) {
            Ok(pid) => ExecutionOutcome::Dispatched {
                pid,
                log_path: log_path.to_string_lossy().into_owned(),
            },
            Err(e) => ExecutionOutcome::Failed {
                kind: FailureKind::Io,
                message: truncate_error(&e.to_string()),
            },
        }
    }
}

/// Parse the last JSON result line from the process log. Progress lines
/// without a `success` field are skipped.
pub fn parse_result_line(content: &str) -> Option<PipelineResult> {
    content
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{') && line.ends_with('}'))
        .find_map(|line| serde_json::from_str::<PipelineResult>(line).ok())
}

/// Check whether a process is alive via `/proc`. A zombie counts as dead:
/// detached children are never waited on here, so a finished run lingers
/// in state Z until the orchestrator exits.
pub fn is_process_running(pid: i64) -> bool {
    if pid <= 0 {
        return false;
    }
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // The state field follows the parenthesised command name.
    let state = stat
        .rsplit(')')
        .next()
        .and_then(|rest| rest.trim_start().chars().next());
    !matches!(state, Some('Z') | Some('X') | None)
}

/// Count extracted face frames in an avatar directory.
pub fn count_face_frames(avatar_dir: &Path) -> i64 {
    let face_imgs = avatar_dir.join("face_imgs");
    match std::fs::read_dir(&face_imgs) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
            .count() as i64,
        Err(_) => 0,
    }
}

/// Last 500 characters of the log, as failure context.
fn log_tail(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let start = chars.len().saturating_sub(crate::executor::MAX_ERROR_LEN);
    chars[start..].iter().collect()
}
