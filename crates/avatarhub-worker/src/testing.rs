//! In-memory test doubles shared by the worker crate's unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use avatarhub_core::result::AppResult;
use avatarhub_core::traits::notify::JobNotifier;
use avatarhub_core::traits::storage::ObjectStorage;
use avatarhub_core::AppError;
use avatarhub_entity::avatar::model::Avatar;
use avatarhub_entity::avatar::status::{AvatarStatus, ProcessingStage};
use avatarhub_entity::avatar::store::AvatarStore;
use avatarhub_entity::job::model::{AvatarJob, NewAvatarJob};
use avatarhub_entity::job::status::JobStatus;
use avatarhub_entity::job::store::JobStore;

/// Storage double that accepts everything and stores nothing.
#[derive(Debug, Default)]
pub struct NullStorage;

#[async_trait]
impl ObjectStorage for NullStorage {
    fn bucket(&self) -> &str {
        "test-bucket"
    }

    async fn upload_file(
        &self,
        _local_path: &Path,
        _key: &str,
        _content_type: &str,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn download_file(&self, _key: &str, dest_path: &Path) -> AppResult<()> {
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest_path, b"video")?;
        Ok(())
    }

    async fn exists(&self, _key: &str) -> AppResult<bool> {
        Ok(true)
    }

    async fn presign_download(&self, key: &str, _expires_in: Duration) -> AppResult<String> {
        Ok(format!("https://storage.test/{key}"))
    }
}

/// Avatar store double that ignores every write.
#[derive(Debug, Default)]
pub struct NullAvatarStore;

#[async_trait]
impl AvatarStore for NullAvatarStore {
    async fn find_by_id(&self, _id: Uuid) -> AppResult<Option<Avatar>> {
        Ok(None)
    }

    async fn begin_processing(&self, _id: Uuid) -> AppResult<()> {
        Ok(())
    }

    async fn update_progress(
        &self,
        _id: Uuid,
        _stage: ProcessingStage,
        _percent: i32,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn complete(&self, _id: Uuid, _result_key: &str, _execution_mode: &str) -> AppResult<()> {
        Ok(())
    }

    async fn fail(&self, _id: Uuid, _error_message: &str) -> AppResult<()> {
        Ok(())
    }

    async fn reset_pending(&self, _id: Uuid) -> AppResult<()> {
        Ok(())
    }
}

/// In-memory job store mirroring the PostgreSQL repository's transition
/// guards, including the one-active-job-per-avatar constraint.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<Uuid, AvatarJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(&self, id: Uuid) -> Option<AvatarJob> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn put(&self, job: AvatarJob) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, new: &NewAvatarJob) -> AppResult<AvatarJob> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs
            .values()
            .any(|j| j.avatar_id == new.avatar_id && j.status.is_active())
        {
            return Err(AppError::conflict(
                "An active job already exists for this avatar",
            ));
        }
        let now = Utc::now();
        let job = AvatarJob {
            id: Uuid::new_v4(),
            avatar_id: new.avatar_id,
            owner_id: new.owner_id,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: new.max_attempts,
            error_message: None,
            remote_job_ref: None,
            result_key: None,
            process_id: None,
            output_log_path: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        };
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<AvatarJob>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn find_active_for_avatar(&self, avatar_id: Uuid) -> AppResult<Option<AvatarJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .find(|j| j.avatar_id == avatar_id && j.status.is_active())
            .cloned())
    }

    async fn find_pending(&self, limit: i64) -> AppResult<Vec<AvatarJob>> {
        let jobs = self.jobs.lock().unwrap();
        let mut pending: Vec<AvatarJob> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|j| j.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn find_processing_with_pid(&self) -> AppResult<Vec<AvatarJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.status == JobStatus::Processing && j.process_id.is_some())
            .cloned()
            .collect())
    }

    async fn count_with_status(&self, status: JobStatus) -> AppResult<i64> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.status == status)
            .count() as i64)
    }

    async fn count_finished_since(
        &self,
        status: JobStatus,
        since: DateTime<Utc>,
    ) -> AppResult<i64> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.status == status && j.completed_at.is_some_and(|at| at >= since))
            .count() as i64)
    }

    async fn begin_attempt(&self, id: Uuid) -> AppResult<Option<AvatarJob>> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&id).filter(|j| j.status == JobStatus::Pending) else {
            return Ok(None);
        };
        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.started_at = Some(Utc::now());
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn record_dispatch(&self, id: Uuid, pid: i64, log_path: &str) -> AppResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            job.process_id = Some(pid);
            job.output_log_path = Some(log_path.to_string());
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn requeue(&self, id: Uuid, error_message: &str) -> AppResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id).filter(|j| j.status == JobStatus::Processing) {
            job.status = JobStatus::Pending;
            job.error_message = Some(error_message.to_string());
            job.process_id = None;
            job.output_log_path = None;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        result_key: &str,
        remote_job_ref: Option<&str>,
    ) -> AppResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            job.status = JobStatus::Completed;
            job.result_key = Some(result_key.to_string());
            if let Some(job_ref) = remote_job_ref {
                job.remote_job_ref = Some(job_ref.to_string());
            }
            job.error_message = None;
            job.process_id = None;
            job.output_log_path = None;
            job.completed_at = Some(Utc::now());
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, error_message: &str) -> AppResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            job.status = JobStatus::Failed;
            job.error_message = Some(error_message.to_string());
            job.process_id = None;
            job.output_log_path = None;
            job.completed_at = Some(Utc::now());
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reset_for_retry(&self, id: Uuid) -> AppResult<Option<AvatarJob>> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&id).filter(|j| j.status == JobStatus::Failed) else {
            return Ok(None);
        };
        job.status = JobStatus::Pending;
        job.attempts = 0;
        job.error_message = None;
        job.started_at = None;
        job.completed_at = None;
        job.remote_job_ref = None;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }
}

/// In-memory avatar store.
#[derive(Debug, Default)]
pub struct InMemoryAvatarStore {
    avatars: Mutex<HashMap<Uuid, Avatar>>,
}

impl InMemoryAvatarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn avatar(&self, id: Uuid) -> Option<Avatar> {
        self.avatars.lock().unwrap().get(&id).cloned()
    }

    pub fn put(&self, avatar: Avatar) {
        self.avatars.lock().unwrap().insert(avatar.id, avatar);
    }
}

/// Build a pending avatar with a source video, for tests.
pub fn sample_avatar(id: Uuid, owner_id: Uuid) -> Avatar {
    let now = Utc::now();
    Avatar {
        id,
        owner_id,
        name: "test avatar".to_string(),
        source_video_key: Some(format!("sources/{owner_id}/{id}.mp4")),
        local_video_path: None,
        result_key: None,
        execution_mode: None,
        status: AvatarStatus::Pending,
        progress_percent: 0,
        stage: ProcessingStage::Pending,
        error_message: None,
        processing_started_at: None,
        processing_completed_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl AvatarStore for InMemoryAvatarStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Avatar>> {
        Ok(self.avatars.lock().unwrap().get(&id).cloned())
    }

    async fn begin_processing(&self, id: Uuid) -> AppResult<()> {
        let mut avatars = self.avatars.lock().unwrap();
        if let Some(avatar) = avatars.get_mut(&id) {
            avatar.status = AvatarStatus::Processing;
            avatar.stage = ProcessingStage::Preparing;
            avatar.progress_percent = avatarhub_core::progress::PREPARE_START;
            avatar.processing_started_at = Some(Utc::now());
            avatar.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_progress(
        &self,
        id: Uuid,
        stage: ProcessingStage,
        percent: i32,
    ) -> AppResult<()> {
        let mut avatars = self.avatars.lock().unwrap();
        if let Some(avatar) = avatars.get_mut(&id) {
            avatar.stage = stage;
            avatar.progress_percent = percent;
            avatar.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete(&self, id: Uuid, result_key: &str, execution_mode: &str) -> AppResult<()> {
        let mut avatars = self.avatars.lock().unwrap();
        if let Some(avatar) = avatars.get_mut(&id) {
            avatar.status = AvatarStatus::Completed;
            avatar.stage = ProcessingStage::Completed;
            avatar.progress_percent = 100;
            avatar.result_key = Some(result_key.to_string());
            avatar.execution_mode = Some(execution_mode.to_string());
            avatar.error_message = None;
            avatar.processing_completed_at = Some(Utc::now());
            avatar.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, error_message: &str) -> AppResult<()> {
        let mut avatars = self.avatars.lock().unwrap();
        if let Some(avatar) = avatars.get_mut(&id) {
            avatar.status = AvatarStatus::Failed;
            avatar.stage = ProcessingStage::Failed;
            avatar.error_message = Some(error_message.to_string());
            avatar.processing_completed_at = Some(Utc::now());
            avatar.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reset_pending(&self, id: Uuid) -> AppResult<()> {
        let mut avatars = self.avatars.lock().unwrap();
        if let Some(avatar) = avatars.get_mut(&id) {
            avatar.status = AvatarStatus::Pending;
            avatar.stage = ProcessingStage::Pending;
            avatar.progress_percent = 0;
            avatar.error_message = None;
            avatar.processing_started_at = None;
            avatar.processing_completed_at = None;
            avatar.updated_at = Utc::now();
        }
        Ok(())
    }
}

/// Notifier double that counts terminal notifications.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub completed: Mutex<Vec<Uuid>>,
    pub failed: Mutex<Vec<(Uuid, String)>>,
}

#[async_trait]
impl JobNotifier for RecordingNotifier {
    async fn generation_completed(&self, owner_id: Uuid, _avatar_name: &str) {
        self.completed.lock().unwrap().push(owner_id);
    }

    async fn generation_failed(&self, owner_id: Uuid, _avatar_name: &str, error: &str) {
        self.failed.lock().unwrap().push((owner_id, error.to_string()));
    }
}
