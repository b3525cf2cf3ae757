//! Remote serverless GPU execution backend.
//!
//! Runs generation synchronously against the remote endpoint's `/runsync`
//! route: the source video is presigned for the remote workers, the call
//! blocks until the run finishes, and the endpoint uploads the resulting
//! archive directly to object storage under the job's result key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use avatarhub_core::config::remote::RemoteConfig;
use avatarhub_core::traits::storage::ObjectStorage;
use avatarhub_entity::avatar::model::Avatar;
use avatarhub_entity::job::model::AvatarJob;

use crate::executor::{truncate_error, AvatarExecutor, ExecutionOutcome, FailureKind};
use crate::selector::{CapacityProbe, ExecutionMode};

/// Client for the remote avatar generation endpoint.
pub struct RemoteAvatarClient {
    http: reqwest::Client,
    config: RemoteConfig,
    presign_ttl: Duration,
    storage: Arc<dyn ObjectStorage>,
}

impl RemoteAvatarClient {
    /// Create a client. `presign_ttl` must outlive the longest expected
    /// remote run so the download URL stays valid.
    pub fn new(
        config: RemoteConfig,
        presign_ttl: Duration,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            presign_ttl,
            storage,
        }
    }

    fn run_url(&self) -> String {
        format!("{}/runsync", self.config.base_url.trim_end_matches('/'))
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl AvatarExecutor for RemoteAvatarClient {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Api
    }

    async fn execute(&self, job: &AvatarJob, avatar: &Avatar) -> ExecutionOutcome {
        let Some(source_key) = avatar.source_video_key.as_deref() else {
            return ExecutionOutcome::Failed {
                kind: FailureKind::Backend,
                message: "Avatar has no source video".to_string(),
            };
        };

        let video_url = match self.storage.presign_download(source_key, self.presign_ttl).await {
            Ok(url) => url,
            Err(e) => {
                return ExecutionOutcome::Failed {
                    kind: FailureKind::Io,
                    message: truncate_error(&e.to_string()),
                };
            }
        };

        let s3_prefix = format!("avatars/{}", job.owner_id);
        let result_key = format!("{s3_prefix}/{}.tar", job.avatar_id);
        let payload = json!({
            "input": {
                "video_url": video_url,
                "avatar_id": job.avatar_id.to_string(),
                "model": "wav2lip",
                "s3_bucket": self.storage.bucket(),
                "s3_prefix": s3_prefix,
            }
        });

        info!(job_id = %job.id, avatar_id = %job.avatar_id, "Dispatching remote generation run");

        let response = self
            .http
            .post(self.run_url())
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_secs(self.config.run_timeout_seconds))
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return ExecutionOutcome::Failed {
                    kind: FailureKind::Timeout,
                    message: format!(
                        "Remote run exceeded {} seconds",
                        self.config.run_timeout_seconds
                    ),
                };
            }
            Err(e) => {
                return ExecutionOutcome::Failed {
                    kind: FailureKind::Backend,
                    message: truncate_error(&format!("Remote request failed: {e}")),
                };
            }
        };

        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        interpret_run_response(status, &body, &result_key)
    }
}

#[async_trait]
impl CapacityProbe for RemoteAvatarClient {
    async fn has_capacity(&self) -> bool {
        if !self.config.is_configured() {
            return false;
        }

        let response = self
            .http
            .get(self.health_url())
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_secs(self.config.probe_timeout_seconds))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                let body = response.json::<Value>().await.unwrap_or(Value::Null);
                let ready = body["workers"]["ready"].as_i64().unwrap_or(0);
                let idle = body["workers"]["idle"].as_i64().unwrap_or(0);
                ready > 0 || idle > 0
            }
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Remote health probe rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "Remote health probe failed");
                false
            }
        }
    }
}

/// Interpret a `/runsync` response envelope.
///
/// Failure can be reported at three layers: the HTTP status, the top-level
/// run status, or the handler's own output status. A successful run must
/// carry an upload URL or it is treated as failed.
pub fn interpret_run_response(status: u16, body: &Value, result_key: &str) -> ExecutionOutcome {
    if !(200..300).contains(&status) {
        let detail = body["error"]
            .as_str()
            .map(|e| format!(": {e}"))
            .unwrap_or_default();
        return ExecutionOutcome::Failed {
            kind: FailureKind::Backend,
            message: truncate_error(&format!("Remote endpoint returned status {status}{detail}")),
        };
    }

    let remote_job_ref = body["id"].as_str().map(str::to_string);

    if body["status"].as_str() == Some("FAILED") {
        let error = body["error"].as_str().unwrap_or("Remote run failed");
        return ExecutionOutcome::Failed {
            kind: FailureKind::Backend,
            message: truncate_error(error),
        };
    }

    let output = &body["output"];
    if output["status"].as_str() == Some("error") {
        let error = output["error"].as_str().unwrap_or("Remote handler reported an error");
        return ExecutionOutcome::Failed {
            kind: FailureKind::Backend,
            message: truncate_error(error),
        };
    }

    if output["upload_url"].as_str().is_none() {
        return ExecutionOutcome::Failed {
            kind: FailureKind::Backend,
            message: "Remote run returned no upload URL".to_string(),
        };
    }

    ExecutionOutcome::Completed {
        result_key: result_key.to_string(),
        remote_job_ref,
        frame_count: output["num_frames"].as_i64(),
    }
}
