//! S3 object storage provider.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use tokio::io::AsyncWriteExt;
use tracing::info;

use avatarhub_core::config::storage::StorageConfig;
use avatarhub_core::error::AppError;
use avatarhub_core::result::AppResult;
use avatarhub_core::traits::storage::ObjectStorage;

/// S3-backed object storage for source videos and avatar archives.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3 storage provider from configuration.
    ///
    /// Credentials come from the SDK's default provider chain. A custom
    /// `endpoint` switches to path-style addressing for S3-compatible
    /// stores.
    pub async fn new(config: &StorageConfig) -> AppResult<Self> {
        info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            "Initializing S3 storage"
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> AppResult<()> {
        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            AppError::storage(format!(
                "Failed to read '{}' for upload: {e}",
                local_path.display()
            ))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::storage(format!("Failed to upload '{key}': {e}")))?;

        info!(key, "Uploaded object to S3");
        Ok(())
    }

    async fn download_file(&self, key: &str, dest_path: &Path) -> AppResult<()> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::storage(format!("Failed to download '{key}': {e}")))?;

        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(dest_path).await?;
        let mut body = resp.body;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| AppError::storage(format!("Failed streaming '{key}': {e}")))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        info!(key, dest = %dest_path.display(), "Downloaded object from S3");
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(AppError::storage(format!(
                        "Failed to check '{key}': {service_err}"
                    )))
                }
            }
        }
    }

    async fn presign_download(&self, key: &str, expires_in: Duration) -> AppResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| AppError::storage(format!("Invalid presign expiry: {e}")))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| AppError::storage(format!("Failed to presign '{key}': {e}")))?;

        Ok(presigned.uri().to_string())
    }
}
