//! Object storage trait for source videos and avatar archives.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;

/// Trait for the object store holding source videos and generated avatar
/// archives.
///
/// The trait is defined here in `avatarhub-core` and implemented in
/// `avatarhub-storage`; the worker crate only sees the seam so tests can
/// substitute a double.
#[async_trait]
pub trait ObjectStorage: Send + Sync + std::fmt::Debug + 'static {
    /// Name of the backing bucket.
    fn bucket(&self) -> &str;

    /// Upload a local file to the given object key.
    async fn upload_file(&self, local_path: &Path, key: &str, content_type: &str)
    -> AppResult<()>;

    /// Download an object to a local file.
    async fn download_file(&self, key: &str, dest_path: &Path) -> AppResult<()>;

    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Generate a presigned GET URL for an object.
    async fn presign_download(&self, key: &str, expires_in: Duration) -> AppResult<String>;
}
