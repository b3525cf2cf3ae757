//! Object storage configuration.

use serde::{Deserialize, Serialize};

/// S3 object storage configuration.
///
/// Credentials are resolved by the AWS SDK's default provider chain
/// (environment, shared config, instance metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket holding source videos and avatar archives.
    pub bucket: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL for S3-compatible stores (MinIO etc.).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Lifetime of presigned source-video URLs handed to the remote
    /// backend, in seconds.
    #[serde(default = "default_presign_ttl")]
    pub presign_ttl_seconds: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_presign_ttl() -> u64 {
    7200
}
