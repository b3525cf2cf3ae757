//! Local generation pipeline configuration.

use serde::{Deserialize, Serialize};

/// Settings for the local CLI avatar generation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory of the pipeline installation. The generation script
    /// writes avatars under `<root>/data/avatars/<avatar_id>`.
    pub root_dir: String,
    /// Python interpreter used to run the generation script (the pipeline
    /// virtualenv's `bin/python`).
    pub python_bin: String,
    /// Generation script path, relative to `root_dir`.
    #[serde(default = "default_script")]
    pub script: String,
    /// Directory for per-job scratch files (downloaded sources, logs).
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,
    /// Face crop size: 96 or 256.
    #[serde(default = "default_img_size")]
    pub img_size: u32,
    /// Face padding "top bottom left right".
    #[serde(default = "default_pads")]
    pub pads: String,
    /// Face detection batch size.
    #[serde(default = "default_face_det_batch_size")]
    pub face_det_batch_size: u32,
    /// Maximum frames to extract from the source video.
    #[serde(default = "default_max_frames")]
    pub max_frames: u32,
    /// Expected training duration in seconds, used to scale the asymptotic
    /// progress estimator.
    #[serde(default = "default_expected_training_seconds")]
    pub expected_training_seconds: u64,
    /// Hard ceiling on a detached run's lifetime in seconds. Runs still
    /// alive past this are killed by the reconciler and the attempt fails.
    #[serde(default = "default_run_timeout_seconds")]
    pub run_timeout_seconds: u64,
}

fn default_script() -> String {
    "wav2lip/genavatar.py".to_string()
}

fn default_scratch_dir() -> String {
    "/tmp/avatar_jobs".to_string()
}

fn default_img_size() -> u32 {
    256
}

fn default_pads() -> String {
    "0 10 0 0".to_string()
}

fn default_face_det_batch_size() -> u32 {
    16
}

fn default_max_frames() -> u32 {
    1000
}

fn default_expected_training_seconds() -> u64 {
    300
}

fn default_run_timeout_seconds() -> u64 {
    1800
}
