//! Progress estimation for avatar generation.
//!
//! Progress is reported as a single 0..=100 percentage split into stage
//! bands:
//!
//! - 0-10%:   uploading the source video
//! - 10-20%:  preparing (downloading, setting up for processing)
//! - 20-80%:  training (asymptotic, never reaches 80% on its own)
//! - 80-100%: finalizing (packaging and uploading results); 100% is set
//!   only on completion

/// Start of the uploading band.
pub const UPLOAD_START: i32 = 0;
/// End of the uploading band.
pub const UPLOAD_END: i32 = 10;
/// Start of the preparing band.
pub const PREPARE_START: i32 = 10;
/// End of the preparing band.
pub const PREPARE_END: i32 = 20;
/// Start of the training band.
pub const TRAINING_START: i32 = 20;
/// Nominal end of the training band. The estimator never reports this.
pub const TRAINING_END: i32 = 80;
/// Hard cap for estimated training progress.
pub const TRAINING_CAP: i32 = TRAINING_END - 2;
/// Start of the finalizing band.
pub const FINALIZE_START: i32 = 80;
/// End of the finalizing band.
pub const FINALIZE_END: i32 = 100;

/// Estimate training progress from elapsed wall-clock time.
///
/// Asymptotic formula `start + floor(range * (1 - e^(-elapsed/expected)))`,
/// clamped to [`TRAINING_CAP`]. Moves quickly at first, then slows down, so
/// progress keeps advancing on long runs without ever claiming completion.
/// At `elapsed == expected` the estimate sits at roughly 63% of the range.
pub fn estimate_training_progress(elapsed_seconds: f64, expected_seconds: f64) -> i32 {
    if elapsed_seconds <= 0.0 || expected_seconds <= 0.0 {
        return TRAINING_START;
    }

    let normalized = 1.0 - (-elapsed_seconds / expected_seconds).exp();
    let range = (TRAINING_CAP - TRAINING_START) as f64;
    let progress = TRAINING_START + (range * normalized) as i32;

    progress.min(TRAINING_CAP)
}

/// Map sub-progress (0-100 within a stage) onto a stage band.
///
/// The upper bound is exclusive of the band end so that a band never claims
/// the next stage's starting value (finalizing sub-progress 100 maps to 99,
/// not 100).
pub fn band_progress(band_start: i32, band_end: i32, sub_percent: i32) -> i32 {
    let sub = sub_percent.clamp(0, 100);
    band_start + ((band_end - 1 - band_start) * sub) / 100
}

/// Expected generation duration for speech-driven work, from word count.
///
/// 240 seconds covers the first 200 words; each additional 100 words adds
/// 30 seconds.
pub fn expected_generation_seconds(word_count: usize) -> f64 {
    let base = 240.0;
    if word_count > 200 {
        base + ((word_count - 200) as f64 / 100.0) * 30.0
    } else {
        base
    }
}
