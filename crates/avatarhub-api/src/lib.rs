//! # avatarhub-api
//!
//! Internal HTTP surface for job control: job creation, queue status, job
//! inspection, and manual retry, all guarded by a shared API key.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod router;
pub mod state;
