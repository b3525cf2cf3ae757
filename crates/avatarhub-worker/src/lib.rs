//! # avatarhub-worker
//!
//! The avatar generation job subsystem: admission-controlled scheduling,
//! execution mode selection, the CLI and remote execution backends, and the
//! background reconciler that tracks detached pipeline runs.

pub mod cli;
pub mod executor;
pub mod notify;
pub mod reconciler;
pub mod remote;
pub mod scheduler;
pub mod selector;

#[cfg(test)]
pub(crate) mod testing;
