//! # avatarhub-core
//!
//! Core crate for AvatarHub. Contains configuration schemas, the unified
//! error system, collaborator traits, and the progress estimation math.
//!
//! This crate has **no** internal dependencies on other AvatarHub crates.

pub mod config;
pub mod error;
pub mod progress;
pub mod result;
pub mod traits;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
