//! # avatarhub-entity
//!
//! Domain entities for AvatarHub: generation jobs and the avatar resources
//! they act on, plus the store traits the database crate implements.

pub mod avatar;
pub mod job;
