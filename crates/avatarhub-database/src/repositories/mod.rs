//! Repository implementations of the entity store traits.

pub mod avatar;
pub mod job;
