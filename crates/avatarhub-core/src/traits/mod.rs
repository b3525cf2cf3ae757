//! Collaborator traits implemented by other AvatarHub crates.

pub mod notify;
pub mod storage;
