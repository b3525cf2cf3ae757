//! Avatar generation job entity.

pub mod model;
pub mod status;
pub mod store;
