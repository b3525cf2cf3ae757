//! Avatar resource entity.

pub mod model;
pub mod status;
pub mod store;
