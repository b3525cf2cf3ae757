//! # avatarhub-database
//!
//! PostgreSQL pool management, migrations, and repository implementations
//! of the entity store traits.

pub mod connection;
pub mod migration;
pub mod repositories;
