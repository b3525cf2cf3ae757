//! # avatarhub-storage
//!
//! S3 implementation of the [`ObjectStorage`] trait from `avatarhub-core`.
//!
//! [`ObjectStorage`]: avatarhub_core::traits::storage::ObjectStorage

pub mod s3;

pub use s3::S3Storage;
