//! Object storage on the network volume.
//!
//! Bootstrap scripts go up and host keys come back down through an
//! S3-compatible bucket that mirrors the pod's network volume.

use async_trait::async_trait;

use crate::error::Result;

mod s3;

pub use s3::{s3_endpoint_for, S3Config, S3Gateway};

/// Bucket-scoped key/value object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `content` under `key`.
    ///
    /// # Errors
    /// `StorageWrite` on transport or auth failure. Not retried.
    async fn put(&self, key: &str, content: Vec<u8>) -> Result<()>;

    /// Download the object under `key`.
    ///
    /// # Errors
    /// `StorageRead` on any failure, including a missing key.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}
