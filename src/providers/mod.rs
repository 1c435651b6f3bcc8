//! Object storage backends and the snapshot reader built on top of them.

pub mod local;
pub mod reader;
pub mod s3;

use crate::core::error::Result;
use async_trait::async_trait;

/// Storage listing interface over a bucketed object store.
///
/// Listing a prefix with no objects yields an empty list; a failure to reach
/// the store is an error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    /// Fetches an object. `Ok(None)` when the key does not exist.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;
}

pub use local::LocalObjectStore;
pub use reader::{ProviderBatch, SnapshotReader};
pub use s3::S3HttpStore;
