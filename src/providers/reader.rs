//! Loads a provider's raw extracts from its newest snapshot.
//!
//! A snapshot descriptor is a small JSON document listing the data files of
//! the snapshot:
//!
//! ```json
//! { "data_files": ["silver/frankfurter_rates/data/part-0.jsonl", "s3://other/part-1.jsonl"] }
//! ```
//!
//! Data files hold one raw extract per line.

use crate::core::config::ProviderConfig;
use crate::core::error::{RatesError, Result};
use crate::core::normalize::RawExtract;
use crate::core::resolver::{MetadataResolver, ResolveMode, SnapshotLocation, split_uri};
use crate::providers::ObjectStore;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct SnapshotDescriptor {
    #[serde(default)]
    data_files: Vec<String>,
}

/// Everything read for one provider. `location` is `None` when the table has
/// no snapshot yet, in which case `extracts` is empty.
#[derive(Debug, Clone)]
pub struct ProviderBatch {
    pub provider: ProviderConfig,
    pub location: Option<SnapshotLocation>,
    pub extracts: Vec<RawExtract>,
}

impl ProviderBatch {
    pub fn empty(provider: ProviderConfig) -> Self {
        Self {
            provider,
            location: None,
            extracts: Vec::new(),
        }
    }
}

pub struct SnapshotReader {
    resolver: Arc<MetadataResolver>,
    store: Arc<dyn ObjectStore>,
}

impl SnapshotReader {
    pub fn new(resolver: Arc<MetadataResolver>, store: Arc<dyn ObjectStore>) -> Self {
        Self { resolver, store }
    }

    pub async fn read_provider(&self, provider: &ProviderConfig) -> Result<ProviderBatch> {
        let Some(location) = self.resolver.resolve(&provider.table).await? else {
            warn!(provider = %provider.name, table = %provider.table, "No snapshot found, continuing with empty batch");
            return Ok(ProviderBatch::empty(provider.clone()));
        };

        if self.resolver.mode() == ResolveMode::Plan {
            debug!(provider = %provider.name, origin = %location.origin, "Plan run, nothing to read");
            return Ok(ProviderBatch {
                provider: provider.clone(),
                location: Some(location),
                extracts: Vec::new(),
            });
        }

        let (bucket, key) = location.bucket_and_key()?;
        let descriptor: SnapshotDescriptor = self.fetch_json(bucket, key).await?;

        let mut extracts = Vec::new();
        for file in &descriptor.data_files {
            let (file_bucket, file_key) = if file.starts_with("s3://") {
                split_uri(file)?
            } else {
                (bucket, file.as_str())
            };
            let rows = self.fetch_lines(file_bucket, file_key).await?;
            debug!(file = %file, rows = rows.len(), "Read data file");
            extracts.extend(rows);
        }

        info!(
            provider = %provider.name,
            files = descriptor.data_files.len(),
            rows = extracts.len(),
            "Loaded snapshot"
        );
        Ok(ProviderBatch {
            provider: provider.clone(),
            location: Some(location),
            extracts,
        })
    }

    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.store
            .get(bucket, key)
            .await?
            .ok_or_else(|| RatesError::MissingObject(format!("s3://{bucket}/{key}")))
    }

    async fn fetch_json(&self, bucket: &str, key: &str) -> Result<SnapshotDescriptor> {
        let bytes = self.fetch(bucket, key).await?;
        serde_json::from_slice(&bytes).map_err(|error| RatesError::Malformed {
            key: key.to_string(),
            error,
        })
    }

    async fn fetch_lines(&self, bucket: &str, key: &str) -> Result<Vec<RawExtract>> {
        let bytes = self.fetch(bucket, key).await?;
        let text = std::str::from_utf8(&bytes).map_err(|error| RatesError::Encoding {
            key: key.to_string(),
            error,
        })?;
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|error| RatesError::Malformed {
                    key: key.to_string(),
                    error,
                })
            })
            .collect()
    }
}
