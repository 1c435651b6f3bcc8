//! Locates the most recent metadata snapshot of a table.
//!
//! Resolution walks an ordered list of lookup strategies and stops at the
//! first one that yields a location: an externally injected override, then
//! discovery by listing the table's metadata prefix. When nothing is found the
//! caller gets `None` and is expected to carry on with an empty batch.
//!
//! In plan mode only strategies that stay off the object store run; tables
//! they cannot resolve get a placeholder location.

use crate::core::env::EnvLookup;
use crate::core::error::{RatesError, Result};
use crate::providers::ObjectStore;
use async_trait::async_trait;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info};

const URI_SCHEME: &str = "s3://";
const METADATA_SUFFIX: &str = ".metadata.json";

/// Which lookup produced a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationOrigin {
    Override,
    Discovered,
    Placeholder,
}

impl Display for LocationOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                LocationOrigin::Override => "override",
                LocationOrigin::Discovered => "discovery",
                LocationOrigin::Placeholder => "placeholder",
            }
        )
    }
}

/// Pointer to a table's current metadata descriptor. Recomputed on every
/// resolution, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotLocation {
    pub uri: String,
    pub origin: LocationOrigin,
}

impl SnapshotLocation {
    pub fn new(uri: impl Into<String>, origin: LocationOrigin) -> Self {
        Self {
            uri: uri.into(),
            origin,
        }
    }

    pub fn from_key(bucket: &str, key: &str, origin: LocationOrigin) -> Self {
        Self::new(format!("{URI_SCHEME}{bucket}/{key}"), origin)
    }

    /// Splits the URI into `(bucket, key)`.
    pub fn bucket_and_key(&self) -> Result<(&str, &str)> {
        split_uri(&self.uri)
    }
}

/// Splits `s3://bucket/key` into `(bucket, key)`.
pub fn split_uri(uri: &str) -> Result<(&str, &str)> {
    uri.strip_prefix(URI_SCHEME)
        .and_then(|rest| rest.split_once('/'))
        .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
        .ok_or_else(|| RatesError::InvalidLocation(uri.to_string()))
}

/// Naming rules shared by every strategy.
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub bucket: String,
    pub warehouse_prefix: String,
    pub override_strip_suffix: String,
    pub override_append_suffix: String,
}

impl TableLayout {
    /// Environment key holding an authoritative location for `table`,
    /// e.g. `frankfurter_rates` -> `FRANKFURTER_METADATA_LOCATION`.
    pub fn override_key(&self, table: &str) -> String {
        let upper = table.to_uppercase();
        let strip = self.override_strip_suffix.to_uppercase();
        let stem = upper.strip_suffix(strip.as_str()).unwrap_or(&upper);
        format!("{stem}{}", self.override_append_suffix)
    }

    pub fn metadata_prefix(&self, table: &str) -> String {
        let prefix = self.warehouse_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{table}/metadata/")
        } else {
            format!("{prefix}/{table}/metadata/")
        }
    }

    /// Syntactically valid location handed out when no execution context
    /// exists (plan-only evaluation).
    pub fn placeholder(&self, table: &str) -> SnapshotLocation {
        SnapshotLocation::from_key(
            &self.bucket,
            &format!("{}00000-placeholder{METADATA_SUFFIX}", self.metadata_prefix(table)),
            LocationOrigin::Placeholder,
        )
    }
}

/// One step in the resolution chain.
#[async_trait]
pub trait LookupStrategy: Send + Sync {
    async fn lookup(&self, table: &str) -> Result<Option<SnapshotLocation>>;

    /// Whether the lookup reaches the object store.
    fn touches_storage(&self) -> bool {
        true
    }
}

/// Reads an override injected by the control plane.
pub struct OverrideLookup {
    layout: TableLayout,
    env: Arc<dyn EnvLookup>,
}

impl OverrideLookup {
    pub fn new(layout: TableLayout, env: Arc<dyn EnvLookup>) -> Self {
        Self { layout, env }
    }
}

#[async_trait]
impl LookupStrategy for OverrideLookup {
    async fn lookup(&self, table: &str) -> Result<Option<SnapshotLocation>> {
        let key = self.layout.override_key(table);
        let value = self.env.get(&key)?;
        let value = value.trim();
        if value.is_empty() {
            debug!(%key, "No metadata override set");
            return Ok(None);
        }
        Ok(Some(SnapshotLocation::new(value, LocationOrigin::Override)))
    }

    fn touches_storage(&self) -> bool {
        false
    }
}

/// Lists metadata descriptors under the table prefix and picks the newest.
pub struct DiscoveryLookup {
    layout: TableLayout,
    store: Arc<dyn ObjectStore>,
}

impl DiscoveryLookup {
    pub fn new(layout: TableLayout, store: Arc<dyn ObjectStore>) -> Self {
        Self { layout, store }
    }
}

#[async_trait]
impl LookupStrategy for DiscoveryLookup {
    async fn lookup(&self, table: &str) -> Result<Option<SnapshotLocation>> {
        let prefix = self.layout.metadata_prefix(table);
        let keys = self.store.list(&self.layout.bucket, &prefix).await?;
        debug!(%prefix, count = keys.len(), "Listed metadata objects");

        // Filenames embed an incrementing version, so lexical order is recency.
        let newest = keys
            .iter()
            .filter(|key| key.ends_with(METADATA_SUFFIX))
            .max_by(|a, b| file_name(a).cmp(file_name(b)).then_with(|| a.cmp(b)));

        Ok(newest.map(|key| {
            SnapshotLocation::from_key(&self.layout.bucket, key, LocationOrigin::Discovered)
        }))
    }
}

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Whether the resolver may touch external systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    Execute,
    Plan,
}

pub struct MetadataResolver {
    layout: TableLayout,
    strategies: Vec<Box<dyn LookupStrategy>>,
    mode: ResolveMode,
}

impl MetadataResolver {
    /// Override first, discovery second.
    pub fn new(layout: TableLayout, env: Arc<dyn EnvLookup>, store: Arc<dyn ObjectStore>) -> Self {
        let strategies: Vec<Box<dyn LookupStrategy>> = vec![
            Box::new(OverrideLookup::new(layout.clone(), env)),
            Box::new(DiscoveryLookup::new(layout.clone(), store)),
        ];
        Self::with_strategies(layout, strategies)
    }

    pub fn with_strategies(layout: TableLayout, strategies: Vec<Box<dyn LookupStrategy>>) -> Self {
        Self {
            layout,
            strategies,
            mode: ResolveMode::Execute,
        }
    }

    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    /// Resolves the newest snapshot of `table`, or `None` when there is none.
    pub async fn resolve(&self, table: &str) -> Result<Option<SnapshotLocation>> {
        let plan = self.mode == ResolveMode::Plan;
        for strategy in &self.strategies {
            if plan && strategy.touches_storage() {
                continue;
            }
            if let Some(location) = strategy.lookup(table).await? {
                info!(
                    %table,
                    path = %location.origin,
                    uri = %location.uri,
                    "Resolved metadata location"
                );
                return Ok(Some(location));
            }
        }

        if plan {
            let location = self.layout.placeholder(table);
            info!(%table, path = "placeholder", uri = %location.uri, "Resolved metadata location");
            return Ok(Some(location));
        }

        info!(%table, path = "not_found", "No metadata location found");
        Ok(None)
    }
}
