pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::{AppConfig, StorageConfig};
use crate::core::env::{EnvLookup, ProcessEnv};
use crate::core::resolver::{MetadataResolver, ResolveMode};
use crate::providers::{LocalObjectStore, ObjectStore, S3HttpStore, SnapshotReader};
use crate::store::{DiskFactStore, FactStore, MemoryFactStore};
use anyhow::Result;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Resolve {
        table: String,
        plan: bool,
    },
    Run {
        date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        plan: bool,
    },
    Facts {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        currency: Option<String>,
        all: bool,
    },
    Audit {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        currency: Option<String>,
        flagged_only: bool,
    },
    Quality {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

/// Shared handles built once from the configuration.
pub struct AppContext {
    pub config: AppConfig,
    pub env: Arc<dyn EnvLookup>,
    pub objects: Arc<dyn ObjectStore>,
}

impl AppContext {
    pub fn new(config: AppConfig, env: Arc<dyn EnvLookup>) -> Result<Self> {
        let objects: Arc<dyn ObjectStore> = match &config.storage {
            StorageConfig::Local(local) => Arc::new(LocalObjectStore::new(&local.root)),
            StorageConfig::Http(http) => Arc::new(S3HttpStore::new(&http.endpoint)?),
        };
        Ok(Self {
            config,
            env,
            objects,
        })
    }

    pub fn resolver(&self, mode: ResolveMode) -> Result<MetadataResolver> {
        let layout = self.config.table_layout(self.env.as_ref())?;
        let resolver =
            MetadataResolver::new(layout, Arc::clone(&self.env), Arc::clone(&self.objects));
        Ok(resolver.with_mode(mode))
    }

    pub fn reader(&self, mode: ResolveMode) -> Result<SnapshotReader> {
        Ok(SnapshotReader::new(
            Arc::new(self.resolver(mode)?),
            Arc::clone(&self.objects),
        ))
    }

    /// Persistent fact store, or a throwaway one for plan runs.
    pub fn fact_store(&self, plan: bool) -> Result<Arc<dyn FactStore>> {
        if plan {
            return Ok(Arc::new(MemoryFactStore::new()));
        }
        let path = self.config.default_data_path()?;
        debug!(path = %path.display(), "Opening fact store");
        Ok(Arc::new(DiskFactStore::open(&path)?))
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fxcheck starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let ctx = AppContext::new(config, Arc::new(ProcessEnv))?;

    match command {
        AppCommand::Resolve { table, plan } => cli::resolve::run(&ctx, &table, plan).await,
        AppCommand::Run {
            date,
            end_date,
            plan,
        } => cli::run::run(&ctx, date, end_date, plan).await,
        AppCommand::Facts {
            from,
            to,
            currency,
            all,
        } => cli::facts::run(&ctx, from, to, currency.as_deref(), all).await,
        AppCommand::Audit {
            from,
            to,
            currency,
            flagged_only,
        } => cli::audit::run(&ctx, from, to, currency.as_deref(), flagged_only).await,
        AppCommand::Quality { from, to } => cli::quality::run(&ctx, from, to).await,
    }
}
