use crate::core::consensus::ConsensusConfig;
use crate::core::env::EnvLookup;
use crate::core::rates::{EUR, Source};
use crate::core::resolver::TableLayout;
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub source: Source,
    pub table: String,
    pub base_currency: String,
    #[serde(default = "default_column_prefix")]
    pub column_prefix: String,
}

fn default_column_prefix() -> String {
    "rates__".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LocalStorageConfig {
    pub root: String,
    pub bucket: String,
    pub bucket_env: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpStorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub bucket_env: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum StorageConfig {
    Local(LocalStorageConfig),
    Http(HttpStorageConfig),
}

impl StorageConfig {
    /// The configured bucket, unless the environment names another one.
    pub fn bucket(&self, env: &dyn EnvLookup) -> crate::core::error::Result<String> {
        let (bucket, bucket_env) = match self {
            StorageConfig::Local(c) => (&c.bucket, &c.bucket_env),
            StorageConfig::Http(c) => (&c.bucket, &c.bucket_env),
        };
        if let Some(key) = bucket_env {
            let value = env.get(key)?;
            let value = value.trim().trim_start_matches("s3://").trim_end_matches('/');
            if !value.is_empty() {
                debug!(%key, bucket = %value, "Bucket taken from environment");
                return Ok(value.to_string());
            }
        }
        Ok(bucket.clone())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResolverConfig {
    #[serde(default = "default_strip_suffix")]
    pub override_strip_suffix: String,
    #[serde(default = "default_append_suffix")]
    pub override_append_suffix: String,
}

fn default_strip_suffix() -> String {
    "_RATES".to_string()
}

fn default_append_suffix() -> String {
    "_METADATA_LOCATION".to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            override_strip_suffix: default_strip_suffix(),
            override_append_suffix: default_append_suffix(),
        }
    }
}

fn default_warehouse_prefix() -> String {
    "silver".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    #[serde(default = "default_warehouse_prefix")]
    pub warehouse_prefix: String,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub validation: ConsensusConfig,
    pub providers: Vec<ProviderConfig>,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "fxcheck", "fxcheck")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "fxcheck", "fxcheck")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .check()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Rejects configurations the pipeline cannot run with.
    pub fn check(&self) -> Result<()> {
        let primaries: Vec<_> = self
            .providers
            .iter()
            .filter(|p| p.source == Source::Primary)
            .collect();
        match primaries.as_slice() {
            [primary] if !primary.base_currency.eq_ignore_ascii_case(EUR) => bail!(
                "Primary provider '{}' must report against {EUR}, not {}",
                primary.name,
                primary.base_currency
            ),
            [_] => {}
            [] => bail!("Exactly one primary provider is required, found none"),
            many => bail!(
                "Exactly one primary provider is required, found {}",
                many.len()
            ),
        }

        let mut tiers: Vec<Source> = self.providers.iter().map(|p| p.source).collect();
        tiers.sort();
        tiers.dedup();
        if tiers.len() != self.providers.len() {
            bail!("Each source tier may be assigned to one provider only");
        }

        let threshold = self.validation.flag_threshold;
        if !(threshold.is_finite() && threshold >= 0.0) {
            bail!("validation.flag_threshold must be a non-negative number");
        }
        if let Some(critical) = self.validation.critical_threshold
            && !(critical.is_finite() && critical > threshold)
        {
            bail!(
                "validation.critical_threshold must be a number greater than flag_threshold ({threshold})"
            );
        }
        Ok(())
    }

    pub fn primary(&self) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.source == Source::Primary)
    }

    pub fn provider_for_table(&self, table: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.table == table)
    }

    pub fn table_layout(&self, env: &dyn EnvLookup) -> Result<TableLayout> {
        Ok(TableLayout {
            bucket: self.storage.bucket(env)?,
            warehouse_prefix: self.warehouse_prefix.clone(),
            override_strip_suffix: self.resolver.override_strip_suffix.clone(),
            override_append_suffix: self.resolver.override_append_suffix.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::env::StaticEnv;

    const YAML: &str = r#"
storage:
  root: "/var/lib/minio"
  bucket: "rates"
  bucket_env: "TARGET_BUCKET"
validation:
  critical_threshold: 0.05
providers:
  - name: frankfurter
    source: primary
    table: frankfurter_rates
    base_currency: EUR
  - name: exchangerate
    source: secondary
    table: exchangerate_rates
    base_currency: EUR
  - name: currencylayer
    source: tertiary
    table: currencylayer_rates
    base_currency: USD
    column_prefix: "quotes__"
"#;

    #[test]
    fn test_config_deserialization() {
        let config: AppConfig = serde_yaml::from_str(YAML).expect("Failed to deserialize");
        config.check().unwrap();

        assert!(matches!(config.storage, StorageConfig::Local(_)));
        assert_eq!(config.warehouse_prefix, "silver");
        assert_eq!(config.resolver.override_append_suffix, "_METADATA_LOCATION");
        assert_eq!(config.validation.flag_threshold, 0.005);
        assert_eq!(config.validation.critical_threshold, Some(0.05));
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.primary().unwrap().name, "frankfurter");
        assert_eq!(config.providers[0].column_prefix, "rates__");
        assert_eq!(config.providers[2].column_prefix, "quotes__");
        assert_eq!(config.providers[2].source, Source::Tertiary);
        assert_eq!(
            config.provider_for_table("exchangerate_rates").unwrap().name,
            "exchangerate"
        );
    }

    #[test]
    fn test_http_storage_and_bucket_override() {
        let yaml = r#"
storage:
  endpoint: "http://localhost:9000"
  bucket: "rates"
  bucket_env: "TARGET_BUCKET"
providers:
  - name: frankfurter
    source: primary
    table: frankfurter_rates
    base_currency: EUR
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.storage, StorageConfig::Http(_)));

        let env = StaticEnv::new();
        assert_eq!(config.storage.bucket(&env).unwrap(), "rates");

        let env = StaticEnv::new().with("TARGET_BUCKET", "s3://silver-bucket/");
        assert_eq!(config.storage.bucket(&env).unwrap(), "silver-bucket");
        assert_eq!(config.table_layout(&env).unwrap().bucket, "silver-bucket");
    }

    #[test]
    fn test_config_requires_single_eur_primary() {
        let mut config: AppConfig = serde_yaml::from_str(YAML).unwrap();
        config.providers[2].source = Source::Primary;
        assert!(config.check().is_err());

        let mut config: AppConfig = serde_yaml::from_str(YAML).unwrap();
        config.providers[0].base_currency = "USD".to_string();
        assert!(config.check().is_err());

        let mut config: AppConfig = serde_yaml::from_str(YAML).unwrap();
        config.providers.remove(0);
        assert!(config.check().is_err());
    }

    #[test]
    fn test_critical_threshold_above_flag_threshold() {
        let mut config: AppConfig = serde_yaml::from_str(YAML).unwrap();
        config.validation.critical_threshold = Some(0.001);
        assert!(config.check().is_err());

        config.validation.critical_threshold = Some(f64::NAN);
        assert!(config.check().is_err());

        config.validation.critical_threshold = Some(config.validation.flag_threshold);
        assert!(config.check().is_err());

        config.validation.critical_threshold = Some(0.05);
        assert!(config.check().is_ok());

        config.validation.critical_threshold = None;
        assert!(config.check().is_ok());
    }
}
