//! # Configuration
//!
//! Layered configuration for worker processes: built-in defaults, then
//! `preservation.toml`, then `preservation.<env>.toml`, then `PRESERVATION__*`
//! environment variables.
//!
//! ```rust,no_run
//! use preservation_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let settings = manager.config().worker("restore_object")?;
//! println!("{} workers on {}", settings.number_of_workers, settings.topic);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::cold_storage::Credentials;
use crate::constants::{defaults, providers, topics};
use crate::models::StorageLocation;
use crate::worker::WorkerSettings;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl From<&ProviderCredentials> for Credentials {
    fn from(creds: &ProviderCredentials) -> Self {
        Credentials {
            access_key_id: creds.access_key_id.clone(),
            secret_access_key: creds.secret_access_key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColdStorageConfig {
    /// Days a thawed object stays readable in the hot tier
    pub days: u32,
    /// Retrieval tier: Expedited, Standard or Bulk
    pub tier: String,
    pub region: String,
    /// Provider whose credentials sign restore requests
    pub provider: String,
}

impl Default for ColdStorageConfig {
    fn default() -> Self {
        Self {
            days: defaults::COLD_STORAGE_DAYS,
            tier: defaults::COLD_STORAGE_TIER.to_string(),
            region: "us-east-1".to_string(),
            provider: providers::AWS.to_string(),
        }
    }
}

/// Retry policy for bookkeeping writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub result_cache_attempts: u32,
    pub result_cache_backoff_ms: u64,
    pub registry_attempts: u32,
    pub registry_backoff_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            result_cache_attempts: 3,
            result_cache_backoff_ms: 250,
            registry_attempts: 5,
            registry_backoff_ms: 1000,
        }
    }
}

impl PersistenceConfig {
    pub fn result_cache_backoff(&self) -> Duration {
        Duration::from_millis(self.result_cache_backoff_ms)
    }

    pub fn registry_backoff(&self) -> Duration {
        Duration::from_millis(self.registry_backoff_ms)
    }

    /// No retries and no waiting, for tests
    pub fn immediate() -> Self {
        Self {
            result_cache_attempts: 1,
            result_cache_backoff_ms: 0,
            registry_attempts: 1,
            registry_backoff_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorationConfig {
    /// Prefix of the URL recorded for a restored bag
    pub url_prefix: String,
    /// Files per registry page
    pub batch_size: usize,
    /// How far archive assembly may run ahead of the upload
    pub pipe_buffer_bytes: usize,
}

impl Default for RestorationConfig {
    fn default() -> Self {
        Self {
            url_prefix: defaults::RESTORATION_URL_PREFIX.to_string(),
            batch_size: defaults::BATCH_SIZE,
            pipe_buffer_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreservationConfig {
    pub workers: HashMap<String, WorkerSettings>,
    #[serde(default)]
    pub storage_locations: Vec<StorageLocation>,
    /// Provider name to credentials
    #[serde(default)]
    pub credentials: HashMap<String, ProviderCredentials>,
    pub cold_storage: ColdStorageConfig,
    pub persistence: PersistenceConfig,
    pub restoration: RestorationConfig,
    pub keep_alive_interval_secs: u64,
    pub redis_url: String,
    #[serde(default)]
    pub log_directory: Option<PathBuf>,
}

impl Default for PreservationConfig {
    fn default() -> Self {
        let workers = [
            WorkerSettings::restore_object(),
            WorkerSettings::restore_file(),
            WorkerSettings::restore_glacier(),
            WorkerSettings::fixity_check(),
        ]
        .into_iter()
        .map(|s| (s.topic.clone(), s))
        .collect();
        Self {
            workers,
            storage_locations: Vec::new(),
            credentials: HashMap::new(),
            cold_storage: ColdStorageConfig::default(),
            persistence: PersistenceConfig::default(),
            restoration: RestorationConfig::default(),
            keep_alive_interval_secs: defaults::KEEP_ALIVE_INTERVAL_SECS,
            redis_url: "redis://localhost:6379".to_string(),
            log_directory: None,
        }
    }
}

impl PreservationConfig {
    /// Settings for the worker consuming `topic`
    pub fn worker(&self, topic: &str) -> ConfigResult<&WorkerSettings> {
        self.workers
            .get(topic)
            .ok_or_else(|| ConfigurationError::missing_required_field(topic, "workers"))
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    /// Provider names match case-insensitively
    pub fn credentials_for(&self, provider: &str) -> ConfigResult<Credentials> {
        self.credentials
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(provider))
            .map(|(_, creds)| Credentials::from(creds))
            .ok_or_else(|| ConfigurationError::missing_required_field(provider, "credentials"))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (name, worker) in &self.workers {
            if worker.topic.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "topic",
                    format!("workers.{name}"),
                ));
            }
            for (field, value) in [
                ("number_of_workers", worker.number_of_workers),
                ("channel_buffer_size", worker.channel_buffer_size),
                ("max_attempts", worker.max_attempts as usize),
            ] {
                if value == 0 {
                    return Err(ConfigurationError::invalid_value(
                        format!("workers.{name}.{field}"),
                        "0",
                        "must be greater than zero",
                    ));
                }
            }
        }
        for location in &self.storage_locations {
            if location.bucket.is_empty() || location.host.is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "storage_locations",
                    format!("{location:?}"),
                    "bucket and host are required",
                ));
            }
        }
        if self.restoration.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "restoration.batch_size",
                "0",
                "must be greater than zero",
            ));
        }
        if self.keep_alive_interval_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "keep_alive_interval_secs",
                "0",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Topics served by the built-in restoration workers
pub fn restoration_topics() -> [&'static str; 3] {
    [topics::RESTORE_OBJECT, topics::RESTORE_FILE, topics::RESTORE_GLACIER]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PreservationConfig::default();
        config.validate().unwrap();
        for topic in restoration_topics() {
            assert_eq!(config.worker(topic).unwrap().topic, topic);
        }
        assert!(config.worker(topics::FIXITY_CHECK).is_ok());
        assert_eq!(config.persistence.registry_attempts, 5);
        assert_eq!(config.cold_storage.days, 10);
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let mut config = PreservationConfig::default();
        config
            .workers
            .get_mut(topics::RESTORE_OBJECT)
            .unwrap()
            .number_of_workers = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_credentials() {
        let config = PreservationConfig::default();
        assert!(config.credentials_for("AWS").is_err());
    }
}
