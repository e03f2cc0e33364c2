//! Configuration Loader
//!
//! Environment-aware loading on top of the `config` crate.

use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::PreservationConfig;

pub struct ConfigManager {
    config: PreservationConfig,
    environment: String,
    config_directory: PathBuf,
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("environment", &self.environment)
            .field("config_directory", &self.config_directory)
            .field("config", &self.debug_config())
            .finish()
    }
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from `./config`
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = crate::logging::get_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load with an explicit environment, without touching process env vars
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));
        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::build(&config_directory, environment)?;
        config.validate()?;

        let manager = ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        };
        debug!(
            "Configuration loaded: {}",
            serde_json::to_string_pretty(&manager.debug_config())
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = %environment,
            workers = manager.config.workers.len(),
            storage_locations = manager.config.storage_locations.len(),
            "⚙️ Configuration loaded successfully"
        );
        Ok(Arc::new(manager))
    }

    fn build(dir: &Path, environment: &str) -> ConfigResult<PreservationConfig> {
        let defaults = Config::try_from(&PreservationConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;
        let base = dir.join("preservation.toml");
        let overrides = dir.join(format!("preservation.{environment}.toml"));

        Config::builder()
            .add_source(defaults)
            .add_source(File::from(base).required(false))
            .add_source(File::from(overrides).required(false))
            .add_source(
                Environment::with_prefix("PRESERVATION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(dir.display().to_string(), e))?
            .try_deserialize()
            .map_err(ConfigurationError::parse_error)
    }

    pub fn config(&self) -> &PreservationConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with secrets masked, for logs
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or_default();
        sanitize_json_recursive(&mut value);
        value
    }
}

const SENSITIVE_PATTERNS: [&str; 5] = ["password", "secret", "key_id", "token", "credential"];

fn sanitize_json_recursive(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                if SENSITIVE_PATTERNS.iter().any(|p| key_lower.contains(p)) && !val.is_object() {
                    *val = serde_json::Value::String("***".to_string());
                } else {
                    sanitize_json_recursive(val);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(sanitize_json_recursive),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_files() {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().restoration.batch_size, 100);
        assert_eq!(manager.config().workers.len(), 4);
    }

    #[test]
    fn test_files_layer_over_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("preservation.toml"),
            r#"
keep_alive_interval_secs = 30

[cold_storage]
days = 5

[workers.restore_object]
channel_buffer_size = 4
max_attempts = 7
number_of_workers = 2
topic = "restore_object"
next_stage = "Resolve"
requeue_timeout_secs = 10

[credentials.AWS]
access_key_id = "AKID"
secret_access_key = "super-secret"

[[storage_locations]]
bucket = "preservation.va"
host = "s3.amazonaws.com"
provider = "AWS"
region = "us-east-1"
restore_priority = 3
storage_class = "STANDARD"
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("preservation.test.toml"),
            "[cold_storage]\ntier = \"Bulk\"\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        let config = manager.config();
        assert_eq!(config.keep_alive_interval_secs, 30);
        assert_eq!(config.cold_storage.days, 5);
        assert_eq!(config.cold_storage.tier, "Bulk");
        assert_eq!(config.worker("restore_object").unwrap().max_attempts, 7);
        // Untouched workers keep their defaults
        assert_eq!(config.worker("restore_glacier").unwrap().max_attempts, 10);
        assert_eq!(config.storage_locations[0].restore_priority, 3);
        assert_eq!(config.credentials_for("AWS").unwrap().access_key_id, "AKID");

        let logged = manager.debug_config().to_string();
        assert!(!logged.contains("super-secret"));
        assert!(!logged.contains("AKID"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("preservation.toml"),
            "[restoration]\nbatch_size = 0\n",
        )
        .unwrap();
        let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }
}
