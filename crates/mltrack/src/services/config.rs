use super::types::TrackerConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "mltrack.toml";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "MLTRACK_CONFIG";

/// Service for configuration management
pub struct ConfigService {
    config_path: PathBuf,
}

impl ConfigService {
    /// Create a config service for an explicit file
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Config file from `MLTRACK_CONFIG`, or `mltrack.toml` in the working directory
    pub fn from_env() -> Self {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Initialize configuration with defaults
    pub fn init(&self) -> Result<TrackerConfig> {
        let config = TrackerConfig::default();
        self.save(&config)?;
        Ok(config)
    }

    /// Load configuration from file, with env var overrides (MLTRACK_ prefix, __ separator)
    pub fn load(&self) -> Result<TrackerConfig> {
        let mut figment = Figment::from(Serialized::defaults(TrackerConfig::default()));

        if self.config_path.exists() {
            figment = figment.merge(Toml::file(&self.config_path));
        }

        figment = figment.merge(Env::prefixed("MLTRACK_").split("__"));

        let config: TrackerConfig = figment.extract().context("Failed to load configuration")?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &TrackerConfig) -> Result<()> {
        let content = toml::to_string_pretty(config).context("Failed to serialize config")?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
        }

        std::fs::write(&self.config_path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Get a configuration value by dotted key
    pub fn get(&self, key: &str) -> Result<String> {
        let config = self.load()?;
        match key {
            "server.bind" => Ok(config.server.bind),
            "server.cors_origins" => Ok(config.server.cors_origins.join(",")),
            "storage.database_url" => Ok(config.storage.database_url),
            "storage.artifacts_path" => Ok(config.storage.artifacts_path),
            "storage.max_artifact_bytes" => Ok(config.storage.max_artifact_bytes.to_string()),
            "storage.chunk_size" => Ok(config.storage.chunk_size.to_string()),
            _ => Err(anyhow::anyhow!("Unknown config key: {}", key)),
        }
    }

    /// Set a configuration value by dotted key
    pub fn set(&self, key: &str, value: String) -> Result<()> {
        let mut config = self.load()?;
        match key {
            "server.bind" => config.server.bind = value,
            "server.cors_origins" => {
                config.server.cors_origins = value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(String::from)
                    .collect();
            },
            "storage.database_url" => config.storage.database_url = value,
            "storage.artifacts_path" => config.storage.artifacts_path = value,
            "storage.max_artifact_bytes" => {
                config.storage.max_artifact_bytes = value
                    .parse()
                    .with_context(|| format!("Invalid value for {}: {}", key, value))?;
            },
            "storage.chunk_size" => {
                let size: usize = value
                    .parse()
                    .with_context(|| format!("Invalid value for {}: {}", key, value))?;
                if size == 0 {
                    return Err(anyhow::anyhow!("{} must be greater than zero", key));
                }
                config.storage.chunk_size = size;
            },
            _ => return Err(anyhow::anyhow!("Unknown config key: {}", key)),
        }
        self.save(&config)?;
        Ok(())
    }

    /// Check if configuration exists
    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
