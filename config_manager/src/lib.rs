use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] ConfigError),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// General system settings
    pub system: SystemSettings,

    /// Grouping and classification thresholds
    pub engine: EngineSettings,

    /// Detail cache configuration
    pub cache: CacheConfig,

    /// Redis configuration (used when `cache.backend = "redis"`)
    pub redis: RedisConfig,

    /// Token decimals overrides, consulted before the built-in table
    #[serde(default)]
    pub decimals: HashMap<String, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSettings {
    /// Enable debug mode
    pub debug_mode: bool,

    /// Reserved account that emits gas refunds and other internal receipts
    pub system_account: String,

    /// Canonical wrapped-NEAR contract
    pub wrapped_native_contract: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Deposits at or below this many NEAR are storage/registration noise
    pub dust_threshold_near: f64,

    /// Groups moving less than this many NEAR (and with few members) are hidden
    pub hide_threshold_near: f64,

    /// Minimum NEAR amount worth showing to a user
    pub visibility_threshold_near: f64,

    /// Maximum gap between a wrap and its swap for them to be merged
    pub merge_window_seconds: u64,

    /// Result bound for the regular view
    pub max_operations: usize,

    /// Result bound for the compact view
    pub compact_operations: usize,

    /// Additional reward-protocol patterns: substring -> protocol label
    #[serde(default)]
    pub extra_claim_patterns: HashMap<String, String>,

    /// Additional DEX patterns: substring -> venue label
    #[serde(default)]
    pub extra_dex_patterns: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// "memory" or "redis"
    pub backend: String,

    /// Lifetime of a session's detail index in seconds
    pub ttl_seconds: u64,

    /// Maximum number of sessions kept by the in-memory backend
    pub max_sessions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Key prefix for detail entries
    pub key_prefix: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            system: SystemSettings {
                debug_mode: false,
                system_account: "system".to_string(),
                wrapped_native_contract: "wrap.near".to_string(),
            },
            engine: EngineSettings {
                dust_threshold_near: 0.0001,
                hide_threshold_near: 0.001,
                visibility_threshold_near: 0.01,
                merge_window_seconds: 180,
                max_operations: 15,
                compact_operations: 5,
                extra_claim_patterns: HashMap::new(),
                extra_dex_patterns: HashMap::new(),
            },
            cache: CacheConfig {
                backend: "memory".to_string(),
                ttl_seconds: 300,
                max_sessions: 1000,
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".to_string(),
                key_prefix: "details".to_string(),
            },
            decimals: HashMap::new(),
        }
    }
}

impl EngineSettings {
    /// Validate threshold ordering and result bounds
    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("dust_threshold_near", self.dust_threshold_near),
            ("hide_threshold_near", self.hide_threshold_near),
            ("visibility_threshold_near", self.visibility_threshold_near),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigurationError::InvalidValue(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        if self.dust_threshold_near > self.hide_threshold_near
            || self.hide_threshold_near > self.visibility_threshold_near
        {
            return Err(ConfigurationError::InvalidValue(
                "Thresholds must satisfy dust <= hide <= visibility".to_string(),
            ));
        }

        if self.max_operations == 0 || self.compact_operations == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Result bounds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl CacheConfig {
    /// Validate cache configuration
    pub fn validate(&self) -> Result<()> {
        match self.backend.as_str() {
            "memory" | "redis" => {}
            other => {
                return Err(ConfigurationError::InvalidValue(format!(
                    "Unknown cache backend '{}', expected 'memory' or 'redis'",
                    other
                )))
            }
        }

        if self.ttl_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Cache TTL must be greater than 0".to_string(),
            ));
        }

        if self.max_sessions == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Cache must retain at least one session".to_string(),
            ));
        }

        Ok(())
    }
}

impl SystemConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config_builder = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&SystemConfig::default())?);

        if config_path.as_ref().exists() {
            info!(
                "Loading configuration from: {}",
                config_path.as_ref().display()
            );
            config_builder = config_builder.add_source(File::from(config_path.as_ref()));
        } else {
            debug!("Config file not found, using defaults and environment variables");
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("PULSE")
                .try_parsing(true)
                .separator("__")
                .list_separator(","),
        );

        let config = config_builder.build()?;
        let mut system_config: SystemConfig = config.try_deserialize()?;

        // Contract ids are lower-case on chain; keep override keys comparable
        let original_len = system_config.decimals.len();
        system_config.decimals = system_config
            .decimals
            .into_iter()
            .map(|(contract, decimals)| (contract.trim().to_lowercase(), decimals))
            .collect();
        if system_config.decimals.len() != original_len {
            warn!("Decimals overrides contained duplicate contracts after normalization");
        }

        system_config.validate()?;

        Ok(system_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.cache.validate()?;

        if self.system.system_account.trim().is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "System account id cannot be empty".to_string(),
            ));
        }

        if self.system.wrapped_native_contract.trim().is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "Wrapped native contract cannot be empty".to_string(),
            ));
        }

        if self.cache.backend == "redis" && self.redis.url.is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "Redis URL is required when the redis cache backend is selected".to_string(),
            ));
        }

        Ok(())
    }

    /// Get configuration as a JSON value
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Configuration manager for loading and managing system configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: SystemConfig,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Result<Self> {
        let config = SystemConfig::load()?;
        info!("Configuration loaded successfully");
        debug!("Configuration: {:#?}", config);

        Ok(Self { config })
    }

    /// Get a reference to the current configuration
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn into_config(self) -> SystemConfig {
        self.config
    }
}
