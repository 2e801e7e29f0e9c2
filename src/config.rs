use crate::emergency::EmergencyConfig;
use crate::fault_injection::SensorErrorConfig;
use crate::test_sequence::TestSequenceConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const TICK_INTERVAL_MS: u64 = 1000;
const ERROR_BACKOFF_MS: u64 = 5000;
const STORE_ROOT: &str = "system";
const LISTEN_ADDR: &str = "127.0.0.1:8080";
const NOTIFICATION_TTL_S: u32 = 10;
const HISTORY_TTL_S: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Lifetimes of self-expiring collection entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    pub notification_ttl_s: u32,
    pub history_ttl_s: u32,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            notification_ttl_s: NOTIFICATION_TTL_S,
            history_ttl_s: HISTORY_TTL_S,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub tick_interval_ms: u64,
    pub error_backoff_ms: u64,
    pub store_root: String,
    pub listen_addr: String,
    /// Fixed RNG seed; `None` draws one from OS entropy.
    pub seed: Option<u64>,
    pub emergency: EmergencyConfig,
    pub test_sequence: TestSequenceConfig,
    pub expiry: ExpiryConfig,
    pub sensor_errors: SensorErrorConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: TICK_INTERVAL_MS,
            error_backoff_ms: ERROR_BACKOFF_MS,
            store_root: STORE_ROOT.to_string(),
            listen_addr: LISTEN_ADDR.to_string(),
            seed: None,
            emergency: EmergencyConfig::default(),
            test_sequence: TestSequenceConfig::default(),
            expiry: ExpiryConfig::default(),
            sensor_errors: SensorErrorConfig::default(),
        }
    }
}

impl SimulatorConfig {
    /// Load a JSON config file; missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive".into()));
        }
        let root = self.store_root.trim_matches('/');
        if root.is_empty() || root.split('/').any(str::is_empty) {
            return Err(ConfigError::Invalid(format!("bad store_root {:?}", self.store_root)));
        }

        let ranges = [
            ("fire_duration_s", self.emergency.fire_duration_s),
            ("co_increase_duration_s", self.emergency.co_increase_duration_s),
            ("weak_signal_duration_s", self.emergency.weak_signal_duration_s),
        ];
        for (name, (min, max)) in ranges {
            if min == 0 || min > max {
                return Err(ConfigError::Invalid(format!("{name} must satisfy 0 < min <= max")));
            }
        }

        if self.test_sequence.duration_s == 0 {
            return Err(ConfigError::Invalid("test_sequence.duration_s must be positive".into()));
        }
        Ok(())
    }

    /// Store path of a child of the root, e.g. `system/commands`.
    pub fn path(&self, child: &str) -> String {
        format!("{}/{}", self.store_root.trim_matches('/'), child)
    }
}
