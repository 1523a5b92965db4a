use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("map update interval must be positive")]
    ZeroInterval,
}

/// Server-wide settings for map lifecycle and ticking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Accumulated milliseconds before all maps advance once.
    pub map_update_interval_ms: u32,
    /// Size of the map update worker pool; 0 updates maps sequentially.
    pub worker_threads: usize,
    /// Idle time before an unused grid is unloaded by map content.
    pub grid_clean_up_delay_ms: u32,
    /// Idle time before an empty instance copy is destroyed; 0 keeps them forever.
    pub instance_unload_delay_ms: u32,
    pub admission: AdmissionConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            map_update_interval_ms: 10,
            worker_threads: 0,
            grid_clean_up_delay_ms: 300_000,
            instance_unload_delay_ms: 1_800_000,
            admission: AdmissionConfig::default(),
        }
    }
}

impl WorldConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.map_update_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

/// Population rules consulted by admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Raids from this expansion onward require a raid group.
    pub active_expansion: u8,
    /// Waives the raid-group requirement entirely.
    pub ignore_raid_requirement: bool,
    pub max_instances_per_hour: u32,
    /// Locale used for map names in log output.
    pub default_locale: String,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            active_expansion: 2,
            ignore_raid_requirement: false,
            max_instances_per_hour: 5,
            default_locale: "enUS".to_string(),
        }
    }
}
