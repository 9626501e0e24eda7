use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Accessory configuration as it appears in the platform's JSON config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessoryConfig {
    pub name: String,
    pub home_id: String,
    pub device_id: String,
    pub email: String,
    pub password: String,
    pub auto_refresh_enabled: bool,
    pub refresh_interval_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_check_period_secs: u64,
    pub debounce_ms: u64,
    pub device_timeout_secs: u64,
    pub fetch_wait_timeout_secs: u64,
    pub min_temperature: f64,
    pub max_temperature: f64,
}

impl Default for AccessoryConfig {
    fn default() -> Self {
        Self {
            name: "BGH Smart".to_string(),
            home_id: String::new(),
            device_id: String::new(),
            email: String::new(),
            password: String::new(),
            auto_refresh_enabled: true,
            refresh_interval_secs: 60,
            cache_ttl_secs: 30,
            cache_check_period_secs: 5,
            debounce_ms: 2_000,
            device_timeout_secs: 10,
            fetch_wait_timeout_secs: 30,
            min_temperature: 17.0,
            max_temperature: 30.0,
        }
    }
}

impl AccessoryConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_check_period(&self) -> Duration {
        Duration::from_secs(self.cache_check_period_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_secs(self.device_timeout_secs)
    }

    pub fn fetch_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_wait_timeout_secs)
    }
}
