//! Poller configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the progress poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Delay between ticks (milliseconds).
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
}

fn default_interval() -> u64 {
    2000 // 2 seconds
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.interval_ms, 2000);
        assert_eq!(config.interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: PollerConfig = toml::from_str("").unwrap();
        assert_eq!(config, PollerConfig::default());
    }
}
