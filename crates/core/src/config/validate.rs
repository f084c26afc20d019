use reqwest::Url;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Orchestrator base URL is an absolute http(s) URL
/// - Request timeout and poll interval are not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let url = Url::parse(&config.orchestrator.base_url).map_err(|e| {
        ConfigError::ValidationError(format!(
            "orchestrator.base_url is not a valid URL: {}",
            e
        ))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::ValidationError(format!(
            "orchestrator.base_url must use http or https, got {}",
            url.scheme()
        )));
    }

    if config.orchestrator.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.poller.interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "poller.interval_ms cannot be 0".to_string(),
        ));
    }

    Ok(())
}
