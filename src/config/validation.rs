//! Configuration validation logic.

use regex::Regex;
use url::Url;

use crate::config::loader::Config;
use crate::error::{Error, Result};

/// API keys are 32 hexadecimal characters.
const API_KEY_PATTERN: &str = r"^[0-9a-fA-F]{32}$";

/// Validate the settings every command depends on.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_retries(config.mod_management.default_retries)?;
    validate_nonzero("io.poll_interval_ms", config.io.poll_interval_ms)?;
    validate_nonzero("io.max_poll_attempts", u64::from(config.io.max_poll_attempts))?;
    validate_nonzero("io.write_chunk_size", config.io.write_chunk_size as u64)?;
    validate_nonzero("cache.max_entries", config.cache.max_entries)?;

    Ok(())
}

/// Validate the settings needed to talk to the mod API.
pub fn validate_api_config(config: &Config) -> Result<()> {
    validate_api_key(&config.api.api_key)?;
    validate_base_url(&config.api.base_url)?;

    if config.api.game_id == 0 {
        return Err(Error::MissingConfig("api.game_id".to_string()));
    }

    Ok(())
}

/// Validate the API key.
pub fn validate_api_key(api_key: &str) -> Result<()> {
    if api_key.is_empty() {
        return Err(Error::MissingConfig("api.api_key".to_string()));
    }

    let pattern = Regex::new(API_KEY_PATTERN)
        .map_err(|e| Error::Config(format!("Invalid API key pattern: {}", e)))?;

    if !pattern.is_match(api_key) {
        return Err(Error::ConfigValidation {
            field: "api.api_key".to_string(),
            message: format!(
                "API key must be 32 hexadecimal characters (got {} characters)",
                api_key.len()
            ),
        });
    }

    Ok(())
}

/// Validate the API base URL.
pub fn validate_base_url(base_url: &str) -> Result<()> {
    let url = Url::parse(base_url).map_err(|e| Error::ConfigValidation {
        field: "api.base_url".to_string(),
        message: format!("'{}' is not a valid URL: {}", base_url, e),
    })?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(Error::ConfigValidation {
            field: "api.base_url".to_string(),
            message: format!("Unsupported scheme '{}'", url.scheme()),
        });
    }

    Ok(())
}

/// Validate the per-session retry budget.
pub fn validate_retries(retries: u8) -> Result<()> {
    if retries == 0 {
        return Err(Error::ConfigValidation {
            field: "mod_management.default_retries".to_string(),
            message: "At least one install attempt per session is required".to_string(),
        });
    }

    Ok(())
}

fn validate_nonzero(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(Error::ConfigValidation {
            field: field.to_string(),
            message: "Must be greater than zero".to_string(),
        });
    }

    Ok(())
}
