//! Configuration loading helper functions
//! Provides utilities for resolving single settings with fallback logic

use std::fmt::Display;
use std::str::FromStr;
use tracing::{info, warn};

/// Get configuration value with priority: ENV > configured > default
///
/// # Arguments
/// * `env_var` - Environment variable name to check
/// * `configured` - Value from the configuration file, if any
/// * `default` - Default value to use as fallback
pub fn get_config_value<T>(env_var: &str, configured: Option<T>, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    // Priority 1: Environment variable
    if let Ok(env_str) = std::env::var(env_var) {
        match env_str.parse::<T>() {
            Ok(val) => {
                info!("Using {} from environment: {}", env_var, env_str);
                return val;
            },
            Err(e) => {
                warn!("Failed to parse {} from environment: {}", env_var, e);
            },
        }
    }

    // Priority 2: Configured value
    if let Some(val) = configured {
        return val;
    }

    // Priority 3: Default value
    info!("Using default value for {}", env_var);
    default
}

/// Get string configuration value with priority: ENV > configured > default
///
/// Empty strings count as unset.
pub fn get_string_config(env_var: &str, configured: Option<String>, default: &str) -> String {
    if let Ok(env_val) = std::env::var(env_var) {
        if !env_val.is_empty() {
            info!("Using {} from environment", env_var);
            return env_val;
        }
    }

    if let Some(val) = configured {
        if !val.is_empty() {
            return val;
        }
    }

    info!("Using default value for {}", env_var);
    default.to_string()
}
