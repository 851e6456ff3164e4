//! Command-line arguments shared by iosync services

#[cfg(feature = "cli")]
use clap::Parser;

/// Common service startup arguments
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", clap(author, version, about))]
pub struct ServiceArgs {
    /// Configuration file (YAML)
    #[cfg_attr(
        feature = "cli",
        clap(short = 'c', long, default_value = "config/iosrv.yaml", env = "IOSRV_CONFIG")
    )]
    pub config: String,

    /// Log level or filter spec (trace, debug, info, warn, error)
    #[cfg_attr(feature = "cli", clap(short = 'l', long, env = "RUST_LOG"))]
    pub log_level: Option<String>,

    /// Optional Modbus bind address override (e.g., 0.0.0.0:1502)
    #[cfg_attr(feature = "cli", clap(short = 'b', long, env = "BIND_ADDRESS"))]
    pub bind_address: Option<String>,

    /// Disable colored output (useful for log files)
    #[cfg_attr(feature = "cli", clap(long))]
    pub no_color: bool,

    /// Only validate configuration without starting service
    #[cfg_attr(feature = "cli", clap(long))]
    pub validate: bool,

    /// Use simulated pins regardless of the configured backend
    #[cfg_attr(feature = "cli", clap(long))]
    pub simulate: bool,
}

impl Default for ServiceArgs {
    fn default() -> Self {
        Self {
            config: "config/iosrv.yaml".to_string(),
            log_level: None,
            bind_address: None,
            no_color: false,
            validate: false,
            simulate: false,
        }
    }
}

impl ServiceArgs {
    /// Parse log level string to tracing::Level
    pub fn parse_log_level(&self) -> tracing::Level {
        match self
            .log_level
            .as_deref()
            .unwrap_or("info")
            .to_lowercase()
            .as_str()
        {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = ServiceArgs::default();
        assert_eq!(args.config, "config/iosrv.yaml");
        assert!(args.log_level.is_none());
        assert!(!args.validate);
        assert!(!args.simulate);
    }

    #[test]
    fn test_parse_log_level() {
        let args = ServiceArgs {
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        assert_eq!(args.parse_log_level(), tracing::Level::DEBUG);

        let args = ServiceArgs {
            log_level: Some("WARN".to_string()),
            ..Default::default()
        };
        assert_eq!(args.parse_log_level(), tracing::Level::WARN);

        let args = ServiceArgs::default();
        assert_eq!(args.parse_log_level(), tracing::Level::INFO);
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_cli_parsing() {
        let args =
            ServiceArgs::try_parse_from(["iosrv", "--config", "a.yaml", "--simulate", "--validate"])
                .unwrap();
        assert_eq!(args.config, "a.yaml");
        assert!(args.simulate);
        assert!(args.validate);
    }
}
