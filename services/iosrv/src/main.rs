//! iosrv entry point

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use common::config_loader::{get_config_value, get_string_config};
use common::logging::{self, LogConfig};
use common::ServiceArgs;
use iosrv::{ControlLoop, IoSrvConfig, SERVICE_NAME, SERVICE_VERSION};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServiceArgs::parse();

    let mut config = IoSrvConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    if let Some(bind) = &args.bind_address {
        apply_bind_override(&mut config, bind)?;
    }

    init_logging(&args, &config)?;
    info!("Starting {} v{}", SERVICE_NAME, SERVICE_VERSION);

    config.validate().context("Invalid configuration")?;
    if args.validate {
        info!(
            "Configuration {} is valid: {} devices",
            args.config,
            config.devices.len()
        );
        return Ok(());
    }

    let simulate = get_config_value("IOSRV_SIMULATE", args.simulate.then_some(true), false);
    let control = ControlLoop::from_config(&config, simulate)
        .await
        .context("Failed to start control loop")?;

    let token = common::shutdown::shutdown_token();
    spawn_reload_handler(args.config.clone(), token.clone());

    control.run(token).await;
    info!("{} stopped", SERVICE_NAME);
    Ok(())
}

fn apply_bind_override(config: &mut IoSrvConfig, bind: &str) -> Result<()> {
    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", bind))?;
    config.modbus.address = addr.ip().to_string();
    config.modbus.port = addr.port();
    Ok(())
}

fn init_logging(args: &ServiceArgs, config: &IoSrvConfig) -> Result<()> {
    let mut log_config = LogConfig::new(SERVICE_NAME);
    log_config.level = args.log_level.clone().or_else(|| config.logging.level.clone());
    log_config.ansi = !args.no_color;
    if config.logging.file {
        let dir = get_string_config("IOSRV_LOG_DIR", config.logging.dir.clone(), "logs");
        log_config.log_dir = Some(PathBuf::from(dir));
    }
    logging::init_with_config(log_config).context("Failed to initialize logging")
}

/// Reapply `logging.level` from the config file on SIGHUP
///
/// Devices and register layout are fixed at startup; only the log filter
/// follows the file.
fn spawn_reload_handler(config_path: String, token: CancellationToken) {
    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sig) => sig,
            Err(e) => {
                warn!("Failed to install SIGHUP handler: {}", e);
                return;
            },
        };

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sighup.recv() => {},
            }
            info!("Received SIGHUP, reloading log level from {}", config_path);
            match IoSrvConfig::load(&config_path) {
                Ok(reloaded) => {
                    let level = reloaded.logging.level.unwrap_or_else(|| "info".to_string());
                    if level == logging::get_log_level() {
                        continue;
                    }
                    if let Err(e) = logging::set_log_level(&level) {
                        error!("{}", e);
                    }
                },
                Err(e) => error!("Reload failed: {}", e),
            }
        }
    });

    #[cfg(not(unix))]
    drop((config_path, token));
}
