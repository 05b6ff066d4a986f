//! portway binary entry point.
//!
//! Loads and validates the JSON configuration, initializes logging, and runs
//! the supervisor until the process receives an interrupt or termination
//! signal. A second signal forces immediate exit.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use portway::config::{BasicValidator, ConfigLoader, PortConflictValidator};
use portway::proxy::Supervisor;

/// Multi-tenant TCP reverse proxy.
#[derive(Debug, Parser)]
#[command(name = "portway", version)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Numeric log level: 0=debug, 1=info, 2=warn, 3=error, 7=disabled.
    #[arg(long, default_value_t = 0)]
    log_level: u8,
}

/// Map the numeric log level onto a tracing filter directive.
///
/// Levels 4 (fatal) and 5 (panic) have no tracing equivalent and collapse
/// into `error`; 6 is reserved and rejected.
fn level_directive(level: u8) -> Result<&'static str> {
    match level {
        0 => Ok("debug"),
        1 => Ok("info"),
        2 => Ok("warn"),
        3 | 4 | 5 => Ok("error"),
        7 => Ok("off"),
        other => bail!("unsupported log level {other} (expected 0..7, 6 is reserved)"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = level_directive(cli.log_level)?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConfigLoader::new()
        .with_validator(BasicValidator::new())
        .with_validator(PortConflictValidator::new())
        .load(&cli.config)
        .context("loading configuration")?;

    let supervisor = Supervisor::new(&config).context("building applications")?;

    let signals = Signals::install().context("installing signal handlers")?;
    tokio::spawn(signals.watch(supervisor.shutdown_token()));

    supervisor.run().await;
    Ok(())
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Cancel the token on the first signal; exit on the second.
    async fn watch(mut self, token: CancellationToken) {
        tokio::select! {
            _ = self.interrupt.recv() => {},
            _ = self.terminate.recv() => {},
        }
        info!("shutdown signal received");
        token.cancel();

        tokio::select! {
            _ = self.interrupt.recv() => {},
            _ = self.terminate.recv() => {},
        }
        warn!("second signal, exiting immediately");
        std::process::exit(1);
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn watch(self, token: CancellationToken) {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            token.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second signal, exiting immediately");
            std::process::exit(1);
        }
    }
}
