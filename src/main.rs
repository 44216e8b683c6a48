//! # twinmon
//!
//! Entry point of the container digital-twin monitor.
//!
//! ## Run Sequence
//!
//! 1. **Configuration** - defaults, config file, `TWINMON_*` environment, flags
//! 2. **Transport** - connect to the MQTT broker and register the monitor
//! 3. **Identity** - resolve the device's cloud identity if not configured
//! 4. **Initial pass** - reconcile every container once
//! 5. **Triggers** - engine events, health check commands and the polling loop
//!
//! ## Shutdown
//!
//! Ctrl+C stops the triggers, waits for the in-flight pass, drains pending
//! cloud deletions and drops the connection so the broker publishes the
//! monitor's last will. `run --once` disconnects cleanly instead.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use twinmon::cli::Cli;
use twinmon::commands::execute_command;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level);

    execute_command(cli.config.as_deref(), cli.command).await
}

/// Initialize tracing subscriber with environment filter.
///
/// `RUST_LOG` wins over `--log-level`.
fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
