//! CLI command handlers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::{error, info, warn};
use twinmon_bus::{MqttClient, MqttConfig};
use twinmon_cloud::CumulocityClient;
use twinmon_core::Settings;
use twinmon_engine::{DockerClient, FilterCriteria, InventoryLister, ObservedItem};
use twinmon_reconciler::{App, AppConfig};

use crate::cli::Commands;

/// Time given to the broker to replay retained registrations after connect.
const STORE_SETTLE: Duration = Duration::from_millis(200);

/// Execute a CLI command.
///
/// This is the main command dispatcher that routes to the appropriate handler.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the command fails.
pub async fn execute_command(config: Option<&Path>, command: Commands) -> Result<()> {
    match command {
        Commands::Run(args) => cmd_run(load_settings(config, |s| args.apply(s))?, args.once).await,
        Commands::List {
            filter,
            engine_host,
            json,
        } => {
            let settings = load_settings(config, |s| {
                filter.apply(s);
                if let Some(host) = &engine_host {
                    s.monitor.engine.host = Some(host.clone());
                }
            })?;
            cmd_list(&settings, json).await
        }
        Commands::Config => cmd_config(&load_settings(config, |_| {})?),
    }
}

/// Load defaults, file and environment, then apply the flags.
///
/// # Errors
///
/// Returns an error if loading fails or the flags produce invalid settings.
pub fn load_settings<F>(config: Option<&Path>, flags: F) -> Result<Settings>
where
    F: FnOnce(&mut Settings),
{
    let mut settings = Settings::load(config).context("Failed to load configuration")?;
    flags(&mut settings);
    settings
        .validate()
        .context("Invalid command line options")?;
    Ok(settings)
}

/// Run the monitor, once or until interrupted.
async fn cmd_run(settings: Settings, once: bool) -> Result<()> {
    settings.log_summary();
    let monitor = &settings.monitor;

    let bus = MqttClient::connect(MqttConfig::from_settings(monitor))
        .await
        .context("Failed to connect to the MQTT broker")?;
    let engine = DockerClient::from_host(monitor.engine.host.as_deref())
        .context("Failed to locate the container engine")?;
    let cloud = CumulocityClient::new(&monitor.c8y).context("Failed to create cloud client")?;

    let config = AppConfig::from_settings(&settings);
    let criteria = config.criteria.clone();
    let app = App::start(config, Arc::new(bus), Arc::new(engine), Arc::new(cloud)).await;

    tokio::time::sleep(STORE_SETTLE).await;

    if once {
        // A clean stop keeps the service "up": the last will is only sent
        // when the connection drops unexpectedly.
        let result = app.update(criteria).await;
        app.stop(true).await.context("Failed to stop cleanly")?;
        let summary = result.context("Update failed")?;
        info!(
            observed = summary.observed,
            registered = summary.registered,
            removed = summary.removed.len(),
            failed = summary.failed_count(),
            "Update finished"
        );
        return Ok(());
    }

    if let Err(e) = app.update(criteria.clone()).await {
        warn!(error = %e, "Failed to update container state");
    }
    if let Err(e) = app.subscribe_commands().await {
        warn!(error = %e, "Failed to subscribe to health check commands");
    }

    let app = Arc::new(app);
    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor_task = {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            if let Err(e) = app.monitor(stop_rx, criteria).await {
                error!(error = %e, "Event monitor failed");
            }
        })
    };
    let (polling_task, polling) = app.run_polling();

    info!("twinmon is running. Press Ctrl+C or send SIGTERM to stop.");
    wait_for_shutdown().await;

    let _ = stop_tx.send(true);
    polling.stop();
    let _ = monitor_task.await;
    let _ = polling_task.await;

    app.stop(false).await.context("Failed to stop")?;
    info!("Shutting down...");
    Ok(())
}

/// Print the containers matching the configured filters.
async fn cmd_list(settings: &Settings, json: bool) -> Result<()> {
    let engine = DockerClient::from_host(settings.monitor.engine.host.as_deref())
        .context("Failed to locate the container engine")?;
    let lister = InventoryLister::new(Arc::new(engine));
    let items = lister
        .list(&FilterCriteria::from(&settings.monitor.filter))
        .await
        .context("Failed to list containers")?;

    if json {
        let rendered = serde_json::to_string_pretty(
            &items.iter().map(|item| &item.container).collect::<Vec<_>>(),
        )
        .context("Failed to render containers")?;
        println!("{rendered}");
    } else {
        print!("{}", render_table(&items));
    }
    Ok(())
}

/// Print the effective settings as TOML.
fn cmd_config(settings: &Settings) -> Result<()> {
    let rendered = toml::to_string_pretty(settings).context("Failed to render settings")?;
    print!("{rendered}");
    Ok(())
}

/// One line per item: name, type, status, id.
pub fn render_table(items: &[ObservedItem]) -> String {
    let width = items
        .iter()
        .map(|item| item.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let mut out = format!("{:<width$}  {:<15}  {:<7}  ID\n", "NAME", "TYPE", "STATUS");
    for item in items {
        let id: String = item.id().chars().take(12).collect();
        out.push_str(&format!(
            "{:<width$}  {:<15}  {:<7}  {id}\n",
            item.name, item.service_type, item.status
        ));
    }
    out
}

/// Signal that ended the long-running mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", err);
        }
    };
    let terminate = async {
        match signal::unix::signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    let received = first_signal(interrupt, terminate).await;
    info!(signal = %received, "Received shutdown signal, initiating graceful shutdown");
}

/// Resolve with whichever signal future completes first.
pub async fn first_signal<I, T>(interrupt: I, terminate: T) -> ShutdownSignal
where
    I: Future<Output = ()>,
    T: Future<Output = ()>,
{
    tokio::select! {
        () = interrupt => ShutdownSignal::Interrupt,
        () = terminate => ShutdownSignal::Terminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{FilterArgs, RunArgs};
    use chrono::Utc;
    use std::future::pending;
    use twinmon_engine::ContainerSummary;

    #[tokio::test]
    async fn test_sigterm_ends_long_running_mode() {
        let received = first_signal(pending::<()>(), async {}).await;
        assert_eq!(received, ShutdownSignal::Terminate);
        assert_eq!(received.to_string(), "SIGTERM");
    }

    #[tokio::test]
    async fn test_interrupt_ends_long_running_mode() {
        let received = first_signal(async {}, pending::<()>()).await;
        assert_eq!(received, ShutdownSignal::Interrupt);
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let now = Utc::now();
        let items = vec![
            ObservedItem::from_summary(&ContainerSummary::new("0123456789abcdef", "nginx", "running"), now),
            ObservedItem::from_summary(
                &ContainerSummary::new("fedcba", "app-web-1", "exited").with_compose("app", "web"),
                now,
            ),
        ];

        let table = render_table(&items);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME "));
        assert!(lines[1].starts_with("nginx    container        up       0123456789ab"));
        assert!(lines[2].starts_with("app@web  container-group  down     fedcba"));
    }

    #[test]
    fn test_unused_filter_args_keep_settings() {
        let mut settings = Settings::default();
        FilterArgs::default().apply(&mut settings);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_run_args_apply_flags() {
        let mut settings = Settings::default();
        let args = RunArgs {
            service_name: Some("monitor".to_string()),
            interval: Some(120),
            filter: FilterArgs {
                names: vec!["web,db".to_string()],
                ..FilterArgs::default()
            },
            ..RunArgs::default()
        };
        args.apply(&mut settings);

        assert_eq!(settings.monitor.service_name, "monitor");
        assert_eq!(settings.monitor.interval_secs, 120);
        assert_eq!(settings.monitor.filter.names, vec!["web", "db"]);
    }
}
