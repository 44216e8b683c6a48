//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use twinmon_core::{Settings, expand_list};

/// twinmon - container digital-twin monitor
#[derive(Parser, Debug)]
#[command(name = "twinmon")]
#[command(version)]
#[command(about = "Mirror containers and compose projects into thin-edge.io and Cumulocity")]
#[command(
    long_about = "twinmon registers every container and compose service on this host as a thin-edge.io service, keeps its health and twin data current, and removes services whose containers are gone."
)]
pub struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Config file (default: ~/.config/twinmon/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the container monitor
    Run(RunArgs),

    /// List the containers a pass would publish
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// Container engine socket or URL
        #[arg(long)]
        engine_host: Option<String>,

        /// Print JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

/// Flags of the `run` command.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Service name
    #[arg(long)]
    pub service_name: Option<String>,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// MQTT root prefix
    #[arg(long)]
    pub mqtt_topic_root: Option<String>,

    /// The device MQTT topic identifier
    #[arg(long)]
    pub mqtt_device_topic_id: Option<String>,

    /// Only run the monitor once
    #[arg(long, default_value_t = false)]
    pub once: bool,

    /// thin-edge.io device id
    #[arg(long)]
    pub device_id: Option<String>,

    /// Polling interval in seconds (minimum 60)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Container engine socket or URL
    #[arg(long)]
    pub engine_host: Option<String>,
}

/// Include and type filters shared by `run` and `list`.
///
/// Every flag may be repeated or take a comma separated list.
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Only include given container names (regex)
    #[arg(long = "name")]
    pub names: Vec<String>,

    /// Only include containers with the given labels
    #[arg(long = "label")]
    pub labels: Vec<String>,

    /// Only include containers with the given ids
    #[arg(long = "id")]
    pub ids: Vec<String>,

    /// Filter by container type
    #[arg(long = "type")]
    pub types: Vec<String>,
}

impl FilterArgs {
    /// Override the configured filters with the given flags.
    pub fn apply(&self, settings: &mut Settings) {
        let filter = &mut settings.monitor.filter;
        for (flags, slot) in [
            (&self.names, &mut filter.names),
            (&self.labels, &mut filter.labels),
            (&self.ids, &mut filter.ids),
            (&self.types, &mut filter.types),
        ] {
            if !flags.is_empty() {
                *slot = expand_list(flags);
            }
        }
    }
}

impl RunArgs {
    /// Override the configured settings with the given flags.
    pub fn apply(&self, settings: &mut Settings) {
        let monitor = &mut settings.monitor;
        if let Some(name) = &self.service_name {
            monitor.service_name.clone_from(name);
        }
        if let Some(root) = &self.mqtt_topic_root {
            monitor.mqtt.topic_root.clone_from(root);
        }
        if let Some(topic_id) = &self.mqtt_device_topic_id {
            monitor.mqtt.device_topic_id.clone_from(topic_id);
        }
        if let Some(device_id) = &self.device_id {
            monitor.mqtt.device_id.clone_from(device_id);
        }
        if let Some(interval) = self.interval {
            monitor.interval_secs = interval;
        }
        if let Some(host) = &self.engine_host {
            monitor.engine.host = Some(host.clone());
        }
        self.filter.apply(settings);
    }
}
