//! CLI integration tests.
//!
//! Tests verify that:
//! - `run` flags parse and override the config file
//! - Invalid flag values are rejected after layering
//! - Global options work before and after the subcommand

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]

use std::io::Write;

use clap::Parser;
use twinmon::cli::{Cli, Commands};
use twinmon::commands::load_settings;

/// Test helper: Unwrap a Result or panic with context
fn unwrap_result<T, E: std::fmt::Display>(result: std::result::Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{}: {}", context, e),
    }
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = unwrap_result(tempfile::NamedTempFile::new(), "temp file");
    unwrap_result(file.write_all(contents.as_bytes()), "write config");
    file
}

#[test]
fn run_flags_parse() {
    // GIVEN: A run command line with repeated and comma separated filters
    let args = [
        "twinmon",
        "run",
        "--once",
        "--name",
        "web",
        "--name",
        "db,cache",
        "--label",
        "tier=front",
        "--device-id",
        "dev01",
        "--interval",
        "120",
    ];

    // WHEN: Parsing
    let cli = unwrap_result(Cli::try_parse_from(args), "run flags should parse");

    // THEN: Every flag lands in the run arguments
    let Commands::Run(run) = cli.command else {
        panic!("expected the run command");
    };
    assert!(run.once);
    assert_eq!(run.filter.names, vec!["web", "db,cache"]);
    assert_eq!(run.filter.labels, vec!["tier=front"]);
    assert_eq!(run.device_id.as_deref(), Some("dev01"));
    assert_eq!(run.interval, Some(120));
    assert_eq!(cli.log_level, "info");
}

#[test]
fn global_options_follow_the_subcommand() {
    // GIVEN: Global options placed after the subcommand
    let args = ["twinmon", "list", "--json", "--log-level", "debug", "--config", "/tmp/x.toml"];

    // WHEN: Parsing
    let cli = unwrap_result(Cli::try_parse_from(args), "list should parse");

    // THEN: They are still picked up
    assert_eq!(cli.log_level, "debug");
    assert_eq!(
        cli.config.as_deref().and_then(|p| p.to_str()),
        Some("/tmp/x.toml")
    );
    assert!(matches!(cli.command, Commands::List { json: true, .. }));
}

#[test]
fn flags_override_config_file() {
    // GIVEN: A config file and a command line overriding part of it
    let file = config_file(
        r#"
[monitor]
service_name = "from-file"
interval_secs = 600

[monitor.filter]
exclude_names = ["^buildkit"]
"#,
    );
    let cli = unwrap_result(
        Cli::try_parse_from(["twinmon", "run", "--service-name", "from-flag", "--interval", "30"]),
        "run should parse",
    );
    let Commands::Run(run) = cli.command else {
        panic!("expected the run command");
    };

    // WHEN: Loading the settings
    let settings = unwrap_result(
        load_settings(Some(file.path()), |s| run.apply(s)),
        "settings should load",
    );

    // THEN: Flags win, untouched file values survive
    assert_eq!(settings.monitor.service_name, "from-flag");
    assert_eq!(settings.monitor.interval_secs, 30);
    assert_eq!(settings.monitor.filter.exclude_names, vec!["^buildkit"]);

    // AND: The interval is clamped when used
    assert_eq!(settings.polling_interval().as_secs(), 60);
}

#[test]
fn invalid_device_topic_flag_is_rejected() {
    // GIVEN: A malformed device topic id on the command line
    let cli = unwrap_result(
        Cli::try_parse_from(["twinmon", "run", "--mqtt-device-topic-id", "device/main"]),
        "run should parse",
    );
    let Commands::Run(run) = cli.command else {
        panic!("expected the run command");
    };
    let file = config_file("");

    // WHEN: Loading the settings
    let result = load_settings(Some(file.path()), |s| run.apply(s));

    // THEN: Validation fails
    assert!(result.is_err());
}
