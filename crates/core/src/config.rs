//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Config file: `--config <path>`, else `~/.config/twinmon/config.toml`
//! 3. Environment variables: `TWINMON_*`
//! 4. CLI flags (applied by the binary)
//!
//! # Example Config
//!
//! ```toml
//! log_level = "debug"
//!
//! [monitor]
//! service_name = "tedge-container-monitor"
//! interval_secs = 300
//!
//! [monitor.mqtt]
//! topic_root = "te"
//! device_topic_id = "device/main//"
//! host = "127.0.0.1"
//! port = 1883
//!
//! [monitor.filter]
//! exclude_names = ["^buildkit"]
//!
//! [monitor.delete_from_cloud]
//! enabled = true
//! grace_ms = 500
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::target::Target;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TWINMON_";

/// Lowest accepted polling interval.
pub const MIN_INTERVAL: Duration = Duration::from_secs(60);

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub monitor: MonitorSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorSettings {
    pub service_name: String,
    pub interval_secs: u64,
    pub identity_retry_secs: u64,
    pub mqtt: MqttSettings,
    pub c8y: CloudSettings,
    pub engine: EngineSettings,
    pub filter: FilterSettings,
    pub metrics: MetricsSettings,
    pub events: Toggle,
    pub delete_from_cloud: DeletionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MqttSettings {
    pub topic_root: String,
    pub device_topic_id: String,
    pub device_id: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CloudSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine endpoint (`unix:///run/docker.sock`, `tcp://host:2375`).
    /// Auto-detected when unset.
    pub host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilterSettings {
    pub names: Vec<String>,
    pub labels: Vec<String>,
    pub ids: Vec<String>,
    pub types: Vec<String>,
    pub exclude_names: Vec<String>,
    pub exclude_labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Toggle {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeletionSettings {
    pub enabled: bool,
    pub grace_ms: u64,
}

// ═══════════════════════════════════════════════════════════════════════════
// DEFAULT IMPLEMENTATIONS
// ═══════════════════════════════════════════════════════════════════════════

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            monitor: MonitorSettings::default(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            service_name: "tedge-container-monitor".to_string(),
            interval_secs: 300,
            identity_retry_secs: 10,
            mqtt: MqttSettings::default(),
            c8y: CloudSettings::default(),
            engine: EngineSettings::default(),
            filter: FilterSettings::default(),
            metrics: MetricsSettings::default(),
            events: Toggle::default(),
            delete_from_cloud: DeletionSettings::default(),
        }
    }
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            topic_root: "te".to_string(),
            device_topic_id: "device/main//".to_string(),
            device_id: String::new(),
            host: "127.0.0.1".to_string(),
            port: 1883,
        }
    }
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            labels: Vec::new(),
            ids: Vec::new(),
            types: vec!["container".to_string(), "container-group".to_string()],
            exclude_names: Vec::new(),
            exclude_labels: Vec::new(),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for Toggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for DeletionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_ms: 500,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

impl Settings {
    /// Load configuration from defaults, file and process environment.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - An explicit config file does not exist or cannot be read
    /// - A config file is malformed TOML
    /// - An environment override has an invalid value
    /// - The final values fail validation
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with_env(explicit, |key| std::env::var(key).ok())
    }

    /// Load configuration with a custom environment lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Settings::load`].
    pub fn load_with_env<F>(explicit: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        settings.apply_env(env)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read a TOML file on top of the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is malformed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config_read_failed(path, e.to_string()))?;

        let settings: Self = toml::from_str(&content)
            .map_err(|e| Error::config_parse_failed(path, e.to_string()))?;

        info!(path = %path.display(), "Using config file");
        Ok(settings)
    }

    /// Apply `TWINMON_*` overrides.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric or boolean override cannot be parsed.
    pub fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| env(&format!("{ENV_PREFIX}{name}"));
        let monitor = &mut self.monitor;

        if let Some(value) = var("LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = var("SERVICE_NAME") {
            monitor.service_name = value;
        }
        if let Some(value) = var("INTERVAL_SECS") {
            monitor.interval_secs = parse_env("INTERVAL_SECS", &value)?;
        }
        if let Some(value) = var("TOPIC_ROOT") {
            monitor.mqtt.topic_root = value;
        }
        if let Some(value) = var("DEVICE_TOPIC_ID") {
            monitor.mqtt.device_topic_id = value;
        }
        if let Some(value) = var("DEVICE_ID") {
            monitor.mqtt.device_id = value;
        }
        if let Some(value) = var("MQTT_HOST") {
            monitor.mqtt.host = value;
        }
        if let Some(value) = var("MQTT_PORT") {
            monitor.mqtt.port = parse_env("MQTT_PORT", &value)?;
        }
        if let Some(value) = var("C8Y_HOST") {
            monitor.c8y.host = value;
        }
        if let Some(value) = var("C8Y_PORT") {
            monitor.c8y.port = parse_env("C8Y_PORT", &value)?;
        }
        if let Some(value) = var("ENGINE_HOST") {
            monitor.engine.host = Some(value);
        }
        if let Some(value) = var("METRICS_ENABLED") {
            monitor.metrics.enabled = parse_env("METRICS_ENABLED", &value)?;
        }
        if let Some(value) = var("EVENTS_ENABLED") {
            monitor.events.enabled = parse_env("EVENTS_ENABLED", &value)?;
        }
        if let Some(value) = var("DELETE_FROM_CLOUD_ENABLED") {
            monitor.delete_from_cloud.enabled = parse_env("DELETE_FROM_CLOUD_ENABLED", &value)?;
        }
        if let Some(value) = var("DELETE_FROM_CLOUD_GRACE_MS") {
            monitor.delete_from_cloud.grace_ms = parse_env("DELETE_FROM_CLOUD_GRACE_MS", &value)?;
        }

        let filter = &mut monitor.filter;
        for (name, slot) in [
            ("FILTER_NAMES", &mut filter.names),
            ("FILTER_LABELS", &mut filter.labels),
            ("FILTER_IDS", &mut filter.ids),
            ("FILTER_TYPES", &mut filter.types),
            ("FILTER_EXCLUDE_NAMES", &mut filter.exclude_names),
            ("FILTER_EXCLUDE_LABELS", &mut filter.exclude_labels),
        ] {
            if let Some(value) = var(name) {
                *slot = expand_list([value]);
            }
        }

        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns error if the service name is empty, the topic root is empty,
    /// or the device topic id does not have four segments.
    pub fn validate(&self) -> Result<()> {
        let monitor = &self.monitor;
        if monitor.service_name.trim().is_empty() {
            return Err(Error::invalid_config("service_name must not be empty"));
        }
        if monitor.mqtt.topic_root.is_empty() {
            return Err(Error::invalid_config("mqtt.topic_root must not be empty"));
        }
        if !Target::is_valid_topic_id(&monitor.mqtt.device_topic_id) {
            return Err(Error::invalid_config(format!(
                "mqtt.device_topic_id '{}' must have 4 segments",
                monitor.mqtt.device_topic_id
            )));
        }
        Ok(())
    }

    /// The device this monitor runs on.
    pub fn device_target(&self) -> Target {
        let mqtt = &self.monitor.mqtt;
        Target::new(&mqtt.topic_root, &mqtt.device_topic_id, &mqtt.device_id)
    }

    /// Polling interval, raised to [`MIN_INTERVAL`] if configured lower.
    pub fn polling_interval(&self) -> Duration {
        let interval = Duration::from_secs(self.monitor.interval_secs);
        if interval < MIN_INTERVAL {
            warn!(
                old = ?interval,
                new = ?MIN_INTERVAL,
                "interval is lower than allowed limit"
            );
            return MIN_INTERVAL;
        }
        interval
    }

    /// Log every effective setting at info level.
    pub fn log_summary(&self) {
        match toml::to_string(self) {
            Ok(rendered) => rendered
                .lines()
                .filter(|line| !line.trim().is_empty())
                .for_each(|line| info!(item = line, "setting")),
            Err(e) => warn!(error = %e, "Could not render settings"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════

/// Expand comma separated values into a flat list, dropping empty items.
pub fn expand_list<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .flat_map(|value| {
            value
                .as_ref()
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Get path to the default config file
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "twinmon")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        Error::invalid_config(format!("Invalid {ENV_PREFIX}{name} value '{value}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.monitor.service_name, "tedge-container-monitor");
        assert_eq!(settings.monitor.mqtt.port, 1883);
        assert_eq!(settings.monitor.c8y.port, 8001);
        assert_eq!(settings.monitor.delete_from_cloud.grace_ms, 500);
        assert_eq!(
            settings.monitor.filter.types,
            vec!["container", "container-group"]
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
            [monitor.mqtt]
            host = "10.0.0.5"

            [monitor.filter]
            exclude_names = ["^buildkit"]
            "#,
        );

        let settings = Settings::load_with_env(Some(file.path()), env_from(&[])).unwrap();
        assert_eq!(settings.monitor.mqtt.host, "10.0.0.5");
        assert_eq!(settings.monitor.mqtt.port, 1883);
        assert_eq!(settings.monitor.filter.exclude_names, vec!["^buildkit"]);
        assert_eq!(settings.monitor.service_name, "tedge-container-monitor");
    }

    #[test]
    fn test_toggle_tables_default_to_enabled() {
        let file = write_config(
            r#"
            [monitor.events]

            [monitor.metrics]
            enabled = false
            "#,
        );

        let settings = Settings::load_with_env(Some(file.path()), env_from(&[])).unwrap();
        assert!(settings.monitor.events.enabled);
        assert!(!settings.monitor.metrics.enabled);
        assert_eq!(Toggle::default(), Toggle { enabled: true });
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config(
            r#"
            [monitor]
            service_name = "from-file"
            "#,
        );

        let settings = Settings::load_with_env(
            Some(file.path()),
            env_from(&[
                ("TWINMON_SERVICE_NAME", "from-env"),
                ("TWINMON_MQTT_PORT", "8883"),
                ("TWINMON_FILTER_EXCLUDE_LABELS", "a, b,,c"),
                ("TWINMON_DELETE_FROM_CLOUD_ENABLED", "false"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.monitor.service_name, "from-env");
        assert_eq!(settings.monitor.mqtt.port, 8883);
        assert_eq!(settings.monitor.filter.exclude_labels, vec!["a", "b", "c"]);
        assert!(!settings.monitor.delete_from_cloud.enabled);
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        let mut settings = Settings::default();
        let result = settings.apply_env(env_from(&[("TWINMON_MQTT_PORT", "not-a-port")]));
        assert!(result.is_err());
        assert!(
            result
                .err()
                .map(|e| e.to_string().contains("TWINMON_MQTT_PORT"))
                .unwrap_or(false)
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Settings::load_with_env(
            Some(Path::new("/nonexistent/twinmon.toml")),
            env_from(&[]),
        );
        assert!(matches!(result, Err(Error::ConfigReadFailed { .. })));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let file = write_config("[monitor\nservice_name = ");
        let result = Settings::load_with_env(Some(file.path()), env_from(&[]));
        assert!(matches!(result, Err(Error::ConfigParseFailed { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_topic_id() {
        let mut settings = Settings::default();
        settings.monitor.mqtt.device_topic_id = "device/main".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.monitor.service_name = "  ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_polling_interval_is_clamped() {
        let mut settings = Settings::default();
        settings.monitor.interval_secs = 5;
        assert_eq!(settings.polling_interval(), MIN_INTERVAL);

        settings.monitor.interval_secs = 120;
        assert_eq!(settings.polling_interval(), Duration::from_secs(120));
    }

    #[test]
    fn test_expand_list() {
        assert_eq!(
            expand_list(["a,b", "c", " d , "]),
            vec!["a", "b", "c", "d"]
        );
        assert!(expand_list(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_device_target() {
        let mut settings = Settings::default();
        settings.monitor.mqtt.device_id = "dev01".to_string();
        let device = settings.device_target();
        assert_eq!(device.topic(), "te/device/main//");
        assert_eq!(device.cloud_identity, "dev01");
    }
}
