//! Engine API wire types and the normalized observed item.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};
use twinmon_core::{CONTAINER_GROUP_TYPE, CONTAINER_TYPE, Status};

use crate::format::{format_filesystem, format_ports};

/// Compose project label. Its presence makes an item a container group.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// Compose service label.
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// Length of the id used as a name for unnamed containers.
const SHORT_ID_LEN: usize = 12;

// ═══════════════════════════════════════════════════════════════════════════
// ENGINE API TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// One entry of `GET /containers/json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerSummary {
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub names: Vec<String>,
    pub image: String,
    pub command: String,
    pub created: i64,
    pub state: String,
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ports: Vec<Port>,
    #[serde(deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,
    pub size_rw: Option<i64>,
    pub size_root_fs: Option<i64>,
    pub host_config: HostConfig,
    pub network_settings: NetworkSettings,
}

impl ContainerSummary {
    /// Minimal listing entry.
    pub fn new(id: impl Into<String>, name: &str, state: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            names: vec![format!("/{}", name.trim_start_matches('/'))],
            state: state.into(),
            ..Self::default()
        }
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Mark as a member of a compose project.
    #[must_use]
    pub fn with_compose(self, project: &str, service: &str) -> Self {
        self.with_label(COMPOSE_PROJECT_LABEL, project)
            .with_label(COMPOSE_SERVICE_LABEL, service)
    }
}

/// A port mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    #[serde(rename = "IP", default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(rename = "PrivatePort", default)]
    pub private_port: u16,
    #[serde(rename = "PublicPort", default, skip_serializing_if = "Option::is_none")]
    pub public_port: Option<u16>,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HostConfig {
    pub network_mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkSettings {
    #[serde(deserialize_with = "null_as_default")]
    pub networks: HashMap<String, serde_json::Value>,
}

/// Resource usage of one container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// System CPU usage.
    pub cpu: u64,
    /// Memory usage in bytes.
    pub memory: u64,
    /// Transmitted bytes summed over all interfaces.
    #[serde(rename = "netio")]
    pub net_tx: u64,
}

// ═══════════════════════════════════════════════════════════════════════════
// OBSERVED ITEMS
// ═══════════════════════════════════════════════════════════════════════════

/// Container attributes published as the twin fragment.
///
/// Empty fields are omitted from the JSON body. Labels are kept for
/// filtering and never serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDetails {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "containerId", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(rename = "containerStatus", skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ports: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub networks: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub filesystem: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub network_mode: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    #[serde(skip)]
    pub labels: BTreeMap<String, String>,
}

/// A container or compose service as seen on this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedItem {
    /// `<project>@<service>` for compose members, the container name otherwise.
    pub name: String,
    pub status: Status,
    /// `container` or `container-group`.
    pub service_type: String,
    pub container: ContainerDetails,
    pub time: DateTime<Utc>,
}

impl ObservedItem {
    /// Normalize an engine listing entry.
    pub fn from_summary(summary: &ContainerSummary, time: DateTime<Utc>) -> Self {
        let name = summary
            .names
            .iter()
            .map(|n| n.trim_start_matches('/'))
            .find(|n| !n.is_empty())
            .map_or_else(
                || summary.id.chars().take(SHORT_ID_LEN).collect(),
                str::to_string,
            );
        let project_name = label(summary, COMPOSE_PROJECT_LABEL);
        let service_name = label(summary, COMPOSE_SERVICE_LABEL);
        let service_type = if summary.labels.contains_key(COMPOSE_PROJECT_LABEL) {
            CONTAINER_GROUP_TYPE
        } else {
            CONTAINER_TYPE
        };

        let container = ContainerDetails {
            name,
            id: summary.id.clone(),
            state: summary.state.clone(),
            status: summary.status.clone(),
            created_at: DateTime::from_timestamp(summary.created, 0)
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            image: summary.image.clone(),
            ports: format_ports(&summary.ports),
            networks: summary.network_settings.networks.keys().sorted().join(","),
            filesystem: format_filesystem(
                summary.size_rw.unwrap_or(0),
                summary.size_root_fs.unwrap_or(0),
            ),
            command: summary.command.clone(),
            network_mode: summary.host_config.network_mode.clone(),
            service_name,
            project_name,
            labels: summary
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };

        Self {
            name: display_name(&container),
            status: Status::from_engine_state(&summary.state),
            service_type: service_type.to_string(),
            container,
            time,
        }
    }

    /// Engine container id.
    pub fn id(&self) -> &str {
        &self.container.id
    }
}

/// Display name of a container: `project@service` for compose members.
pub fn display_name(container: &ContainerDetails) -> String {
    if container.project_name.is_empty() {
        container.name.clone()
    } else {
        format!("{}@{}", container.project_name, container.service_name)
    }
}

/// Podman reports missing collections as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn label(summary: &ContainerSummary, key: &str) -> String {
    summary.labels.get(key).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    fn summary(value: serde_json::Value) -> ContainerSummary {
        serde_json::from_value(value).unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_unnamed_container_uses_short_id() {
        let item = ObservedItem::from_summary(
            &summary(json!({
                "Id": "0123456789abcdef0123",
                "Names": [],
                "State": "running"
            })),
            now(),
        );

        assert_eq!(item.name, "0123456789ab");
        assert_eq!(item.container.name, "0123456789ab");
    }

    #[test]
    fn test_plain_container_is_normalized() {
        let item = ObservedItem::from_summary(
            &summary(json!({
                "Id": "abc123",
                "Names": ["/nginx"],
                "Image": "nginx:latest",
                "Command": "nginx -g 'daemon off;'",
                "Created": 1_700_000_000,
                "State": "running",
                "Status": "Up 2 hours",
                "Ports": [{"IP": "0.0.0.0", "PrivatePort": 80, "PublicPort": 8080, "Type": "tcp"}],
                "Labels": {"maintainer": "me"},
                "SizeRw": 1234,
                "HostConfig": {"NetworkMode": "bridge"},
                "NetworkSettings": {"Networks": {"bridge": {}}}
            })),
            now(),
        );

        assert_eq!(item.name, "nginx");
        assert_eq!(item.status, Status::Up);
        assert_eq!(item.service_type, "container");
        assert_eq!(item.id(), "abc123");
        assert_eq!(
            serde_json::to_value(&item.container).unwrap(),
            json!({
                "containerId": "abc123",
                "state": "running",
                "containerStatus": "Up 2 hours",
                "createdAt": "2023-11-14T22:13:20Z",
                "image": "nginx:latest",
                "ports": "0.0.0.0:8080:80/tcp",
                "networks": "bridge",
                "filesystem": "1.23kB",
                "command": "nginx -g 'daemon off;'",
                "networkMode": "bridge"
            })
        );
    }

    #[test]
    fn test_compose_member_is_container_group() {
        let item = ObservedItem::from_summary(
            &summary(json!({
                "Id": "def456",
                "Names": ["/app-web-1"],
                "State": "exited",
                "Labels": {
                    "com.docker.compose.project": "app",
                    "com.docker.compose.service": "web"
                }
            })),
            now(),
        );

        assert_eq!(item.name, "app@web");
        assert_eq!(item.container.name, "app-web-1");
        assert_eq!(item.status, Status::Down);
        assert_eq!(item.service_type, "container-group");

        let body = serde_json::to_value(&item.container).unwrap();
        assert_eq!(body["projectName"], "app");
        assert_eq!(body["serviceName"], "web");
        assert!(body.get("labels").is_none());
        assert!(body.get("ports").is_none());
    }

    #[test]
    fn test_null_collections_are_accepted() {
        let parsed = summary(json!({"Id": "x", "Names": null, "Labels": null, "Ports": null}));
        assert!(parsed.names.is_empty());
        assert!(parsed.labels.is_empty());
    }

    #[test]
    fn test_unknown_state() {
        let item = ObservedItem::from_summary(
            &summary(json!({"Id": "x", "Names": ["/x"], "State": ""})),
            now(),
        );
        assert_eq!(item.status, Status::Unknown);
    }

    #[test]
    fn test_stats_shape() {
        let stats = StatsSnapshot {
            cpu: 10,
            memory: 20,
            net_tx: 30,
        };
        assert_eq!(
            serde_json::to_value(stats).unwrap(),
            json!({"cpu": 10, "memory": 20, "netio": 30})
        );
    }
}
