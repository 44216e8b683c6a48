//! Inventory filter criteria.
//!
//! Include filters (names, labels, ids) are sent to the engine, which ORs
//! them. Client side filters (types, excluded names, excluded labels) are
//! applied afterwards as AND/NOT. A criteria without include filters is a
//! full scan, and only a full scan may remove stale entities.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::warn;
use twinmon_core::FilterSettings;

use crate::model::ObservedItem;

/// What to list on a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Container name regexes.
    pub names: Vec<String>,
    /// `key` or `key=value` label selectors.
    pub labels: Vec<String>,
    /// Container id prefixes.
    pub ids: Vec<String>,
    /// Allowed service types. Empty allows all.
    pub types: Vec<String>,
    /// Regexes matched against the container name and the display name.
    pub exclude_names: Vec<String>,
    /// Labels whose presence excludes a container.
    pub exclude_labels: Vec<String>,
}

impl FilterCriteria {
    /// True when no include filter is set.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.labels.is_empty() && self.ids.is_empty()
    }

    /// Keep only the client side filters.
    #[must_use]
    pub fn client_side_only(&self) -> Self {
        Self {
            names: Vec::new(),
            labels: Vec::new(),
            ids: Vec::new(),
            types: self.types.clone(),
            exclude_names: self.exclude_names.clone(),
            exclude_labels: self.exclude_labels.clone(),
        }
    }

    /// Targeted criteria for the given container ids.
    #[must_use]
    pub fn with_ids<I, S>(&self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..self.client_side_only()
        }
    }

    /// Targeted criteria for the given name regexes.
    #[must_use]
    pub fn with_names<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ..self.client_side_only()
        }
    }

    /// The part evaluated by the engine.
    pub fn server_filter(&self) -> ServerFilter {
        ServerFilter {
            names: self.names.clone(),
            ids: self.ids.clone(),
            labels: self.labels.clone(),
        }
    }

    /// The part evaluated after listing.
    pub fn client_filter(&self) -> ClientFilter {
        ClientFilter::compile(self)
    }
}

impl From<&FilterSettings> for FilterCriteria {
    fn from(settings: &FilterSettings) -> Self {
        Self {
            names: settings.names.clone(),
            labels: settings.labels.clone(),
            ids: settings.ids.clone(),
            types: settings.types.clone(),
            exclude_names: settings.exclude_names.clone(),
            exclude_labels: settings.exclude_labels.clone(),
        }
    }
}

/// Include filters passed to the engine. Matching any one selects a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerFilter {
    pub names: Vec<String>,
    pub ids: Vec<String>,
    pub labels: Vec<String>,
}

impl ServerFilter {
    /// True when every container is selected.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.ids.is_empty() && self.labels.is_empty()
    }

    /// Engine API `filters` query value, e.g. `{"id":["abc"]}`.
    pub fn to_query(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let query: BTreeMap<&str, &[String]> = [
            ("name", self.names.as_slice()),
            ("id", self.ids.as_slice()),
            ("label", self.labels.as_slice()),
        ]
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .collect();
        serde_json::to_string(&query).ok()
    }
}

/// Compiled client side filters.
#[derive(Debug, Clone, Default)]
pub struct ClientFilter {
    types: Vec<String>,
    exclude_names: Vec<Regex>,
    exclude_labels: Vec<String>,
}

impl ClientFilter {
    /// Compile the exclusion patterns. Invalid patterns are logged and skipped.
    pub fn compile(criteria: &FilterCriteria) -> Self {
        let exclude_names = criteria
            .exclude_names
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Invalid exclude name pattern");
                    None
                }
            })
            .collect();

        Self {
            types: criteria.types.clone(),
            exclude_names,
            exclude_labels: criteria.exclude_labels.clone(),
        }
    }

    /// Whether an observed item passes every client side filter.
    pub fn accepts(&self, item: &ObservedItem) -> bool {
        if !self.types.is_empty() && !self.types.contains(&item.service_type) {
            return false;
        }

        let excluded_by_name = self
            .exclude_names
            .iter()
            .any(|regex| regex.is_match(&item.container.name) || regex.is_match(&item.name));
        if excluded_by_name {
            return false;
        }

        !self
            .exclude_labels
            .iter()
            .any(|label| item.container.labels.contains_key(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContainerDetails, ObservedItem};
    use chrono::Utc;
    use twinmon_core::Status;

    fn item(name: &str, display: &str, service_type: &str, labels: &[&str]) -> ObservedItem {
        ObservedItem {
            name: display.to_string(),
            status: Status::Up,
            service_type: service_type.to_string(),
            container: ContainerDetails {
                name: name.to_string(),
                labels: labels
                    .iter()
                    .map(|l| ((*l).to_string(), String::new()))
                    .collect(),
                ..ContainerDetails::default()
            },
            time: Utc::now(),
        }
    }

    #[test]
    fn test_is_empty_ignores_client_side_filters() {
        let criteria = FilterCriteria {
            types: vec!["container".to_string()],
            exclude_names: vec!["^tmp".to_string()],
            exclude_labels: vec!["skip".to_string()],
            ..FilterCriteria::default()
        };
        assert!(criteria.is_empty());
        assert!(!criteria.with_ids(["abc"]).is_empty());
        assert!(!criteria.with_names(["^web$"]).is_empty());
    }

    #[test]
    fn test_targeted_criteria_keep_exclusions() {
        let base = FilterCriteria {
            names: vec!["db".to_string()],
            exclude_labels: vec!["skip".to_string()],
            ..FilterCriteria::default()
        };
        let targeted = base.with_ids(["abc"]);
        assert_eq!(targeted.ids, vec!["abc".to_string()]);
        assert!(targeted.names.is_empty());
        assert_eq!(targeted.exclude_labels, vec!["skip".to_string()]);
        assert!(base.client_side_only().is_empty());
    }

    #[test]
    fn test_server_query() {
        let criteria = FilterCriteria {
            names: vec!["^web$".to_string()],
            ids: vec!["abc".to_string()],
            ..FilterCriteria::default()
        };
        assert_eq!(
            criteria.server_filter().to_query().as_deref(),
            Some(r#"{"id":["abc"],"name":["^web$"]}"#)
        );
        assert_eq!(FilterCriteria::default().server_filter().to_query(), None);
    }

    #[test]
    fn test_type_allow_list() {
        let filter = FilterCriteria {
            types: vec!["container".to_string()],
            ..FilterCriteria::default()
        }
        .client_filter();
        assert!(filter.accepts(&item("web", "web", "container", &[])));
        assert!(!filter.accepts(&item("app-web-1", "app@web", "container-group", &[])));
    }

    #[test]
    fn test_exclude_names_match_either_name() {
        let filter = FilterCriteria {
            exclude_names: vec!["^app@".to_string(), "^buildkit".to_string()],
            ..FilterCriteria::default()
        }
        .client_filter();
        assert!(!filter.accepts(&item("app-web-1", "app@web", "container-group", &[])));
        assert!(!filter.accepts(&item("buildkitd", "buildkitd", "container", &[])));
        assert!(filter.accepts(&item("web", "web", "container", &[])));
    }

    #[test]
    fn test_invalid_exclude_pattern_is_skipped() {
        let filter = FilterCriteria {
            exclude_names: vec!["([".to_string(), "^web$".to_string()],
            ..FilterCriteria::default()
        }
        .client_filter();
        assert!(!filter.accepts(&item("web", "web", "container", &[])));
        assert!(filter.accepts(&item("db", "db", "container", &[])));
    }

    #[test]
    fn test_exclude_label_presence() {
        let filter = FilterCriteria {
            exclude_labels: vec!["tedge.ignore".to_string()],
            ..FilterCriteria::default()
        }
        .client_filter();
        assert!(!filter.accepts(&item("web", "web", "container", &["tedge.ignore"])));
        assert!(filter.accepts(&item("web", "web", "container", &["other"])));
    }
}
