//! Core types for the reconciler.

use serde::Serialize;
use twinmon_bus::Message;
use twinmon_core::{HealthStatus, Registration, Target};
use twinmon_engine::ObservedItem;

use crate::error::Result;

/// An observed item and the entity it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedItem {
    pub target: Target,
    pub item: ObservedItem,
    /// Not yet registered before this pass.
    pub is_new: bool,
}

/// A registered entity with no observed counterpart in a full scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleEntity {
    pub target: Target,
    /// Cloud external id recorded on the entity (`@id`), if any.
    pub recorded_id: Option<String>,
}

impl StaleEntity {
    /// Create a stale entity.
    pub fn new(target: Target, recorded_id: Option<String>) -> Self {
        Self {
            target,
            recorded_id,
        }
    }

    /// External id to delete in the cloud: the recorded one, else derived
    /// from the target. `None` when neither is known.
    pub fn external_id(&self) -> Option<String> {
        self.recorded_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| self.target.external_id())
    }
}

/// Changes computed for one pass.
///
/// Every observed item gets health and twin updates; new ones are
/// registered first. `stale` is only populated for full scans and never
/// shares a topic with `observed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileDelta {
    /// Observed items, in listing order.
    pub observed: Vec<PlannedItem>,
    /// Entities to deregister, sorted by topic.
    pub stale: Vec<StaleEntity>,
}

impl ReconcileDelta {
    /// Items seen for the first time.
    pub fn to_register(&self) -> impl Iterator<Item = &PlannedItem> {
        self.observed.iter().filter(|planned| planned.is_new)
    }

    /// Items already registered before this pass.
    pub fn to_update(&self) -> impl Iterator<Item = &PlannedItem> {
        self.observed.iter().filter(|planned| !planned.is_new)
    }

    /// Registration, health and twin actions, in publish order.
    pub fn publish_actions(&self) -> Vec<ReconcileAction> {
        let registrations = self.to_register().map(|planned| ReconcileAction::Register {
            target: planned.target.clone(),
            registration: Registration::service(&planned.item.name, &planned.item.service_type),
        });
        let health = self.observed.iter().map(|planned| ReconcileAction::PublishHealth {
            target: planned.target.clone(),
            health: HealthStatus::at(planned.item.status, planned.item.time.timestamp()),
        });
        let twins = self.observed.iter().map(|planned| ReconcileAction::PublishTwin {
            target: planned.target.clone(),
            item: planned.item.clone(),
        });
        registrations.chain(health).chain(twins).collect()
    }

    /// Deregistration actions: per entity, twin then health then registration.
    pub fn removal_actions(&self) -> Vec<ReconcileAction> {
        self.stale
            .iter()
            .flat_map(|stale| {
                [
                    ReconcileAction::ClearTwin {
                        target: stale.target.clone(),
                    },
                    ReconcileAction::ClearHealth {
                        target: stale.target.clone(),
                    },
                    ReconcileAction::ClearRegistration {
                        target: stale.target.clone(),
                    },
                ]
            })
            .collect()
    }

    /// Whether nothing is observed and nothing is stale.
    pub fn is_empty(&self) -> bool {
        self.observed.is_empty() && self.stale.is_empty()
    }
}

/// A single broker side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Retained registration on the entity topic.
    Register {
        target: Target,
        registration: Registration,
    },
    /// Retained health status.
    PublishHealth { target: Target, health: HealthStatus },
    /// Retained twin fragment.
    PublishTwin { target: Target, item: ObservedItem },
    /// Empty retained message on the twin topic.
    ClearTwin { target: Target },
    /// Empty retained message on the health topic.
    ClearHealth { target: Target },
    /// Empty retained message on the entity topic.
    ClearRegistration { target: Target },
}

impl ReconcileAction {
    /// The entity this action touches.
    pub fn target(&self) -> &Target {
        match self {
            Self::Register { target, .. }
            | Self::PublishHealth { target, .. }
            | Self::PublishTwin { target, .. }
            | Self::ClearTwin { target }
            | Self::ClearHealth { target }
            | Self::ClearRegistration { target } => target,
        }
    }

    /// Short name for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::PublishHealth { .. } => "health",
            Self::PublishTwin { .. } => "twin",
            Self::ClearTwin { .. } => "clear_twin",
            Self::ClearHealth { .. } => "clear_health",
            Self::ClearRegistration { .. } => "deregister",
        }
    }

    /// The message to publish.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized.
    pub fn message(&self) -> Result<Message> {
        let message = match self {
            Self::Register {
                target,
                registration,
            } => Message::retained_json(target.topic(), registration)?,
            Self::PublishHealth { target, health } => {
                Message::retained_json(target.health_topic(), health)?
            }
            Self::PublishTwin { target, item } => {
                Message::retained_json(target.twin_topic(), &item.container)?
            }
            Self::ClearTwin { target } => Message::clear(target.twin_topic()),
            Self::ClearHealth { target } => Message::clear(target.health_topic()),
            Self::ClearRegistration { target } => Message::clear(target.topic()),
        };
        Ok(message)
    }
}

/// Outcome of one update pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Whether the pass was a full scan.
    pub full_scan: bool,
    /// Number of observed items.
    pub observed: usize,
    /// Number of new registrations.
    pub registered: usize,
    /// Entities deregistered and handed to the deletion gate.
    pub removed: Vec<StaleEntity>,
    /// Number of actions that succeeded.
    pub actions_taken: usize,
    /// Actions that failed, with the reason.
    pub actions_failed: Vec<(ReconcileAction, String)>,
}

impl PassSummary {
    /// Check if every action succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.actions_failed.is_empty()
    }

    /// Number of failed actions.
    pub fn failed_count(&self) -> usize {
        self.actions_failed.len()
    }
}
