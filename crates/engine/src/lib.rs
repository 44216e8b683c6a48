//! Container engine access for twinmon.
//!
//! - [`ContainerEngine`]: the engine seam (list, stats, events)
//! - [`DockerClient`]: Engine API client for Docker and Podman sockets
//! - [`InMemoryEngine`]: engine double for tests
//! - [`InventoryLister`]: normalizes and filters listings into [`ObservedItem`]s
//! - [`FilterCriteria`]: include and exclude filters for a pass

pub mod docker;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod format;
pub mod lister;
pub mod memory;
pub mod model;

pub use docker::{DockerClient, Endpoint};
pub use engine::ContainerEngine;
pub use error::{Error, Result};
pub use event::{EngineEvent, EngineEventKind, EventStream};
pub use filter::{ClientFilter, FilterCriteria, ServerFilter};
pub use format::{format_filesystem, format_ports, human_size};
pub use lister::InventoryLister;
pub use memory::InMemoryEngine;
pub use model::{
    COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL, ContainerDetails, ContainerSummary,
    ObservedItem, Port, StatsSnapshot, display_name,
};
