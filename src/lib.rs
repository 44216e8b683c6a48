#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # twinmon
//!
//! Container digital-twin monitor for thin-edge.io and Cumulocity.
//!
//! The binary is a thin layer over the workspace crates; this library holds
//! its CLI definitions and command handlers, and re-exports the crates.

pub mod cli;
pub mod commands;

// Re-export all crates
pub use twinmon_bus;
pub use twinmon_cloud;
pub use twinmon_core;
pub use twinmon_engine;
pub use twinmon_reconciler;
