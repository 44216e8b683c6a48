//! Cloud inventory access for twinmon.
//!
//! Stale entities are removed from Cumulocity by resolving their external
//! id (`c8y_Serial`) and deleting the managed object behind it.

pub mod client;
pub mod error;
pub mod inventory;
pub mod memory;

pub use client::CumulocityClient;
pub use error::{Error, Result};
pub use inventory::{CloudInventory, ManagedObjectRef, SERIAL_IDENTITY_TYPE};
pub use memory::InMemoryCloud;
