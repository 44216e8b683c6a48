//! Pub/sub transport and retained entity store.
//!
//! The reconciler only talks to the broker through the [`PubSub`] trait:
//!
//! - `entities()` - snapshot of the retained registrations seen so far
//! - `publish()` - send a message (optionally retained)
//! - `add_route()` - deliver incoming messages matching an MQTT filter
//! - `disconnect()` - release the connection, cleanly or not
//!
//! [`MqttClient`] implements it on top of `rumqttc`; [`InMemoryBroker`]
//! implements it in memory for tests.

pub mod entity;
pub mod error;
pub mod memory;
pub mod message;
pub mod mqtt;
pub mod pubsub;
pub mod topic;

pub use entity::{Entities, EntityCache};
pub use error::{Error, Result};
pub use memory::InMemoryBroker;
pub use message::{Message, QoS};
pub use mqtt::{MqttClient, MqttConfig};
pub use pubsub::{Handler, PubSub, Router};
