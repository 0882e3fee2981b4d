//! Traccar position relay and query engine
//!
//! Relays newly inserted positions from the Traccar store to an MQTT topic,
//! and serves paged, time filtered position queries over the same store.

pub mod attributes;
pub mod config;
pub mod database;
pub mod errors;
pub mod listener;
pub mod models;
pub mod mqtt;
pub mod normalize;
pub mod publisher;
pub mod relay;
