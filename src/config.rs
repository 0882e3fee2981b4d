//! Application configuration

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::RelayError;

/// Capacity of the queue between the listener and the publisher
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Notification channel the store publishes row changes on
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Table whose notifications are relayed
    #[serde(default = "default_positions_table")]
    pub positions_table: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_max_reconnect_backoff")]
    pub max_reconnect_backoff: Duration,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MqttTransport {
    #[default]
    Tcp,
    Tls,
    Wss,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    pub client_id: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub transport: MqttTransport,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_keep_alive")]
    pub keep_alive: Duration,
    /// How long to wait for queued publishes to flush on shutdown
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_channel() -> String {
    "traccar.events".to_string()
}

fn default_positions_table() -> String {
    "tc_positions".to_string()
}

fn default_reconnect_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_max_reconnect_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "positions".to_string()
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(5)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl AppConfig {
    /// Load from `config/default` and `TRACCAR_RELAY__*` environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("TRACCAR_RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Load from a single configuration file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), RelayError> {
        self.database.validate()?;
        self.mqtt.validate()?;
        self.relay.validate()?;
        Ok(())
    }
}

fn invalid(message: &str) -> RelayError {
    RelayError::ConfigurationError {
        message: message.to_string(),
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.url.trim().is_empty() {
            return Err(invalid("Database URL cannot be empty"));
        }
        if self.channel.trim().is_empty() {
            return Err(invalid("Notification channel cannot be empty"));
        }
        if self.positions_table.trim().is_empty() {
            return Err(invalid("Positions table cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(invalid("Max connections must be greater than zero"));
        }
        if self.max_reconnect_backoff < self.reconnect_backoff {
            return Err(invalid(
                "Max reconnect backoff cannot be smaller than reconnect backoff",
            ));
        }
        Ok(())
    }
}

impl MqttConfig {
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.host.trim().is_empty() {
            return Err(invalid("MQTT host cannot be empty"));
        }
        if self.client_id.trim().is_empty() {
            return Err(invalid("MQTT client ID cannot be empty"));
        }
        if self.topic.trim().is_empty() {
            return Err(invalid("MQTT topic cannot be empty"));
        }
        if self.keep_alive.is_zero() {
            return Err(invalid("Keep alive must be greater than zero"));
        }
        Ok(())
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.queue_capacity == 0 {
            return Err(invalid("Queue capacity must be greater than zero"));
        }
        Ok(())
    }
}
