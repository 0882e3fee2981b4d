//! Errors for the position relay and query engine
use thiserror::Error;

use crate::models::Position;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("MQTT connection failed")]
    MqttConnectionError(#[from] rumqttc::ConnectionError),

    #[error("MQTT client error")]
    MqttClientError(#[from] rumqttc::ClientError),

    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Invalid configuration: {message}")]
    ConfigurationError { message: String },

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Notification stream closed")]
    NotificationStreamClosed,

    #[error("Relay queue closed")]
    QueueClosed,

    #[error("Query error")]
    QueryError(#[from] QueryError),

    #[error("Task join error")]
    JoinError(#[from] tokio::task::JoinError),
}

/// Client-fault errors in query parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a device ID is required")]
    MissingDevice,

    #[error("invalid device ID: {0}")]
    InvalidDevice(String),

    #[error("both from and to must be set if any is set at all")]
    MismatchedRange,

    #[error("invalid order {0:?}, expected \"oldest\" or \"latest\"")]
    InvalidOrder(String),
}

/// The attributes text of a position is not a valid attributes object
#[derive(Error, Debug)]
#[error("could not decode attributes")]
pub struct AttributeDecodeError(#[from] pub serde_json::Error);

/// Normalization failed, but a best-effort position is still available
///
/// The position carries every structural field of the raw record and empty
/// attributes.
#[derive(Error, Debug)]
#[error("could not normalize position {}", .position.id)]
pub struct NormalizeError {
    pub position: Box<Position>,
    #[source]
    pub source: AttributeDecodeError,
}

impl NormalizeError {
    /// Recover the best-effort position
    pub fn into_position(self) -> Position {
        *self.position
    }
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

impl QueryError {
    /// Whether the caller is at fault, as opposed to the store
    pub fn is_client_error(&self) -> bool {
        matches!(self, QueryError::Validation(_))
    }
}
