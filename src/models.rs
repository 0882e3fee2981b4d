//! Data models.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::attributes::Metadata;
use crate::errors::ValidationError;

/// Wall-clock time without a timezone, as Traccar stores it
///
/// The store writes UTC clock values into `timestamp without time zone`
/// columns. The value is only ever reinterpreted as UTC, see [`Self::to_utc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, sqlx::Type)]
#[sqlx(transparent)]
pub struct NaiveTimestamp(pub NaiveDateTime);

/// Accepted text forms: `row_to_json` output and the plain Postgres literal
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

impl NaiveTimestamp {
    /// Reinterpret the wall-clock value as UTC, without any offset correction
    pub fn to_utc(self) -> DateTime<Utc> {
        DateTime::<Utc>::from_naive_utc_and_offset(self.0, Utc)
    }

    pub fn parse(value: &str) -> Option<Self> {
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(Self)
    }
}

impl From<NaiveDateTime> for NaiveTimestamp {
    fn from(value: NaiveDateTime) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for NaiveTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid naive timestamp: {s}")))
    }
}

/// Traccar device identifier
///
/// Always positive; zero stands for a missing device in query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(i32);

impl TryFrom<i64> for DeviceId {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Err(ValidationError::MissingDevice),
            v if v < 0 => Err(ValidationError::InvalidDevice(v.to_string())),
            v => i32::try_from(v)
                .map(Self)
                .map_err(|_| ValidationError::InvalidDevice(v.to_string())),
        }
    }
}

impl TryFrom<&str> for DeviceId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingDevice);
        }
        let parsed = value
            .trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::InvalidDevice(value.to_string()))?;
        Self::try_from(parsed)
    }
}

impl DeviceId {
    /// Get the raw device ID value
    pub fn value(&self) -> i32 {
        self.0
    }
}

/// One position row of `tc_positions`, as stored
///
/// Also the shape of the `data` object of a position change notification.
/// Columns missing from a notification fall back to their zero values.
#[derive(Debug, Clone, PartialEq, Deserialize, Default, sqlx::FromRow)]
#[serde(default)]
pub struct RawPosition {
    pub id: i32,
    /// Server receipt time
    #[serde(rename = "servertime")]
    #[sqlx(rename = "servertime")]
    pub created_at: NaiveTimestamp,
    /// Device reported time
    #[serde(rename = "devicetime")]
    #[sqlx(rename = "devicetime")]
    pub recorded_at: NaiveTimestamp,
    /// Time of the GPS fix
    #[serde(rename = "fixtime")]
    #[sqlx(rename = "fixtime")]
    pub fixed_at: NaiveTimestamp,
    pub valid: bool,
    #[serde(rename = "deviceid")]
    #[sqlx(rename = "deviceid")]
    pub device_id: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub course: f64,
    /// Attributes object encoded as text
    pub attributes: Option<String>,
    pub accuracy: f64,
    pub address: Option<String>,
    pub protocol: Option<String>,
    pub network: Option<String>,
}

/// Canonical position, published on the bus and returned from queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub valid: bool,
    pub device_id: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub course: f64,
    pub metadata: Metadata,
}

/// A tracked device, as provisioned in `tc_devices`
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Device {
    pub id: i32,
    pub name: String,
    /// Externally assigned unique identifier
    #[sqlx(rename = "uniqueid")]
    pub unique_id: String,
    /// Last known position
    #[sqlx(rename = "positionid")]
    pub position_id: Option<i32>,
    #[sqlx(rename = "lastupdate")]
    pub last_update: Option<NaiveTimestamp>,
    pub phone: Option<String>,
    pub model: Option<String>,
    pub contact: Option<String>,
    pub category: Option<String>,
    pub disabled: bool,
    #[sqlx(rename = "groupid")]
    pub group_id: Option<i32>,
}

/// Row change notification, as sent on the store's notification channel
///
/// Only the routing fields are decoded here. The `data` object stays opaque
/// until the position event is decoded downstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotificationEnvelope {
    pub table: String,
    pub action: String,
}

impl NotificationEnvelope {
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Row change notification for the positions table
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PositionEvent {
    pub action: String,
    #[serde(rename = "data")]
    pub position: RawPosition,
}

/// Row change action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Update,
    Delete,
}

impl Action {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INSERT" => Some(Action::Insert),
            "UPDATE" => Some(Action::Update),
            "DELETE" => Some(Action::Delete),
            _ => None,
        }
    }
}

impl PositionEvent {
    pub fn is_insert(&self) -> bool {
        Action::parse(&self.action) == Some(Action::Insert)
    }
}
