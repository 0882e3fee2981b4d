//! Position query parameters and SQL construction

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};

use crate::{errors::ValidationError, models::DeviceId};

/// Columns of `tc_positions` read into a `RawPosition`
pub(crate) const POSITION_COLUMNS: &str = "id, servertime, devicetime, fixtime, valid, deviceid, \
     latitude, longitude, altitude, speed, course, attributes, accuracy, address, protocol, network";

pub(crate) const POSITIONS_TABLE: &str = "tc_positions";

/// Result ordering by device time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Oldest first
    Oldest,
    /// Latest first
    #[default]
    Latest,
}

impl FromStr for Order {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oldest" => Ok(Order::Oldest),
            "latest" => Ok(Order::Latest),
            other => Err(ValidationError::InvalidOrder(other.to_string())),
        }
    }
}

impl Order {
    fn sql(self) -> &'static str {
        match self {
            Order::Oldest => "ASC",
            Order::Latest => "DESC",
        }
    }
}

/// Closed device time interval, at minute granularity
///
/// Seconds and fractions of both bounds are dropped, so `[10:00:00, 10:00:30]`
/// only matches positions recorded at exactly 10:00:00. Existing clients rely
/// on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl TimeRange {
    /// Build a range from optional bounds; both or neither must be set
    pub fn new(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Option<Self>, ValidationError> {
        match (from, to) {
            (Some(from), Some(to)) => Ok(Some(Self {
                from: truncate_to_minute(from.naive_utc()),
                to: truncate_to_minute(to.naive_utc()),
            })),
            (None, None) => Ok(None),
            _ => Err(ValidationError::MismatchedRange),
        }
    }
}

fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Query parameters of a position search, as received from clients
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PositionQuery {
    pub device: Option<i64>,
    /// Maximum number of rows, 0 for no limit
    pub limit: u32,
    /// Rows to skip after filtering
    pub offset: u32,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// `oldest` or `latest`, defaults to `latest`
    pub order: Option<String>,
}

/// Validated position search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindOptions {
    pub range: Option<TimeRange>,
    pub offset: u32,
    pub limit: u32,
    pub order: Order,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            range: None,
            offset: 0,
            limit: 0,
            order: Order::Latest,
        }
    }
}

impl PositionQuery {
    pub fn validate(&self) -> Result<(DeviceId, FindOptions), ValidationError> {
        let device = DeviceId::try_from(self.device.ok_or(ValidationError::MissingDevice)?)?;
        let order = match &self.order {
            Some(order) => order.parse::<Order>()?,
            None => Order::default(),
        };
        let range = TimeRange::new(self.from, self.to)?;

        Ok((
            device,
            FindOptions {
                range,
                offset: self.offset,
                limit: self.limit,
                order,
            },
        ))
    }
}

/// Select positions of one device, filtered, ordered by device time and paged
pub(crate) fn find_positions(
    device: DeviceId,
    opts: &FindOptions,
) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!(
        "SELECT {POSITION_COLUMNS} FROM {POSITIONS_TABLE} WHERE deviceid = "
    ));
    query.push_bind(device.value());

    if let Some(range) = opts.range {
        query
            .push(" AND devicetime >= ")
            .push_bind(range.from)
            .push(" AND devicetime <= ")
            .push_bind(range.to);
    }

    query.push(format!(" ORDER BY devicetime {}", opts.order.sql()));

    if opts.limit > 0 {
        query.push(" LIMIT ").push_bind(i64::from(opts.limit));
    }
    if opts.offset > 0 {
        query.push(" OFFSET ").push_bind(i64::from(opts.offset));
    }

    query
}

/// Select the most recent position of one device by device time
pub(crate) fn latest_position(device: DeviceId) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!(
        "SELECT {POSITION_COLUMNS} FROM {POSITIONS_TABLE} WHERE deviceid = "
    ));
    query
        .push_bind(device.value())
        .push(" ORDER BY devicetime DESC LIMIT 1");
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn device() -> DeviceId {
        DeviceId::try_from(7i64).unwrap()
    }

    #[test]
    fn parse_order() {
        assert_eq!("oldest".parse::<Order>(), Ok(Order::Oldest));
        assert_eq!("latest".parse::<Order>(), Ok(Order::Latest));
        assert_eq!(
            "newest".parse::<Order>(),
            Err(ValidationError::InvalidOrder("newest".to_string()))
        );
        assert!("LATEST".parse::<Order>().is_err());
    }

    #[test]
    fn range_needs_both_bounds() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(
            TimeRange::new(Some(t), None),
            Err(ValidationError::MismatchedRange)
        );
        assert_eq!(
            TimeRange::new(None, Some(t)),
            Err(ValidationError::MismatchedRange)
        );
        assert_eq!(TimeRange::new(None, None), Ok(None));
    }

    #[test]
    fn range_truncates_to_minute() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 30).unwrap()
            + chrono::TimeDelta::milliseconds(999);
        let range = TimeRange::new(Some(from), Some(to)).unwrap().unwrap();

        assert_eq!(range.from, from.naive_utc());
        assert_eq!(range.to, from.naive_utc());

        let excluded = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 45).unwrap().naive_utc();
        assert!(!(range.from <= excluded && excluded <= range.to));
    }

    #[test]
    fn validate_query_defaults() {
        let query = PositionQuery {
            device: Some(7),
            ..Default::default()
        };
        let (device, opts) = query.validate().unwrap();
        assert_eq!(device.value(), 7);
        assert_eq!(opts, FindOptions::default());
    }

    #[test]
    fn validate_query_errors() {
        assert_eq!(
            PositionQuery::default().validate(),
            Err(ValidationError::MissingDevice)
        );
        assert_eq!(
            PositionQuery {
                device: Some(0),
                ..Default::default()
            }
            .validate(),
            Err(ValidationError::MissingDevice)
        );
        assert_eq!(
            PositionQuery {
                device: Some(7),
                order: Some("random".to_string()),
                ..Default::default()
            }
            .validate(),
            Err(ValidationError::InvalidOrder("random".to_string()))
        );
        assert_eq!(
            PositionQuery {
                device: Some(7),
                from: Some(Utc::now()),
                ..Default::default()
            }
            .validate(),
            Err(ValidationError::MismatchedRange)
        );
    }

    #[test]
    fn deserialize_query() {
        let query: PositionQuery = serde_json::from_str(
            r#"{"device":7,"limit":20,"from":"2024-01-01T10:00:00Z","to":"2024-01-02T10:00:00+01:00","order":"oldest"}"#,
        )
        .unwrap();
        let (_, opts) = query.validate().unwrap();
        assert_eq!(opts.limit, 20);
        assert_eq!(opts.offset, 0);
        assert_eq!(opts.order, Order::Oldest);
        let range = opts.range.unwrap();
        assert_eq!(
            range.to,
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap().naive_utc()
        );

        assert!(serde_json::from_str::<PositionQuery>(r#"{"device":7,"offset":-1}"#).is_err());
    }

    #[test]
    fn find_sql_without_range() {
        let query = find_positions(device(), &FindOptions::default());
        assert_eq!(
            query.sql(),
            format!(
                "SELECT {POSITION_COLUMNS} FROM tc_positions WHERE deviceid = $1 ORDER BY devicetime DESC"
            )
        );
    }

    #[test]
    fn find_sql_with_range_and_paging() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let opts = FindOptions {
            range: TimeRange::new(Some(from), Some(from)).unwrap(),
            offset: 10,
            limit: 5,
            order: Order::Oldest,
        };
        let query = find_positions(device(), &opts);
        assert_eq!(
            query.sql(),
            format!(
                "SELECT {POSITION_COLUMNS} FROM tc_positions WHERE deviceid = $1 \
                 AND devicetime >= $2 AND devicetime <= $3 \
                 ORDER BY devicetime ASC LIMIT $4 OFFSET $5"
            )
        );
    }

    #[test]
    fn find_sql_offset_without_limit() {
        let opts = FindOptions {
            offset: 3,
            ..Default::default()
        };
        let query = find_positions(device(), &opts);
        assert!(query.sql().ends_with("ORDER BY devicetime DESC OFFSET $2"));
    }

    #[test]
    fn latest_sql() {
        let query = latest_position(device());
        assert_eq!(
            query.sql(),
            format!(
                "SELECT {POSITION_COLUMNS} FROM tc_positions WHERE deviceid = $1 ORDER BY devicetime DESC LIMIT 1"
            )
        );
    }
}
