//! Position query engine over the Traccar store

pub mod query;

use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing::{debug, info};

use crate::{
    config::DatabaseConfig,
    errors::{NormalizeError, QueryError, RelayError},
    models::{Device, DeviceId, Position, RawPosition},
    normalize::normalize,
};
use query::{FindOptions, PositionQuery};

/// Read-only access to positions and devices
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PositionRepository {
    pool: Pool<Postgres>,
}

/// Open a connection pool to the store
pub async fn connect(config: &DatabaseConfig) -> Result<Pool<Postgres>, RelayError> {
    info!(max_connections = config.max_connections, "connecting to Postgres");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    Ok(pool)
}

impl PositionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Most recent position of a device by device time
    ///
    /// `None` when the device has no positions.
    pub async fn latest(&self, device: DeviceId) -> Result<Option<RawPosition>, QueryError> {
        let mut builder = query::latest_position(device);
        let position = builder
            .build_query_as::<RawPosition>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(position)
    }

    /// Positions of a device, filtered by device time, ordered and paged
    pub async fn find(
        &self,
        device: DeviceId,
        opts: &FindOptions,
    ) -> Result<Vec<RawPosition>, QueryError> {
        debug!(device_id = device.value(), ?opts, "finding positions");
        let mut builder = query::find_positions(device, opts);
        let positions = builder
            .build_query_as::<RawPosition>()
            .fetch_all(&self.pool)
            .await?;
        Ok(positions)
    }

    /// Validate client parameters and run the search
    pub async fn search(&self, params: &PositionQuery) -> Result<Vec<RawPosition>, QueryError> {
        let (device, opts) = params.validate()?;
        self.find(device, &opts).await
    }

    /// [`Self::latest`], normalized
    ///
    /// A position whose attributes do not decode is returned as the error,
    /// which still holds the best-effort position.
    pub async fn latest_normalized(
        &self,
        device: DeviceId,
    ) -> Result<Option<Result<Position, NormalizeError>>, QueryError> {
        Ok(self.latest(device).await?.as_ref().map(normalize))
    }

    /// [`Self::search`], normalized row by row
    pub async fn find_normalized(
        &self,
        params: &PositionQuery,
    ) -> Result<Vec<Result<Position, NormalizeError>>, QueryError> {
        Ok(self.search(params).await?.iter().map(normalize).collect())
    }

    /// Device with the given externally assigned identifier
    pub async fn find_device(&self, unique_id: &str) -> Result<Option<Device>, QueryError> {
        let device = sqlx::query_as::<_, Device>(
            r"
            SELECT id, name, uniqueid, positionid, lastupdate, phone, model,
                   contact, category, disabled, groupid
            FROM tc_devices
            WHERE uniqueid = $1
            ",
        )
        .bind(unique_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(device)
    }
}
