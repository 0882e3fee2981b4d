//! Conversion of stored positions to their canonical form

use crate::{
    attributes::Attributes,
    errors::NormalizeError,
    models::{Position, RawPosition},
};

/// Convert a stored position into a [`Position`]
///
/// Structural fields are always copied and timestamps are reinterpreted as
/// UTC. Missing or blank attributes text does not decode. When decoding
/// fails the error still carries the position, with empty metadata.
pub fn normalize(raw: &RawPosition) -> Result<Position, NormalizeError> {
    let mut position = Position {
        id: raw.id,
        created_at: raw.created_at.to_utc(),
        recorded_at: raw.recorded_at.to_utc(),
        valid: raw.valid,
        device_id: raw.device_id,
        latitude: raw.latitude,
        longitude: raw.longitude,
        altitude: raw.altitude,
        speed: raw.speed,
        course: raw.course,
        metadata: Default::default(),
    };

    match Attributes::decode(raw.attributes.as_deref().unwrap_or_default()) {
        Ok(attr) => {
            position.metadata = attr.into();
            Ok(position)
        }
        Err(source) => Err(NormalizeError {
            position: Box::new(position),
            source,
        }),
    }
}
