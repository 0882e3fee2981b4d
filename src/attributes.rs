//! Telemetry attributes codec
//!
//! Traccar stores the attributes of a position as a JSON object encoded as
//! text inside the row. [`Attributes`] is the decoded form of that text, keyed
//! the way Traccar writes it. [`Metadata`] is the same set of values under the
//! names published to consumers.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::errors::AttributeDecodeError;

/// Sparse set of telemetry attributes, as stored
///
/// Every field is optional. An absent field is distinct from a zero value and
/// is omitted when encoded.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Attributes {
    #[serde(rename = "fuelConsumption")]
    pub fuel_consumption: Option<f64>,
    pub raw: Option<String>,
    #[serde(rename = "gSensor")]
    pub g_sensor: Option<String>,
    pub result: Option<String>,
    pub status: Option<u32>,
    pub motion: Option<bool>,
    #[serde(rename = "clearedDistance")]
    pub cleared_distance: Option<f64>,
    #[serde(rename = "totalDistance")]
    pub total_distance: Option<f64>,
    pub rpm: Option<u32>,
    pub alarm: Option<String>,
    pub ignition: Option<bool>,
    /// Diagnostic trouble codes
    pub dtcs: Option<String>,
    #[serde(rename = "obdSpeed")]
    pub obd_speed: Option<u32>,
    #[serde(rename = "engineLoad")]
    pub engine_load: Option<i32>,
    #[serde(rename = "coolantTemp")]
    pub coolant_temperature: Option<i32>,
    pub distance: Option<f64>,
    #[serde(rename = "tripOdometer")]
    pub trip_odometer: Option<u32>,
    #[serde(rename = "intakeTemp")]
    pub intake_temperature: Option<i32>,
    pub odometer: Option<u64>,
    #[serde(rename = "mapIntake")]
    pub map_intake: Option<i32>,
    pub throttle: Option<f64>,
    #[serde(rename = "milDistance")]
    pub mil_distance: Option<f64>,
    /// Number of satellites in use
    pub sat: Option<u32>,
    #[serde(rename = "tripFuelConsumption")]
    pub trip_fuel_consumption: Option<f64>,
}

impl Attributes {
    /// Decode the attributes text of a stored position
    ///
    /// Unknown keys are ignored. Anything but a JSON object, blank text
    /// included, is an error. There is no partial decode.
    pub fn decode(blob: &str) -> Result<Self, AttributeDecodeError> {
        Ok(serde_json::from_str(blob)?)
    }

    /// Encode to the stored text form, omitting absent fields
    pub fn encode(&self) -> String {
        // Only strings, numbers and booleans, serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Attributes under their published names
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Metadata {
    pub fuel_used: Option<f64>,
    pub raw_code: Option<String>,
    pub accelerometer: Option<String>,
    pub result: Option<String>,
    pub status: Option<u32>,
    pub motion: Option<bool>,
    pub cleared_distance: Option<f64>,
    pub total_distance: Option<f64>,
    pub rpm: Option<u32>,
    pub alarm: Option<String>,
    pub ignition: Option<bool>,
    pub dtcs: Option<String>,
    pub obd_speed: Option<u32>,
    pub engine_load: Option<i32>,
    pub coolant_temperature: Option<i32>,
    pub distance: Option<f64>,
    pub trip_odometer: Option<u32>,
    pub intake_temperature: Option<i32>,
    pub odometer: Option<u64>,
    pub map_intake: Option<i32>,
    pub throttle: Option<f64>,
    pub mil_distance: Option<f64>,
    pub satellites: Option<u32>,
    pub trip_fuel_used: Option<f64>,
}

impl From<Attributes> for Metadata {
    fn from(attr: Attributes) -> Self {
        Metadata {
            fuel_used: attr.fuel_consumption,
            raw_code: attr.raw,
            accelerometer: attr.g_sensor,
            result: attr.result,
            status: attr.status,
            motion: attr.motion,
            cleared_distance: attr.cleared_distance,
            total_distance: attr.total_distance,
            rpm: attr.rpm,
            alarm: attr.alarm,
            ignition: attr.ignition,
            dtcs: attr.dtcs,
            obd_speed: attr.obd_speed,
            engine_load: attr.engine_load,
            coolant_temperature: attr.coolant_temperature,
            distance: attr.distance,
            trip_odometer: attr.trip_odometer,
            intake_temperature: attr.intake_temperature,
            odometer: attr.odometer,
            map_intake: attr.map_intake,
            throttle: attr.throttle,
            mil_distance: attr.mil_distance,
            satellites: attr.sat,
            trip_fuel_used: attr.trip_fuel_consumption,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_sparse() {
        let attr = Attributes::decode(r#"{"rpm":1200,"ignition":false,"sat":0}"#).unwrap();
        let expected = Attributes {
            rpm: Some(1200),
            ignition: Some(false),
            sat: Some(0),
            ..Default::default()
        };
        assert_eq!(attr, expected);
    }

    #[test]
    fn decode_ignores_unknown_keys() {
        let attr =
            Attributes::decode(r#"{"priority":0,"io239":1,"coolantTemp":-4,"battery":12.7}"#)
                .unwrap();
        let expected = Attributes {
            coolant_temperature: Some(-4),
            ..Default::default()
        };
        assert_eq!(attr, expected);
    }

    #[test]
    fn decode_traccar_blob() {
        let blob = r#"{
            "raw":"7878",
            "gSensor":"[0,0,1]",
            "motion":true,
            "totalDistance":1520.43,
            "dtcs":"P0300 P0171",
            "odometer":18446744073,
            "throttle":12.5,
            "tripFuelConsumption":3.25
        }"#;
        let attr = Attributes::decode(blob).unwrap();
        assert_eq!(attr.raw.as_deref(), Some("7878"));
        assert_eq!(attr.g_sensor.as_deref(), Some("[0,0,1]"));
        assert_eq!(attr.motion, Some(true));
        assert_eq!(attr.total_distance, Some(1520.43));
        assert_eq!(attr.dtcs.as_deref(), Some("P0300 P0171"));
        assert_eq!(attr.odometer, Some(18446744073));
        assert_eq!(attr.throttle, Some(12.5));
        assert_eq!(attr.trip_fuel_consumption, Some(3.25));
        assert_eq!(attr.rpm, None);
    }

    #[test]
    fn decode_blank_is_malformed() {
        assert!(Attributes::decode("").is_err());
        assert!(Attributes::decode("  ").is_err());
        assert!(Attributes::decode("null").is_err());
        assert!(Attributes::decode("{}").unwrap().is_empty());
    }

    #[test]
    fn decode_malformed() {
        assert!(Attributes::decode("{\"rpm\":").is_err());
        assert!(Attributes::decode("not json").is_err());
        assert!(Attributes::decode("[1, 2]").is_err());
        // Wrong type for a known key
        assert!(Attributes::decode(r#"{"rpm":"fast"}"#).is_err());
    }

    #[test]
    fn encode_omits_absent() {
        let attr = Attributes {
            motion: Some(false),
            fuel_consumption: Some(0.0),
            ..Default::default()
        };
        assert_eq!(attr.encode(), r#"{"fuelConsumption":0.0,"motion":false}"#);
        assert_eq!(Attributes::default().encode(), "{}");
    }

    #[test]
    fn encode_decode_keeps_zero_and_absent_apart() {
        let attr = Attributes {
            fuel_consumption: Some(0.0),
            status: Some(0),
            motion: Some(false),
            engine_load: Some(0),
            odometer: Some(0),
            alarm: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(Attributes::decode(&attr.encode()).unwrap(), attr);
    }

    #[test]
    fn encode_decode_all_fields() {
        let attr = Attributes {
            fuel_consumption: Some(1.5),
            raw: Some("78780d01".to_string()),
            g_sensor: Some("[1,2,3]".to_string()),
            result: Some("OK".to_string()),
            status: Some(4),
            motion: Some(true),
            cleared_distance: Some(10.25),
            total_distance: Some(12345.678),
            rpm: Some(900),
            alarm: Some("overspeed".to_string()),
            ignition: Some(true),
            dtcs: Some("P0420".to_string()),
            obd_speed: Some(88),
            engine_load: Some(35),
            coolant_temperature: Some(91),
            distance: Some(0.42),
            trip_odometer: Some(1200),
            intake_temperature: Some(-12),
            odometer: Some(987_654_321),
            map_intake: Some(101),
            throttle: Some(17.0),
            mil_distance: Some(3.0),
            sat: Some(9),
            trip_fuel_consumption: Some(0.75),
        };
        assert_eq!(Attributes::decode(&attr.encode()).unwrap(), attr);
    }

    #[test]
    fn metadata_names() {
        let attr = Attributes {
            fuel_consumption: Some(2.0),
            g_sensor: Some("[0,0,0]".to_string()),
            coolant_temperature: Some(80),
            sat: Some(7),
            ..Default::default()
        };
        let json = serde_json::to_value(Metadata::from(attr)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "fuel_used": 2.0,
                "accelerometer": "[0,0,0]",
                "coolant_temperature": 80,
                "satellites": 7
            })
        );
    }
}
