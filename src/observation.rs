//! Decoded sensor observation data model.
//!
//! These types define the JSON records forwarded downstream; field names are
//! part of the wire contract and must not change.

use crate::mac_address::MacAddress;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One decoded advertisement from a sensor.
///
/// All values are in standard SI units:
/// - Temperature in Celsius
/// - Humidity in percent (0-100)
/// - Pressure in Pascals
/// - Battery voltage in Volts
/// - Acceleration in milli-g per axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorObservation {
    /// Hardware address of the sensor, in display byte order
    pub sensor_addr: MacAddress,
    /// Capture time, assigned when the advertisement was decoded
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    /// The measured values
    pub measurements: SensorMeasurements,
}

/// The measured values carried by one advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorMeasurements {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: u32,
    pub battery: f64,
    pub acceleration: Acceleration,
}

/// Acceleration vector in milli-g.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acceleration {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// An observation whose sensor was found in the whitelist and therefore has
/// a friendly name attached. Only resolved observations are forwarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedObservation {
    pub sensor_name: String,
    pub observation: SensorObservation,
}
