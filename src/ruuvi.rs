//! Decoder for RuuviTag data format 3 advertisements.
//!
//! Recognizes the manufacturer-specific data section of a captured
//! advertising frame and decodes the fixed big-endian sensor record.
//! See: https://github.com/ruuvi/ruuvi-sensor-protocols

use crate::hcidump::{Direction, Frame};
use crate::mac_address::MacAddress;
use crate::observation::{Acceleration, SensorMeasurements, SensorObservation};
use thiserror::Error;
use time::OffsetDateTime;

/// Ruuvi Innovations manufacturer ID followed by the data format tag, as it
/// appears in the advertisement payload.
const FORMAT3_SIGNATURE: [u8; 3] = [0x99, 0x04, 0x03];

/// Offset of the signature (and of the sensor record) within the frame.
const SIGNATURE_OFFSET: usize = 19;

/// Bluetooth AD type for manufacturer-specific data.
const MANUFACTURER_DATA_TYPE: u8 = 0xFF;
const MANUFACTURER_DATA_TYPE_OFFSET: usize = 18;

/// Offset of the advertiser's hardware address, stored byte-reversed.
const ADDRESS_OFFSET: usize = 7;

/// A full format 3 frame: the 16-byte sensor record plus a trailing RSSI
/// byte after the signature offset.
const MIN_FRAME_LEN: usize = 36;

/// Pressure is transmitted as an offset from this baseline, in Pascals.
const PRESSURE_BASELINE: u32 = 50_000;

/// Errors for frames that are not a decodable format 3 advertisement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame does not carry the format 3 signature. This is normal
    /// traffic from other devices sharing the airwaves, not a fault.
    #[error("unknown advertisement format")]
    UnknownFormat,
    /// The signature matched but the frame is too short to hold the full
    /// sensor record.
    #[error("frame too short for sensor record: {0} bytes")]
    TooShort(usize),
}

/// Decode a captured frame into a sensor observation.
///
/// Outbound frames are uninteresting rather than erroneous and decode to
/// `None`. The observation's timestamp is the wall clock at decode time;
/// everything else is a pure function of the frame bytes.
pub fn decode_frame(frame: &Frame) -> Result<Option<SensorObservation>, DecodeError> {
    if frame.direction != Direction::Inbound {
        return Ok(None);
    }

    let data = &frame.data;

    if data.len() < SIGNATURE_OFFSET + FORMAT3_SIGNATURE.len() {
        return Err(DecodeError::UnknownFormat);
    }

    if data[MANUFACTURER_DATA_TYPE_OFFSET] != MANUFACTURER_DATA_TYPE {
        return Err(DecodeError::UnknownFormat);
    }

    if data[SIGNATURE_OFFSET..SIGNATURE_OFFSET + FORMAT3_SIGNATURE.len()] != FORMAT3_SIGNATURE {
        return Err(DecodeError::UnknownFormat);
    }

    if data.len() < MIN_FRAME_LEN {
        return Err(DecodeError::TooShort(data.len()));
    }

    let mut addr = [0u8; 6];
    addr.copy_from_slice(&data[ADDRESS_OFFSET..ADDRESS_OFFSET + 6]);
    let sensor_addr = MacAddress::from_reversed(addr);

    // fixed big-endian record: manufacturer id (2), format tag (1),
    // humidity (1), temperature (2), pressure (2), acceleration (6),
    // battery (2)
    let record = &data[SIGNATURE_OFFSET..];

    let humidity = f64::from(record[3]) / 2.0;
    let temperature = parse_temperature(record[4], record[5]);
    let pressure = u32::from(u16::from_be_bytes([record[6], record[7]])) + PRESSURE_BASELINE;
    let acceleration = Acceleration {
        x: i16::from_be_bytes([record[8], record[9]]),
        y: i16::from_be_bytes([record[10], record[11]]),
        z: i16::from_be_bytes([record[12], record[13]]),
    };
    let battery = f64::from(u16::from_be_bytes([record[14], record[15]])) / 1000.0;

    Ok(Some(SensorObservation {
        sensor_addr,
        time: OffsetDateTime::now_utc(),
        measurements: SensorMeasurements {
            temperature,
            humidity,
            pressure,
            battery,
            acceleration,
        },
    }))
}

/// Temperature is sign-and-magnitude: bit 7 of the integer byte is the sign,
/// the remaining bits the whole degrees, the second byte hundredths. Not
/// two's complement.
fn parse_temperature(integer: u8, fraction: u8) -> f64 {
    let magnitude = f64::from(integer & 0x7F) + f64::from(fraction) / 100.0;
    if integer & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}
