//! Sensor whitelist: mapping hardware addresses to operator-assigned names.
//!
//! Only whitelisted sensors are forwarded; traffic from unknown addresses is
//! dropped upstream of the output.

use crate::mac_address::MacAddress;
use crate::observation::{ResolvedObservation, SensorObservation};
use std::collections::BTreeMap;

/// Hardware address => friendly name.
pub type SensorWhitelist = BTreeMap<MacAddress, String>;

/// A whitelist entry parsed from the command line.
#[derive(Debug, Clone)]
pub struct WhitelistEntry {
    pub address: MacAddress,
    pub name: String,
}

/// Parse a whitelist entry from a string in the format "MAC=NAME".
///
/// # Example
/// ```
/// use ruuvi_relay::whitelist::parse_entry;
///
/// let entry = parse_entry("fb:72:36:09:90:15=Sauna").unwrap();
/// assert_eq!(entry.address.to_string(), "fb:72:36:09:90:15");
/// assert_eq!(entry.name, "Sauna");
/// ```
pub fn parse_entry(src: &str) -> Result<WhitelistEntry, String> {
    let (address, name) = src
        .split_once('=')
        .ok_or_else(|| "invalid sensor entry: expected format MAC=NAME".to_string())?;

    let address = address.parse().map_err(|err| format!("{err}"))?;

    Ok(WhitelistEntry {
        address,
        name: name.to_string(),
    })
}

/// Attach the whitelisted friendly name to an observation.
///
/// Returns `None` when the sensor is not whitelisted; the caller drops such
/// observations without forwarding them.
pub fn resolve(
    whitelist: &SensorWhitelist,
    observation: SensorObservation,
) -> Option<ResolvedObservation> {
    let sensor_name = whitelist.get(&observation.sensor_addr)?.clone();

    Some(ResolvedObservation {
        sensor_name,
        observation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{Acceleration, SensorMeasurements};
    use time::macros::datetime;

    fn observation(addr: MacAddress) -> SensorObservation {
        SensorObservation {
            sensor_addr: addr,
            time: datetime!(2023-07-14 12:00:00 UTC),
            measurements: SensorMeasurements {
                temperature: 19.68,
                humidity: 35.5,
                pressure: 98875,
                battery: 3.157,
                acceleration: Acceleration { x: 0, y: 0, z: 0 },
            },
        }
    }

    #[test]
    fn test_parse_entry_valid() {
        let entry = parse_entry("AA:BB:CC:DD:EE:FF=Kitchen").unwrap();
        assert_eq!(
            entry.address,
            MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF])
        );
        assert_eq!(entry.name, "Kitchen");
    }

    #[test]
    fn test_parse_entry_with_spaces_in_name() {
        let entry = parse_entry("AA:BB:CC:DD:EE:FF=Living Room").unwrap();
        assert_eq!(entry.name, "Living Room");
    }

    #[test]
    fn test_parse_entry_invalid() {
        assert!(parse_entry("no-equals-sign").is_err());
        assert!(parse_entry("not-a-mac=Kitchen").is_err());
    }

    #[test]
    fn test_resolve_whitelisted_sensor() {
        let addr = MacAddress([0xFB, 0x72, 0x36, 0x09, 0x90, 0x15]);
        let mut whitelist = SensorWhitelist::new();
        whitelist.insert(addr, "sauna".to_string());

        let resolved = resolve(&whitelist, observation(addr)).unwrap();
        assert_eq!(resolved.sensor_name, "sauna");
        assert_eq!(resolved.observation.sensor_addr, addr);
    }

    #[test]
    fn test_resolve_unknown_sensor() {
        let whitelist = SensorWhitelist::new();
        let addr = MacAddress([0xFB, 0x72, 0x36, 0x09, 0x90, 0x15]);
        assert!(resolve(&whitelist, observation(addr)).is_none());
    }
}
