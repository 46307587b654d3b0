//! Efficient hardware address type for Bluetooth devices.
//!
//! This module provides a compact 6-byte address representation that is
//! decoupled from any specific Bluetooth library, with support for the
//! reversed byte order used inside advertising frames.

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth hardware address stored as a compact 6-byte array.
///
/// Renders as lowercase colon-separated hex octets, the form used in the
/// whitelist configuration and in forwarded records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Build an address from the byte order used on the air, which is the
    /// reverse of display order.
    pub fn from_reversed(bytes: [u8; 6]) -> Self {
        let [a, b, c, d, e, f] = bytes;
        MacAddress([f, e, d, c, b, a])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors returned when parsing a hardware address string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseMacError {
    #[error("invalid address: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid address: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid address: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(ParseMacError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseMacError::InvalidPartLength(i));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidHex(part.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
