//! 12-byte object identifiers.

use crate::error::{ValueError, ValueResult};
use std::fmt;
use std::str::FromStr;

/// A 12-byte object identifier, displayed as 24 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Creates an ObjectId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Parses a 24-digit hex string.
    pub fn parse_str(s: &str) -> ValueResult<Self> {
        if s.len() != 24 || !s.is_ascii() {
            return Err(ValueError::InvalidObjectId(s.to_string()));
        }

        let mut bytes = [0u8; 12];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_digit(chunk[0]).ok_or_else(|| ValueError::InvalidObjectId(s.into()))?;
            let lo = hex_digit(chunk[1]).ok_or_else(|| ValueError::InvalidObjectId(s.into()))?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }

    /// Returns the hex representation.
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for ObjectId {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}
