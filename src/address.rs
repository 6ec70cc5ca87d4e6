//! 6-byte link-layer address.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors from parsing a textual address.
#[derive(Debug, Error)]
pub enum AddressParseError {
    #[error("expected 6 colon-separated octets, got {0}")]
    WrongOctetCount(usize),

    #[error("invalid octet '{0}'")]
    InvalidOctet(String),
}

/// 6-byte link-layer address (MAC-shaped, but opaque to the engine).
///
/// Equality is bytewise. The all-ones value is the broadcast address,
/// which the underlying driver transmits without a per-peer delivery
/// report.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; 6]);

impl Address {
    /// The distinguished broadcast address `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: Address = Address([0xff; 6]);

    /// Create an address from a 6-byte array.
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Create an address from a slice. Returns None unless it is exactly
    /// 6 bytes long.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 6 {
            return None;
        }
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(slice);
        Some(Self(bytes))
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Check whether this is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    /// Parse the conventional `aa:bb:cc:dd:ee:ff` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.split(':').collect();
        if octets.len() != 6 {
            return Err(AddressParseError::WrongOctetCount(octets.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, octet) in octets.iter().enumerate() {
            bytes[i] = u8::from_str_radix(octet, 16)
                .map_err(|_| AddressParseError::InvalidOctet(octet.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}
