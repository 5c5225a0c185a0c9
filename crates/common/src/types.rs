use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const ADDRESS_LENGTH: usize = 20;

/// Errors produced while parsing an [`Address`] from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid address length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

// --- NewTypes ---

/// Account identity. Rendered as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressError::InvalidLength {
                expected: ADDRESS_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Address(arr))
    }

    /// Address whose every byte is `byte`. Handy for fixtures and well-known accounts.
    pub const fn repeat_byte(byte: u8) -> Self {
        Address([byte; ADDRESS_LENGTH])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Address::from_slice(&bytes)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
