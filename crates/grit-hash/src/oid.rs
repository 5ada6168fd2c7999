use std::fmt;
use std::str::FromStr;

use crate::hex::{hex_decode, hex_to_string};
use crate::HashError;

/// Number of raw bytes in a SHA-1 object id.
pub const RAW_LEN: usize = 20;

/// Number of hex characters in a SHA-1 object id.
pub const HEX_LEN: usize = 40;

/// A git object identifier — the SHA-1 of an object's canonical form.
///
/// Value-typed and orderable; the all-zero id is the "no object" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; RAW_LEN]);

impl ObjectId {
    /// The null OID (all zeros), meaning "no object".
    pub const ZERO: Self = Self([0u8; RAW_LEN]);

    /// Create an ObjectId from exactly 20 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != RAW_LEN {
            return Err(HashError::InvalidIdLength {
                expected: RAW_LEN,
                actual: bytes.len(),
            });
        }
        let mut raw = [0u8; RAW_LEN];
        raw.copy_from_slice(bytes);
        Ok(Self(raw))
    }

    /// Create an ObjectId from a 40-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let mut raw = [0u8; RAW_LEN];
        hex_decode(hex, &mut raw)?;
        Ok(Self(raw))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; RAW_LEN] {
        &self.0
    }

    /// Is this the null (all-zeros) OID?
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; RAW_LEN]
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex_to_string(&self.0)
    }

    /// First byte of the digest (fan-out table index).
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Does the hex representation start with the given prefix?
    pub fn starts_with_hex(&self, prefix: &str) -> bool {
        self.to_hex().starts_with(&prefix.to_ascii_lowercase())
    }
}

impl From<[u8; RAW_LEN]> for ObjectId {
    fn from(raw: [u8; RAW_LEN]) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
