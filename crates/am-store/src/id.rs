//! Canonical user identifiers
//!
//! Provides [`UserId`], the 12-byte opaque token that keys every canonical
//! record. Its text form is 24 lowercase hex characters.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// A 12-byte user identifier
///
/// Layout of generated ids: 4-byte big-endian seconds since the epoch,
/// 5 random bytes fixed per process, 3-byte counter. Ids parsed from text are
/// treated as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId([u8; UserId::LEN]);

impl UserId {
    /// Length of the binary form
    pub const LEN: usize = 12;

    /// Length of the hex text form
    pub const HEX_LEN: usize = Self::LEN * 2;

    /// Generate a fresh identifier
    #[must_use]
    pub fn new() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        #[allow(clippy::cast_possible_truncation)]
        let secs = secs as u32;

        let count = next_counter();

        let mut bytes = [0u8; Self::LEN];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(process_nonce());
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Create from raw bytes
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 12 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let arr: [u8; Self::LEN] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Hex text form
    #[inline]
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Creation time embedded in the first four bytes (seconds since epoch)
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::HEX_LEN {
            return Err(IdError::InvalidLength {
                expected: Self::HEX_LEN,
                actual: s.len(),
            });
        }
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl From<UserId> for serde_json::Value {
    fn from(id: UserId) -> Self {
        serde_json::Value::String(id.to_hex())
    }
}

impl Serialize for UserId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors parsing a [`UserId`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IdError {
    /// Wrong input length
    #[error("invalid identifier length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Input is not hex
    #[error("invalid identifier encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

fn process_nonce() -> &'static [u8; 5] {
    static NONCE: OnceLock<[u8; 5]> = OnceLock::new();
    NONCE.get_or_init(rand::random)
}

fn next_counter() -> u32 {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    COUNTER
        .get_or_init(|| AtomicU32::new(rand::random::<u32>() & 0x00ff_ffff))
        .fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_through_display() {
        let text = "5f3e2b1a9c8d7e6f5a4b3c2d";
        let id: UserId = text.parse().unwrap();
        assert_eq!(id.to_string(), text);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        let err = "not-a-valid-id".parse::<UserId>().unwrap_err();
        assert_eq!(
            err,
            IdError::InvalidLength {
                expected: 24,
                actual: 14
            }
        );
    }

    #[test]
    fn parse_rejects_non_hex() {
        let err = "zzzzzzzzzzzzzzzzzzzzzzzz".parse::<UserId>().unwrap_err();
        assert_eq!(
            err,
            IdError::InvalidHex(hex::FromHexError::InvalidHexCharacter { c: 'z', index: 0 })
        );
    }

    #[test]
    fn uppercase_input_renders_lowercase() {
        let id: UserId = "5F3E2B1A9C8D7E6F5A4B3C2D".parse().unwrap();
        assert_eq!(id.to_hex(), "5f3e2b1a9c8d7e6f5a4b3c2d");
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = UserId::new();
        let b = UserId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn generated_id_carries_timestamp() {
        let id = UserId::new();
        assert!(id.timestamp() > 1_600_000_000);
    }

    #[test]
    fn serde_uses_hex_string() {
        let id = UserId::from_bytes([0xab; 12]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abababababababababababab\"");

        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
