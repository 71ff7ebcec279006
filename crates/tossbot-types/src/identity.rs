//! Identity newtypes.
//!
//! User and conversation identities are opaque strings handed to us by
//! the messaging transport; wrapping them prevents accidental mixing.
//! Addresses and transaction hashes are normalized to lowercase hex so
//! lookups are case-insensitive by construction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TossError;

/// Macro to generate opaque string ID types with common implementations
macro_rules! define_string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_string_id!(UserId, "Opaque user identity from the messaging transport");
define_string_id!(ConversationId, "Opaque channel identity from the messaging transport");

/// Monotonically increasing toss identifier, stored as a decimal string.
///
/// Allocation (`max(existing) + 1`) happens in the engine under its
/// global lock; this type only knows how to compare and increment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TossId(String);

impl TossId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The first id handed out by a fresh deployment.
    pub fn first() -> Self {
        Self("1".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value for ordering; non-decimal ids sort as 0.
    pub fn numeric(&self) -> u64 {
        self.0.parse().unwrap_or(0)
    }

    pub fn successor(&self) -> Self {
        Self((self.numeric() + 1).to_string())
    }
}

impl fmt::Display for TossId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TossId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A 20-byte EVM address, stored as lowercase `0x`-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvmAddress(String);

impl EvmAddress {
    /// Parse and normalize. Accepts any hex casing.
    pub fn parse(value: &str) -> Result<Self, TossError> {
        let trimmed = value.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| TossError::InvalidAddress {
                address: value.to_string(),
            })?;
        if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TossError::InvalidAddress {
                address: value.to_string(),
            });
        }
        Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw 20 bytes.
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // Cannot fail: construction validated 40 hex chars.
        if let Ok(bytes) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&bytes);
        }
        out
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 32-byte EVM transaction hash, stored as lowercase `0x`-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn parse(value: &str) -> Result<Self, TossError> {
        let trimmed = value.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| TossError::InvalidTxHash {
                hash: value.to_string(),
            })?;
        if body.len() != 64 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TossError::InvalidTxHash {
                hash: value.to_string(),
            });
        }
        Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for chat replies, e.g. `0x1234…abcd`.
    pub fn short(&self) -> String {
        format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
