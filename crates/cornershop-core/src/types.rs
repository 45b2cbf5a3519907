//! Strong type definitions shared by both stores.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Number of bytes in a sale identifier.
const SALE_ID_LEN: usize = 12;

/// A store-independent sale identifier.
///
/// Minted by whichever store records the sale and propagated verbatim to the
/// other store on sync. The layout is 4 bytes of big-endian creation seconds
/// followed by 8 random bytes, rendered as 24 lower-case hex characters, so
/// ids sort roughly by creation time.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SaleId(String);

impl SaleId {
    /// Mint a fresh identifier.
    pub fn generate() -> Self {
        let secs = chrono::Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
        let mut bytes = [0u8; SALE_ID_LEN];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        rand::thread_rng().fill_bytes(&mut bytes[4..]);
        Self(hex::encode(bytes))
    }

    /// Parse an identifier, accepting upper- or lower-case hex.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let bytes = hex::decode(s).map_err(|_| ValidationError::InvalidSaleId(s.to_string()))?;
        if bytes.len() != SALE_ID_LEN {
            return Err(ValidationError::InvalidSaleId(s.to_string()));
        }
        Ok(Self(hex::encode(bytes)))
    }

    /// Build an identifier from raw bytes.
    pub fn from_bytes(bytes: [u8; SALE_ID_LEN]) -> Self {
        Self(hex::encode(bytes))
    }

    /// The hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SaleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SaleId({})", self.0)
    }
}

impl fmt::Display for SaleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SaleId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SaleId {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<SaleId> for String {
    fn from(id: SaleId) -> Self {
        id.0
    }
}

impl AsRef<str> for SaleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The independently addressable entity kinds.
///
/// Sale items are not listed: they travel with their owning sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Product,
    Sale,
}

impl EntityKind {
    /// Kinds in the order a sync pass reconciles them.
    pub const ALL: [EntityKind; 2] = [EntityKind::Product, EntityKind::Sale];
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Product => f.write_str("product"),
            EntityKind::Sale => f.write_str("sale"),
        }
    }
}

/// One of the two persistence backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The document store (fast, eventually-consistent mirror).
    Document,
    /// The relational store (canonical source for descriptive fields by default).
    Relational,
}

impl Backend {
    /// The other backend.
    pub fn other(self) -> Self {
        match self {
            Backend::Document => Backend::Relational,
            Backend::Relational => Backend::Document,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Document => f.write_str("document store"),
            Backend::Relational => f.write_str("relational store"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sale_id_shape() {
        let id = SaleId::generate();
        assert_eq!(id.as_str().len(), 24);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_sale_ids_are_unique() {
        let a = SaleId::generate();
        let b = SaleId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sale_id_parse_normalises_case() {
        let id = SaleId::parse("65A1B2C3D4E5F60718293A4B").unwrap();
        assert_eq!(id.as_str(), "65a1b2c3d4e5f60718293a4b");
    }

    #[test]
    fn test_sale_id_rejects_bad_input() {
        assert!(SaleId::parse("").is_err());
        assert!(SaleId::parse("not-hex").is_err());
        assert!(SaleId::parse("abcd").is_err());
    }

    #[test]
    fn test_sale_id_serde_is_transparent() {
        let id = SaleId::from_bytes([0xab; 12]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abababababababababababab\"");
        let back: SaleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_backend_other() {
        assert_eq!(Backend::Document.other(), Backend::Relational);
        assert_eq!(Backend::Relational.other(), Backend::Document);
    }
}
