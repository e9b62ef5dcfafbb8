//! Globally unique identifiers used throughout KeyVend.
//!
//! All entity IDs use UUIDv7 for time-ordered lexicographic sorting. Because
//! the inventory selection policy is "lowest id first", v7 ordering makes key
//! selection oldest-inventory-first without a separate created-at sort.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// KeyId
// ---------------------------------------------------------------------------

/// Globally unique access-key identifier. Uses UUIDv7 for time-ordered sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct KeyId(pub Uuid);

impl KeyId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Extract the embedded timestamp (milliseconds since UNIX epoch) from UUIDv7.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        let bytes = self.0.as_bytes();
        u64::from_be_bytes([
            0, 0, bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
        ])
    }
}

impl Default for KeyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TariffId
// ---------------------------------------------------------------------------

/// Unique identifier for a tariff (a priced plan keys are sold under).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TariffId(pub Uuid);

impl TariffId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TariffId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TariffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tariff:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PaymentId
// ---------------------------------------------------------------------------

/// Unique identifier for a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PaymentId(pub Uuid);

impl PaymentId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "payment:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BuyerId
// ---------------------------------------------------------------------------

/// Unique identifier for a buyer (storefront account or bot user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BuyerId(pub Uuid);

impl BuyerId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BuyerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BuyerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buyer:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ExternalId
// ---------------------------------------------------------------------------

/// Provider-facing correlation id for a payment.
///
/// Generated once per checkout and echoed back by the provider's callback;
/// it is the only identifier both sides share. Format:
/// `pay-<unix-millis>-<random 0..999>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalId(pub String);

impl ExternalId {
    /// Generate a fresh correlation id.
    #[must_use]
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix = rand::random::<u16>() % 1000;
        Self(format!("pay-{millis}-{suffix}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExternalId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for ExternalId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ProviderId
// ---------------------------------------------------------------------------

/// The payment providers the engine can route a checkout through.
///
/// Stable lowercase names are part of the external contract: they appear in
/// checkout URLs, callback routes, and persisted payment rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    CrystalPay,
    Enot,
}

impl ProviderId {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CrystalPay => "crystalpay",
            Self::Enot => "enot",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
