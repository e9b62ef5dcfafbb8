//! Error types for the KeyVend engine.
//!
//! All errors use the `KV_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Tariff / catalog errors
//! - 2xx: Key inventory errors
//! - 3xx: Reservation errors
//! - 4xx: Payment ledger errors
//! - 5xx: Settlement / callback errors
//! - 6xx: Buyer registry errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{BuyerId, KeyId, PaymentId, ProviderId, TariffId};

/// Central error enum for all KeyVend operations.
#[derive(Debug, Error)]
pub enum VendError {
    // =================================================================
    // Tariff / Catalog Errors (1xx)
    // =================================================================
    /// The requested tariff does not exist in the catalog.
    #[error("KV_ERR_100: Tariff not found: {0}")]
    TariffNotFound(TariffId),

    // =================================================================
    // Key Inventory Errors (2xx)
    // =================================================================
    /// The requested key does not exist in the inventory.
    #[error("KV_ERR_200: Key not found: {0}")]
    KeyNotFound(KeyId),

    /// A status transition lost its race or is not allowed from the key's
    /// current state. Retried internally at most once, on a different key.
    #[error("KV_ERR_201: Key conflict on {key}: {reason}")]
    Conflict { key: KeyId, reason: String },

    /// No available key matched the reservation request.
    #[error("KV_ERR_202: No available key{}", tariff_suffix(.tariff))]
    NoInventory { tariff: Option<TariffId> },

    /// A bulk key import carried no rows.
    #[error("KV_ERR_203: Bulk import contained no keys")]
    EmptyImport,

    // =================================================================
    // Reservation Errors (3xx)
    // =================================================================
    /// An explicit release targeted a key that holds no live reservation.
    #[error("KV_ERR_300: Key {0} is not reserved")]
    NotReserved(KeyId),

    // =================================================================
    // Payment Ledger Errors (4xx)
    // =================================================================
    /// The requested payment does not exist in the ledger.
    #[error("KV_ERR_400: Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// The payment is already in a terminal state, so the requested
    /// transition is impossible. Notably raised when a provider confirms a
    /// payment an operator cancelled.
    #[error("KV_ERR_401: Payment already settled: {0}")]
    AlreadySettled(PaymentId),

    /// No payment carries the given external correlation id.
    #[error("KV_ERR_402: No payment for external id: {0}")]
    UnknownExternalId(String),

    // =================================================================
    // Settlement / Callback Errors (5xx)
    // =================================================================
    /// Callback signature did not match the expected HMAC. The callback
    /// must not mutate any state.
    #[error("KV_ERR_500: Invalid callback signature for provider {provider}")]
    InvalidSignature { provider: ProviderId },

    /// Callback arrived on a different provider than the payment was
    /// created against.
    #[error("KV_ERR_501: Provider mismatch: payment expects {expected}, callback from {got}")]
    ProviderMismatch {
        expected: ProviderId,
        got: ProviderId,
    },

    /// The invoice collaborator refused to create a checkout.
    #[error("KV_ERR_502: Invoice rejected: {reason}")]
    InvoiceRejected { reason: String },

    // =================================================================
    // Buyer Registry Errors (6xx)
    // =================================================================
    /// The requested buyer does not exist.
    #[error("KV_ERR_600: Buyer not found: {0}")]
    BuyerNotFound(BuyerId),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("KV_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("KV_ERR_901: Serialization error: {0}")]
    Serialization(String),
}

impl VendError {
    /// Stable machine-readable code for logs and external responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::TariffNotFound(_) => "KV_ERR_100",
            Self::KeyNotFound(_) => "KV_ERR_200",
            Self::Conflict { .. } => "KV_ERR_201",
            Self::NoInventory { .. } => "KV_ERR_202",
            Self::EmptyImport => "KV_ERR_203",
            Self::NotReserved(_) => "KV_ERR_300",
            Self::PaymentNotFound(_) => "KV_ERR_400",
            Self::AlreadySettled(_) => "KV_ERR_401",
            Self::UnknownExternalId(_) => "KV_ERR_402",
            Self::InvalidSignature { .. } => "KV_ERR_500",
            Self::ProviderMismatch { .. } => "KV_ERR_501",
            Self::InvoiceRejected { .. } => "KV_ERR_502",
            Self::BuyerNotFound(_) => "KV_ERR_600",
            Self::Internal(_) => "KV_ERR_900",
            Self::Serialization(_) => "KV_ERR_901",
        }
    }
}

fn tariff_suffix(tariff: &Option<TariffId>) -> String {
    match tariff {
        Some(t) => format!(" for {t}"),
        None => String::new(),
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, VendError>;

impl From<serde_json::Error> for VendError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
