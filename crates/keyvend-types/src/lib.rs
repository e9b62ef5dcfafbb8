//! # keyvend-types
//!
//! Shared types, errors, and configuration for the **KeyVend** reservation
//! and settlement engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`KeyId`], [`TariffId`], [`PaymentId`], [`BuyerId`], [`ExternalId`], [`ProviderId`]
//! - **Key model**: [`AccessKey`], [`KeyStatus`], [`KeyPatch`]
//! - **Payment model**: [`Payment`], [`NewPayment`], [`PaymentStatus`], [`SaleChannel`]
//! - **Tariff model**: [`Tariff`], [`TariffPatch`], [`ProtocolClass`]
//! - **Buyer model**: [`Buyer`]
//! - **Configuration**: [`ProviderSettings`], [`ProviderProfile`], [`EngineConfig`]
//! - **Errors**: [`VendError`] with `KV_ERR_` prefix codes
//! - **Constants**: TTLs, retry limits, and provider defaults

pub mod buyer;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod key;
pub mod payment;
pub mod tariff;

// Re-export all primary types at crate root for ergonomic imports:
//   use keyvend_types::{AccessKey, KeyStatus, Payment, Tariff, ...};

pub use buyer::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use key::*;
pub use payment::*;
pub use tariff::*;

// Constants are accessed via `keyvend_types::constants::FOO`
// (not re-exported to avoid name collisions).
