//! # keyvend-store
//!
//! The shared mutable state of the KeyVend engine: key inventory, tariff
//! catalog, payment ledger, and buyer registry.
//!
//! These stores are the only place conflicting writes meet, and every
//! mutating contract is a **conditional update**: the row's pre-state is
//! re-checked under the write lock that applies the change, exactly the
//! shape an update-where-status-equals statement has against a durable
//! backend. Callers that lose a race get `Conflict` (keys) or
//! `AlreadyPaid`/`AlreadySettled` (payments) instead of clobbering state.
//!
//! - [`KeyStore`]: key lifecycle ground truth, lowest-id-first selection
//! - [`TariffCatalog`]: priced plans, deactivate-only removal
//! - [`PaymentLedger`]: payment rows and the settlement claim gate
//! - [`BuyerRegistry`]: buyer accounts and purchase counters

pub mod buyers;
pub mod keys;
pub mod ledger;
pub mod tariffs;

pub use buyers::BuyerRegistry;
pub use keys::KeyStore;
pub use ledger::{PaymentLedger, SettlementClaim};
pub use tariffs::TariffCatalog;
