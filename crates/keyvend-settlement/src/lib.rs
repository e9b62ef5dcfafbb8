//! # keyvend-settlement
//!
//! Settlement plane of the **KeyVend** engine: reservations, expiry
//! sweeping, invoice building, callback verification, and exactly-once
//! settlement.
//!
//! ## Sale lifecycle
//!
//! ```text
//! ┌──────────┐   checkout    ┌──────────┐   confirm    ┌──────────┐
//! │ inventory│──────────────▶│ reserved │─────────────▶│   sold   │
//! │ AVAILABLE│               │ + PENDING│              │  + PAID  │
//! └──────────┘◀──────────────└──────────┘              └──────────┘
//!       ▲        TTL sweep /       │
//!       └────────release           └── unpaid past TTL: key returns,
//!                                      payment stays PENDING
//! ```
//!
//! A payment confirmation may arrive any number of times over any route;
//! [`SettlementCoordinator::settle_payment`] funnels them all through one
//! PENDING → PAID claim so at most one key is ever delivered per payment.
//! Delivery failure after a successful claim is an [`OpsAlert`], because
//! the money is taken either way.

pub mod alerts;
pub mod coordinator;
pub mod invoice;
pub mod reservation;
pub mod service;
pub mod signature;
pub mod sweeper;

pub use alerts::{AlertLog, AlertSink, OpsAlert};
pub use coordinator::{
    CallbackClaim, CheckoutSession, PaymentView, SettlementCoordinator, SettlementOutcome,
};
pub use invoice::{HostedCheckoutGateway, Invoice, InvoiceGateway, InvoiceRequest, ProviderPayload};
pub use reservation::{Reservation, ReservationManager};
pub use service::{SweeperHandle, VendService};
pub use sweeper::{SweepReport, run_periodic, sweep};
