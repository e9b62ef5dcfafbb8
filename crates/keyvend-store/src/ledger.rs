//! Payment ledger: durable record of every payment attempt.
//!
//! Rows are append-and-mutate, never deleted. The settlement idempotency
//! guarantee lives here: [`PaymentLedger::claim_settlement`] is a
//! conditional PENDING → PAID update, so of any number of concurrent
//! confirmations exactly one observes `Claimed` and owns the key delivery;
//! every other caller gets `AlreadyPaid` with the recorded row.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use keyvend_types::{
    ExternalId, KeyId, NewPayment, Payment, PaymentId, Result, VendError,
};
use parking_lot::RwLock;

/// Outcome of a settlement claim.
#[derive(Debug, Clone)]
pub enum SettlementClaim {
    /// This caller won the PENDING → PAID edge and must deliver the key.
    /// The returned row is PAID but still carries the reservation snapshot;
    /// delivery clears it.
    Claimed { payment: Payment },
    /// Someone already settled this payment; `payment` is the recorded row.
    AlreadyPaid { payment: Payment },
}

/// In-memory payment ledger with conditional-update semantics.
#[derive(Debug, Default)]
pub struct PaymentLedger {
    payments: RwLock<BTreeMap<PaymentId, Payment>>,
}

impl PaymentLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pending payment.
    pub fn create(&self, new: NewPayment) -> Payment {
        let payment = Payment::open(new);
        tracing::info!(
            payment = %payment.id,
            external = %payment.external_id,
            amount = payment.amount_minor,
            provider = %payment.provider,
            "Payment opened"
        );
        self.payments.write().insert(payment.id, payment.clone());
        payment
    }

    /// Snapshot of a single payment.
    #[must_use]
    pub fn get(&self, id: PaymentId) -> Option<Payment> {
        self.payments.read().get(&id).cloned()
    }

    /// Find the payment carrying a provider correlation id.
    #[must_use]
    pub fn find_by_external(&self, external_id: &ExternalId) -> Option<Payment> {
        let payments = self.payments.read();
        payments
            .values()
            .find(|p| &p.external_id == external_id)
            .cloned()
    }

    /// All payments, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<Payment> {
        self.payments.read().values().rev().cloned().collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.payments.read().len()
    }

    /// Claim the right to settle a payment: conditional PENDING → PAID.
    ///
    /// The winner receives the pre-claim reservation snapshot and is
    /// responsible for selling the key and recording the delivery. Repeat
    /// callers receive `AlreadyPaid` and must not touch inventory.
    ///
    /// # Errors
    /// - `PaymentNotFound` if the payment does not exist.
    /// - `AlreadySettled` if the payment was cancelled (FAILED); a
    ///   confirmation for a cancelled payment needs operator review.
    pub fn claim_settlement(&self, id: PaymentId) -> Result<SettlementClaim> {
        let mut payments = self.payments.write();
        let payment = payments.get_mut(&id).ok_or(VendError::PaymentNotFound(id))?;
        if payment.is_paid() {
            return Ok(SettlementClaim::AlreadyPaid {
                payment: payment.clone(),
            });
        }
        payment.mark_paid()?;
        tracing::info!(payment = %id, "Settlement claimed");
        Ok(SettlementClaim::Claimed {
            payment: payment.clone(),
        })
    }

    /// Record the delivery outcome on a settled payment and clear its
    /// reservation snapshot.
    ///
    /// # Errors
    /// `PaymentNotFound` if the payment does not exist.
    pub fn record_delivery(&self, id: PaymentId, sold_key: Option<KeyId>) -> Result<Payment> {
        let mut payments = self.payments.write();
        let payment = payments.get_mut(&id).ok_or(VendError::PaymentNotFound(id))?;
        payment.record_delivery(sold_key);
        Ok(payment.clone())
    }

    /// Cancel a pending payment.
    ///
    /// # Errors
    /// - `PaymentNotFound` if the payment does not exist.
    /// - `AlreadySettled` unless the payment is PENDING.
    pub fn mark_failed(&self, id: PaymentId) -> Result<Payment> {
        let mut payments = self.payments.write();
        let payment = payments.get_mut(&id).ok_or(VendError::PaymentNotFound(id))?;
        payment.mark_failed()?;
        tracing::info!(payment = %id, "Payment cancelled");
        Ok(payment.clone())
    }

    /// Drop the reservation snapshot from every PENDING payment whose hold
    /// expired. The payments themselves stay PENDING.
    ///
    /// Predicate-guarded like the key-side sweep; rerunning is harmless.
    pub fn clear_expired_reservations(&self, now: DateTime<Utc>) -> Vec<PaymentId> {
        let mut payments = self.payments.write();
        let mut cleared = Vec::new();
        for payment in payments.values_mut() {
            if payment.reservation_expired(now) {
                payment.clear_reservation();
                cleared.push(payment.id);
            }
        }
        if !cleared.is_empty() {
            tracing::debug!(count = cleared.len(), "Cleared expired payment holds");
        }
        cleared
    }
}
