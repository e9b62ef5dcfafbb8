//! # Payment: the ledger row tying a checkout to a key
//!
//! A payment is opened when a checkout starts, snapshots the reservation it
//! was created against, and is settled exactly once when the provider
//! confirms. Rows are never deleted; they are the financial audit record.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  confirm   ┌──────┐
//!   │ PENDING ├───────────▶│ PAID │
//!   └────┬────┘            └──────┘
//!        │ operator cancel
//!        ▼
//!   ┌────────┐
//!   │ FAILED │
//!   └────────┘
//! ```
//!
//! PAID and FAILED are both terminal. The PENDING → PAID edge is the
//! idempotency gate: whoever wins it owns the one key delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BuyerId, ExternalId, KeyId, PaymentId, ProviderId, TariffId, VendError};

/// The lifecycle state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Awaiting provider confirmation.
    Pending,
    /// Confirmed. **Terminal**: repeated confirmations are no-ops.
    Paid,
    /// Abandoned or cancelled by an operator. Terminal.
    Failed,
}

impl PaymentStatus {
    /// Can a payment in this status transition to the given target?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!((self, target), (Self::Pending, Self::Paid | Self::Failed))
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Paid => write!(f, "PAID"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Which surface started the checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleChannel {
    /// Storefront web UI.
    Web,
    /// Messenger bot.
    Bot,
}

impl std::fmt::Display for SaleChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Web => write!(f, "WEB"),
            Self::Bot => write!(f, "BOT"),
        }
    }
}

/// A payment attempt and its linkage to the key it should deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Globally unique payment identifier.
    pub id: PaymentId,
    /// The buyer, when the caller was identified.
    pub buyer_id: Option<BuyerId>,
    /// The tariff being purchased.
    pub tariff_id: TariffId,
    /// Amount in minor currency units, copied from the tariff price at
    /// creation. Later price changes never alter an open payment.
    pub amount_minor: i64,
    /// Provider the invoice was routed through.
    pub provider: ProviderId,
    /// Current lifecycle status.
    pub status: PaymentStatus,
    /// Surface that started the checkout.
    pub channel: SaleChannel,
    /// Provider-facing correlation id.
    pub external_id: ExternalId,
    /// Snapshot of the reservation this payment was opened against.
    /// Cleared by the sweeper once the hold expires, and on settlement.
    pub reserved_key: Option<KeyId>,
    /// Expiry of the snapshot hold. Mirrors the key's `reserved_until`.
    pub reserved_until: Option<DateTime<Utc>>,
    /// The key actually delivered. Set only on PAID; a PAID payment with
    /// `None` here is paid-but-unfulfilled and needs operator attention.
    pub sold_key: Option<KeyId>,
    /// Opaque provider payload (serialized JSON), kept for audit.
    pub payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fields a caller supplies to open a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub buyer_id: Option<BuyerId>,
    pub tariff_id: TariffId,
    pub amount_minor: i64,
    pub provider: ProviderId,
    pub channel: SaleChannel,
    pub external_id: ExternalId,
    pub reserved_key: Option<KeyId>,
    pub reserved_until: Option<DateTime<Utc>>,
    pub payload: Option<String>,
}

impl Payment {
    /// Open a pending payment from the supplied fields.
    #[must_use]
    pub fn open(new: NewPayment) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            buyer_id: new.buyer_id,
            tariff_id: new.tariff_id,
            amount_minor: new.amount_minor,
            provider: new.provider,
            status: PaymentStatus::Pending,
            channel: new.channel,
            external_id: new.external_id,
            reserved_key: new.reserved_key,
            reserved_until: new.reserved_until,
            sold_key: None,
            payload: new.payload,
            created_at: now,
            updated_at: now,
        }
    }

    /// Is this payment settled?
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }

    /// Has the snapshot hold passed its expiry?
    #[must_use]
    pub fn reservation_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending
            && self.reserved_until.is_some_and(|until| until <= now)
    }

    /// Transition to PAID.
    ///
    /// # Errors
    /// `AlreadySettled` unless the payment is PENDING.
    pub fn mark_paid(&mut self) -> crate::Result<()> {
        if !self.status.can_transition_to(PaymentStatus::Paid) {
            return Err(VendError::AlreadySettled(self.id));
        }
        self.status = PaymentStatus::Paid;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition to FAILED.
    ///
    /// # Errors
    /// `AlreadySettled` unless the payment is PENDING.
    pub fn mark_failed(&mut self) -> crate::Result<()> {
        if !self.status.can_transition_to(PaymentStatus::Failed) {
            return Err(VendError::AlreadySettled(self.id));
        }
        self.status = PaymentStatus::Failed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the delivery outcome on a settled payment and drop the
    /// reservation snapshot.
    pub fn record_delivery(&mut self, sold_key: Option<KeyId>) {
        self.sold_key = sold_key;
        self.reserved_key = None;
        self.reserved_until = None;
        self.updated_at = Utc::now();
    }

    /// Clear the reservation snapshot, leaving the payment PENDING.
    pub fn clear_reservation(&mut self) {
        self.reserved_key = None;
        self.reserved_until = None;
        self.updated_at = Utc::now();
    }
}

/// Dummy payment for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Payment {
    /// Create a dummy pending payment for unit tests.
    #[must_use]
    pub fn dummy(tariff: TariffId, amount_minor: i64) -> Self {
        Self::open(NewPayment {
            buyer_id: None,
            tariff_id: tariff,
            amount_minor,
            provider: ProviderId::CrystalPay,
            channel: SaleChannel::Web,
            external_id: ExternalId::generate(),
            reserved_key: None,
            reserved_until: None,
            payload: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_payment() -> Payment {
        Payment::dummy(TariffId::new(), 999)
    }

    #[test]
    fn open_payment_is_pending() {
        let p = make_payment();
        assert_eq!(p.status, PaymentStatus::Pending);
        assert!(!p.is_paid());
        assert!(p.sold_key.is_none());
        assert_eq!(p.amount_minor, 999);
    }

    #[test]
    fn state_transitions() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Paid));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Paid));
    }

    #[test]
    fn mark_paid_once() {
        let mut p = make_payment();
        assert!(p.mark_paid().is_ok());
        assert_eq!(p.status, PaymentStatus::Paid);
        let err = p.mark_paid().unwrap_err();
        assert!(matches!(err, VendError::AlreadySettled(id) if id == p.id));
    }

    #[test]
    fn failed_payment_cannot_be_paid() {
        let mut p = make_payment();
        p.mark_failed().unwrap();
        assert!(p.mark_paid().is_err());
    }

    #[test]
    fn record_delivery_clears_snapshot() {
        let mut p = make_payment();
        let key = KeyId::new();
        p.reserved_key = Some(key);
        p.reserved_until = Some(Utc::now());
        p.mark_paid().unwrap();
        p.record_delivery(Some(key));
        assert_eq!(p.sold_key, Some(key));
        assert!(p.reserved_key.is_none());
        assert!(p.reserved_until.is_none());
    }

    #[test]
    fn snapshot_expiry_check() {
        let mut p = make_payment();
        let now = Utc::now();
        assert!(!p.reservation_expired(now), "no snapshot, nothing expires");
        p.reserved_key = Some(KeyId::new());
        p.reserved_until = Some(now + chrono::Duration::minutes(15));
        assert!(!p.reservation_expired(now));
        assert!(p.reservation_expired(now + chrono::Duration::minutes(15)));
        p.mark_paid().unwrap();
        assert!(
            !p.reservation_expired(now + chrono::Duration::minutes(15)),
            "settled payments are out of sweep scope"
        );
    }

    #[test]
    fn channel_serde_lowercase() {
        assert_eq!(serde_json::to_string(&SaleChannel::Web).unwrap(), "\"web\"");
        assert_eq!(serde_json::to_string(&SaleChannel::Bot).unwrap(), "\"bot\"");
    }

    #[test]
    fn serde_roundtrip() {
        let p = make_payment();
        let json = serde_json::to_string(&p).unwrap();
        let back: Payment = serde_json::from_str(&json).unwrap();
        assert_eq!(p.id, back.id);
        assert_eq!(p.amount_minor, back.amount_minor);
        assert_eq!(p.status, back.status);
        assert_eq!(p.external_id, back.external_id);
    }
}
