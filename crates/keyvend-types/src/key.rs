//! # AccessKey: the sellable inventory unit
//!
//! An `AccessKey` is a one-time-sale access credential. Its connection
//! payload (`raw_uri`) is opaque to the engine and is never lost by any
//! transition.
//!
//! ## State Machine
//!
//! ```text
//!                reserve            settle/sell
//!   ┌───────────┐──────▶┌──────────┐──────▶┌──────┐
//!   │ AVAILABLE │       │ RESERVED │       │ SOLD │
//!   └─────┬─────┘◀──────└────┬─────┘       └──────┘
//!     ▲   │    expire/           │   direct admin sale ▲
//!     │   │    release           │◀─────────(also from AVAILABLE)
//!     │   ▼ disable              ▼ disable
//!   ┌──────────┐
//!   │ DISABLED │
//!   └──────────┘
//! ```
//!
//! ## Properties
//!
//! - **Single sale**: SOLD is terminal. No transition leaves it, so a key
//!   can never be delivered twice.
//! - **Single reservation**: at most one live hold exists per key; a second
//!   reservation attempt fails instead of overwriting the first.
//! - **Time-bound holds**: `reserved_until` is present iff RESERVED; the
//!   sweeper reclaims holds whose expiry has passed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BuyerId, KeyId, ProtocolClass, SaleChannel, TariffId, VendError};

/// The lifecycle state of an access key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// In stock. Can be reserved, sold directly, or disabled.
    Available,
    /// Held for a pending payment until `reserved_until`.
    Reserved,
    /// Delivered to a buyer. **Terminal**: this is what prevents a
    /// double sale.
    Sold,
    /// Pulled from circulation by an operator.
    Disabled,
}

impl KeyStatus {
    /// Can a key in this status transition to the given target?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::Available,
                Self::Reserved | Self::Sold | Self::Disabled
            ) | (
                Self::Reserved,
                Self::Available | Self::Sold | Self::Disabled
            ) | (Self::Disabled, Self::Available)
        )
    }
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "AVAILABLE"),
            Self::Reserved => write!(f, "RESERVED"),
            Self::Sold => write!(f, "SOLD"),
            Self::Disabled => write!(f, "DISABLED"),
        }
    }
}

/// An access key row: the inventory ground truth for one credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKey {
    /// Globally unique key identifier.
    pub id: KeyId,
    /// Opaque connection payload handed to the buyer on sale.
    pub raw_uri: String,
    /// Protocol family of the credential.
    pub protocol: ProtocolClass,
    /// Operator-facing label.
    pub label: Option<String>,
    /// Reference to a rendered QR image of `raw_uri`.
    pub qr_image_url: Option<String>,
    /// Current lifecycle status.
    pub status: KeyStatus,
    /// Tariff this key is sold under, when assigned. Tariff-filtered
    /// selection skips unassigned keys.
    pub tariff_id: Option<TariffId>,
    /// Per-key validity override in days; falls back to the tariff's value.
    pub valid_days: Option<u32>,
    /// Free-form operator note. Cleared on sale and on release.
    pub note: Option<String>,
    /// Hold expiry. Present iff `status == Reserved`.
    pub reserved_until: Option<DateTime<Utc>>,
    /// When the key was sold. Present iff `status == Sold`.
    pub sold_at: Option<DateTime<Utc>>,
    /// Who bought the key.
    pub sold_to: Option<BuyerId>,
    /// Which sale channel delivered it.
    pub channel: Option<SaleChannel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessKey {
    /// Create a fresh available key with the given payload.
    #[must_use]
    pub fn new(raw_uri: impl Into<String>, protocol: ProtocolClass) -> Self {
        let now = Utc::now();
        Self {
            id: KeyId::new(),
            raw_uri: raw_uri.into(),
            protocol,
            label: None,
            qr_image_url: None,
            status: KeyStatus::Available,
            tariff_id: None,
            valid_days: None,
            note: None,
            reserved_until: None,
            sold_at: None,
            sold_to: None,
            channel: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_tariff(mut self, tariff: TariffId) -> Self {
        self.tariff_id = Some(tariff);
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_valid_days(mut self, days: u32) -> Self {
        self.valid_days = Some(days);
        self
    }

    /// Is this key selectable for a new reservation?
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == KeyStatus::Available
    }

    /// Does this key hold a reservation that has passed its expiry?
    #[must_use]
    pub fn reservation_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == KeyStatus::Reserved
            && self.reserved_until.is_some_and(|until| until <= now)
    }

    /// Transition to RESERVED, recording the hold expiry.
    ///
    /// # Errors
    /// `Conflict` unless the key is currently AVAILABLE.
    pub fn mark_reserved(&mut self, until: DateTime<Utc>) -> crate::Result<()> {
        if !self.status.can_transition_to(KeyStatus::Reserved) {
            return Err(self.transition_conflict(KeyStatus::Reserved));
        }
        self.status = KeyStatus::Reserved;
        self.reserved_until = Some(until);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition to SOLD, stamping buyer, channel, and sale time.
    ///
    /// # Errors
    /// `Conflict` if the key is SOLD or DISABLED.
    pub fn mark_sold(
        &mut self,
        buyer: Option<BuyerId>,
        channel: Option<SaleChannel>,
    ) -> crate::Result<()> {
        if !self.status.can_transition_to(KeyStatus::Sold) {
            return Err(self.transition_conflict(KeyStatus::Sold));
        }
        self.status = KeyStatus::Sold;
        self.sold_to = buyer;
        self.sold_at = Some(Utc::now());
        self.channel = channel;
        self.reserved_until = None;
        self.note = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition back to AVAILABLE, clearing every reservation annotation.
    ///
    /// # Errors
    /// `Conflict` unless the key is RESERVED or DISABLED.
    pub fn mark_available(&mut self) -> crate::Result<()> {
        if !self.status.can_transition_to(KeyStatus::Available) {
            return Err(self.transition_conflict(KeyStatus::Available));
        }
        self.status = KeyStatus::Available;
        self.reserved_until = None;
        self.note = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition to DISABLED, dropping any live hold.
    ///
    /// # Errors
    /// `Conflict` if the key is already SOLD.
    pub fn mark_disabled(&mut self) -> crate::Result<()> {
        if !self.status.can_transition_to(KeyStatus::Disabled) {
            return Err(self.transition_conflict(KeyStatus::Disabled));
        }
        self.status = KeyStatus::Disabled;
        self.reserved_until = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn transition_conflict(&self, target: KeyStatus) -> VendError {
        VendError::Conflict {
            key: self.id,
            reason: format!("cannot move {} to {target}", self.status),
        }
    }
}

/// Partial update applied by inventory-management callers.
///
/// `None` fields are left untouched. A `status` change goes through the
/// state machine, so a SOLD key can never be patched back into circulation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyPatch {
    pub raw_uri: Option<String>,
    pub protocol: Option<ProtocolClass>,
    pub label: Option<String>,
    pub qr_image_url: Option<String>,
    pub tariff_id: Option<TariffId>,
    pub valid_days: Option<u32>,
    pub note: Option<String>,
    pub status: Option<KeyStatus>,
}

/// Dummy key for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl AccessKey {
    /// Create a dummy available key for unit tests.
    #[must_use]
    pub fn dummy(tariff: TariffId) -> Self {
        Self::new("vless://dummy@203.0.113.1:443?security=reality", ProtocolClass::Vless)
            .with_tariff(tariff)
            .with_label("test key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_key() -> AccessKey {
        AccessKey::dummy(TariffId::new())
    }

    #[test]
    fn new_key_starts_available() {
        let key = make_key();
        assert_eq!(key.status, KeyStatus::Available);
        assert!(key.is_available());
        assert!(key.reserved_until.is_none());
        assert!(key.sold_at.is_none());
    }

    #[test]
    fn state_transitions_valid() {
        assert!(KeyStatus::Available.can_transition_to(KeyStatus::Reserved));
        assert!(KeyStatus::Available.can_transition_to(KeyStatus::Sold));
        assert!(KeyStatus::Available.can_transition_to(KeyStatus::Disabled));
        assert!(KeyStatus::Reserved.can_transition_to(KeyStatus::Available));
        assert!(KeyStatus::Reserved.can_transition_to(KeyStatus::Sold));
        assert!(KeyStatus::Reserved.can_transition_to(KeyStatus::Disabled));
        assert!(KeyStatus::Disabled.can_transition_to(KeyStatus::Available));
    }

    #[test]
    fn sold_is_terminal() {
        assert!(!KeyStatus::Sold.can_transition_to(KeyStatus::Available));
        assert!(!KeyStatus::Sold.can_transition_to(KeyStatus::Reserved));
        assert!(!KeyStatus::Sold.can_transition_to(KeyStatus::Disabled));
        assert!(!KeyStatus::Sold.can_transition_to(KeyStatus::Sold));
    }

    #[test]
    fn random_transition_sequences_respect_machine() {
        // Drive each key through a random walk of attempted transitions and
        // check the machine never lands in a state it could not reach.
        for _ in 0..200 {
            let mut key = make_key();
            for _ in 0..16 {
                let before = key.status;
                let roll = rand_status();
                let outcome = match roll {
                    KeyStatus::Available => key.mark_available(),
                    KeyStatus::Reserved => key.mark_reserved(Utc::now()),
                    KeyStatus::Sold => key.mark_sold(None, None),
                    KeyStatus::Disabled => key.mark_disabled(),
                };
                if outcome.is_ok() {
                    assert!(
                        before.can_transition_to(roll),
                        "illegal move {before} -> {roll} accepted"
                    );
                    assert_eq!(key.status, roll);
                } else {
                    assert_eq!(key.status, before, "failed move must not change state");
                }
                if before == KeyStatus::Sold {
                    assert_eq!(key.status, KeyStatus::Sold, "SOLD must be terminal");
                }
            }
        }
    }

    fn rand_status() -> KeyStatus {
        match rand::random::<u8>() % 4 {
            0 => KeyStatus::Available,
            1 => KeyStatus::Reserved,
            2 => KeyStatus::Sold,
            _ => KeyStatus::Disabled,
        }
    }

    #[test]
    fn reserve_sets_expiry() {
        let mut key = make_key();
        let until = Utc::now() + chrono::Duration::minutes(15);
        key.mark_reserved(until).unwrap();
        assert_eq!(key.status, KeyStatus::Reserved);
        assert_eq!(key.reserved_until, Some(until));
    }

    #[test]
    fn double_reserve_blocked() {
        let mut key = make_key();
        key.mark_reserved(Utc::now()).unwrap();
        let err = key.mark_reserved(Utc::now()).unwrap_err();
        assert!(matches!(err, VendError::Conflict { .. }));
    }

    #[test]
    fn sell_clears_hold_and_stamps_sale() {
        let mut key = make_key();
        key.mark_reserved(Utc::now() + chrono::Duration::minutes(15))
            .unwrap();
        let buyer = BuyerId::new();
        key.mark_sold(Some(buyer), Some(SaleChannel::Web)).unwrap();
        assert_eq!(key.status, KeyStatus::Sold);
        assert_eq!(key.sold_to, Some(buyer));
        assert_eq!(key.channel, Some(SaleChannel::Web));
        assert!(key.sold_at.is_some());
        assert!(key.reserved_until.is_none());
        assert!(key.note.is_none());
    }

    #[test]
    fn direct_sale_from_available() {
        let mut key = make_key();
        assert!(key.mark_sold(None, Some(SaleChannel::Bot)).is_ok());
        assert_eq!(key.status, KeyStatus::Sold);
    }

    #[test]
    fn sold_key_cannot_be_resold_or_released() {
        let mut key = make_key();
        key.mark_sold(None, None).unwrap();
        assert!(key.mark_sold(None, None).is_err(), "double sale must fail");
        assert!(key.mark_available().is_err(), "SOLD -> AVAILABLE must fail");
        assert!(key.mark_disabled().is_err(), "SOLD -> DISABLED must fail");
    }

    #[test]
    fn release_returns_to_available() {
        let mut key = make_key();
        key.mark_reserved(Utc::now()).unwrap();
        key.mark_available().unwrap();
        assert_eq!(key.status, KeyStatus::Available);
        assert!(key.reserved_until.is_none());
    }

    #[test]
    fn disabled_key_can_be_reinstated() {
        let mut key = make_key();
        key.mark_disabled().unwrap();
        key.mark_available().unwrap();
        assert_eq!(key.status, KeyStatus::Available);
    }

    #[test]
    fn reservation_expiry_check() {
        let mut key = make_key();
        let now = Utc::now();
        key.mark_reserved(now + chrono::Duration::minutes(15)).unwrap();
        assert!(!key.reservation_expired(now));
        assert!(!key.reservation_expired(now + chrono::Duration::minutes(14)));
        assert!(key.reservation_expired(now + chrono::Duration::minutes(15)));
        assert!(key.reservation_expired(now + chrono::Duration::minutes(16)));
    }

    #[test]
    fn payload_survives_every_transition() {
        let mut key = make_key();
        let uri = key.raw_uri.clone();
        key.mark_reserved(Utc::now()).unwrap();
        key.mark_available().unwrap();
        key.mark_disabled().unwrap();
        key.mark_available().unwrap();
        key.mark_sold(Some(BuyerId::new()), Some(SaleChannel::Web))
            .unwrap();
        assert_eq!(key.raw_uri, uri);
    }

    #[test]
    fn serde_roundtrip() {
        let key = make_key();
        let json = serde_json::to_string(&key).unwrap();
        let back: AccessKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key.id, back.id);
        assert_eq!(key.raw_uri, back.raw_uri);
        assert_eq!(key.status, back.status);
    }

    #[test]
    fn status_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&KeyStatus::Available).unwrap(),
            "\"available\""
        );
        let back: KeyStatus = serde_json::from_str("\"sold\"").unwrap();
        assert_eq!(back, KeyStatus::Sold);
    }
}
