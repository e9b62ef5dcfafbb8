//! Reservation management.
//!
//! A reservation pins one key to one checkout for a bounded window. The
//! manager sweeps before selecting so a stale hold never causes a spurious
//! out-of-stock answer, and it retries a lost status race once with a fresh
//! candidate before giving up.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use keyvend_store::{KeyStore, PaymentLedger};
use keyvend_types::{AccessKey, KeyId, Result, TariffId, VendError, constants};

use crate::sweeper;

/// A live hold on one key.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub key: AccessKey,
    /// When the hold lapses. Mirrored verbatim onto the payment created
    /// against this reservation.
    pub expires_at: DateTime<Utc>,
}

/// Reserves and releases keys against the shared stores.
#[derive(Debug)]
pub struct ReservationManager {
    keys: Arc<KeyStore>,
    ledger: Arc<PaymentLedger>,
    ttl: Duration,
}

impl ReservationManager {
    #[must_use]
    pub fn new(keys: Arc<KeyStore>, ledger: Arc<PaymentLedger>, ttl: Duration) -> Self {
        Self { keys, ledger, ttl }
    }

    /// Reserve the lowest-id available key, optionally tariff-filtered.
    ///
    /// # Errors
    /// `NoInventory` when no candidate exists after sweeping. A lost status
    /// race is retried once with a fresh candidate before propagating.
    pub fn reserve_for_tariff(&self, tariff: Option<TariffId>) -> Result<Reservation> {
        sweeper::sweep(&self.keys, &self.ledger, Utc::now());

        let mut retries = 0;
        loop {
            let Some(candidate) = self.keys.find_available(tariff) else {
                return Err(VendError::NoInventory { tariff });
            };
            let expires_at = Utc::now() + self.ttl;
            match self.keys.try_reserve(candidate.id, expires_at) {
                Ok(key) => {
                    tracing::info!(
                        key = %key.id,
                        expires_at = %expires_at,
                        "Key reserved"
                    );
                    return Ok(Reservation { key, expires_at });
                }
                // The winner moved the key out of AVAILABLE, so the next
                // lookup cannot hand back the same id.
                Err(VendError::Conflict { key, .. })
                    if retries < constants::CONFLICT_RETRY_LIMIT =>
                {
                    retries += 1;
                    tracing::debug!(key = %key, "Reservation race lost, retrying with a fresh candidate");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Explicitly release a hold before it lapses.
    ///
    /// # Errors
    /// `NotReserved` when the key holds no live reservation. A hold that
    /// already expired is swept away first and reports the same.
    pub fn release_reservation(&self, id: KeyId) -> Result<AccessKey> {
        sweeper::sweep(&self.keys, &self.ledger, Utc::now());
        let key = self
            .keys
            .release(id)
            .ok_or(VendError::NotReserved(id))?;
        tracing::info!(key = %id, "Reservation released");
        Ok(key)
    }

    /// The TTL stamped on new reservations.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
