//! Expiry sweeping.
//!
//! A reservation that outlives its TTL must not strand inventory: the sweep
//! returns every expired key hold to stock and clears the matching snapshot
//! on still-pending payments. Both halves are predicate-guarded bulk
//! updates, so sweeps are idempotent and safe to run concurrently with each
//! other and with settlements.
//!
//! Sweeps run inline before every reservation attempt and settlement read,
//! and [`run_periodic`] is the background safety net for inventory nobody
//! touches.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use keyvend_store::{KeyStore, PaymentLedger};
use keyvend_types::{KeyId, PaymentId};
use tokio::sync::watch;

/// What one sweep reclaimed.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Keys returned to stock.
    pub released_keys: Vec<KeyId>,
    /// Pending payments whose reservation snapshot was cleared.
    pub cleared_payments: Vec<PaymentId>,
}

impl SweepReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.released_keys.is_empty() && self.cleared_payments.is_empty()
    }
}

/// Release every expired key hold and clear every expired payment snapshot.
pub fn sweep(keys: &KeyStore, ledger: &PaymentLedger, now: DateTime<Utc>) -> SweepReport {
    let report = SweepReport {
        released_keys: keys.release_expired(now),
        cleared_payments: ledger.clear_expired_reservations(now),
    };
    if !report.is_empty() {
        tracing::info!(
            released_keys = report.released_keys.len(),
            cleared_payments = report.cleared_payments.len(),
            "Sweep reclaimed expired holds"
        );
    }
    report
}

/// Background sweep loop.
///
/// Ticks every `interval` until the shutdown channel flips to `true` or its
/// sender is dropped. A tick that reclaims nothing is silent.
pub async fn run_periodic(
    keys: Arc<KeyStore>,
    ledger: Arc<PaymentLedger>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval_secs = interval.as_secs_f64(), "Expiry sweeper started");
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&keys, &ledger, Utc::now());
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("Expiry sweeper stopped");
                    break;
                }
            }
        }
    }
}
