//! Settlement coordination.
//!
//! The coordinator drives the two halves of a sale:
//!
//! ```text
//!   checkout                        provider callback
//!      │                                  │
//!      ▼                                  ▼
//!   tariff lookup                   verify signature
//!      │                                  │
//!   reserve key (best effort)       resolve payment
//!      │                                  │
//!   build invoice                   claim PENDING → PAID
//!      │                                  │
//!   open payment                    sell the held key
//!      │                                  │
//!   checkout URL ──▶ buyer          deliver / alert
//! ```
//!
//! The claim step is the idempotency gate: however many confirmations a
//! provider fires, exactly one caller wins the PENDING → PAID edge and only
//! the winner touches inventory. Everyone else gets the recorded outcome.
//!
//! A paid checkout whose key evaporated (expired hold, stock ran dry) still
//! settles; delivery failure is an operational alert, never a lost
//! confirmation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use keyvend_store::{BuyerRegistry, KeyStore, PaymentLedger, SettlementClaim, TariffCatalog};
use keyvend_types::{
    AccessKey, BuyerId, EngineConfig, ExternalId, KeyId, NewPayment, Payment, PaymentId,
    ProviderId, ProviderSettings, Result, SaleChannel, Tariff, TariffId, VendError,
};
use parking_lot::RwLock;

use crate::alerts::{AlertSink, OpsAlert};
use crate::invoice::{InvoiceGateway, InvoiceRequest};
use crate::reservation::ReservationManager;
use crate::sweeper;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// What a checkout hands back to the storefront.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub payment: Payment,
    /// Hosted checkout page to redirect the buyer to.
    pub checkout_url: String,
    /// The key held for this checkout, when stock allowed one.
    pub reserved_key: Option<KeyId>,
    pub reserved_until: Option<DateTime<Utc>>,
}

/// The result of settling a payment.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub payment: Payment,
    /// The delivered credential. `None` means paid-but-unfulfilled.
    pub sold_key: Option<AccessKey>,
}

/// A provider's confirmation callback, as received on the wire.
#[derive(Debug, Clone)]
pub struct CallbackClaim {
    pub external_id: ExternalId,
    pub amount_minor: i64,
    pub signature: Option<String>,
}

/// Status view for the storefront's polling endpoint.
#[derive(Debug, Clone)]
pub struct PaymentView {
    pub payment: Payment,
    /// Sold key if delivered, else the currently held key.
    pub key: Option<AccessKey>,
    pub tariff: Tariff,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Wires the stores, the reservation manager, and the invoice gateway into
/// the checkout and settlement operations.
pub struct SettlementCoordinator {
    keys: Arc<KeyStore>,
    tariffs: Arc<TariffCatalog>,
    ledger: Arc<PaymentLedger>,
    buyers: Arc<BuyerRegistry>,
    reservations: ReservationManager,
    gateway: Arc<dyn InvoiceGateway>,
    alerts: Arc<dyn AlertSink>,
    settings: RwLock<ProviderSettings>,
}

impl SettlementCoordinator {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        keys: Arc<KeyStore>,
        tariffs: Arc<TariffCatalog>,
        ledger: Arc<PaymentLedger>,
        buyers: Arc<BuyerRegistry>,
        gateway: Arc<dyn InvoiceGateway>,
        alerts: Arc<dyn AlertSink>,
        settings: ProviderSettings,
        config: &EngineConfig,
    ) -> Self {
        let reservations = ReservationManager::new(
            Arc::clone(&keys),
            Arc::clone(&ledger),
            config.reservation_ttl(),
        );
        Self {
            keys,
            tariffs,
            ledger,
            buyers,
            reservations,
            gateway,
            alerts,
            settings: RwLock::new(settings),
        }
    }

    /// Snapshot of the current provider settings.
    #[must_use]
    pub fn settings(&self) -> ProviderSettings {
        self.settings.read().clone()
    }

    /// Swap in new provider settings. Affects checkouts started after the
    /// call; open payments keep the invoice they were built with.
    pub fn update_settings(&self, settings: ProviderSettings) {
        *self.settings.write() = settings;
    }

    // =====================================================================
    // Checkout
    // =====================================================================

    /// Open a checkout: hold a key and build the invoice, then record the
    /// payment.
    ///
    /// Inventory can be empty; the checkout still opens with no hold and
    /// settlement later flags the payment as paid-but-unfulfilled. Amount
    /// is copied from the tariff price here and never re-read.
    ///
    /// # Errors
    /// `TariffNotFound` for an unknown tariff, or the gateway's rejection.
    /// A gateway failure releases the fresh hold before propagating.
    pub fn create_payment(
        &self,
        tariff_id: TariffId,
        channel: SaleChannel,
        buyer: Option<BuyerId>,
    ) -> Result<CheckoutSession> {
        let tariff = self.tariffs.get(tariff_id)?;

        let reservation = match self.reservations.reserve_for_tariff(Some(tariff_id)) {
            Ok(reservation) => Some(reservation),
            Err(VendError::NoInventory { .. }) => {
                tracing::warn!(tariff = %tariff_id, "Checkout opened with no available key");
                None
            }
            Err(err) => return Err(err),
        };

        let settings = self.settings();
        let provider = settings.active_provider;
        let external_id = ExternalId::generate();
        let request = InvoiceRequest {
            provider,
            external_id: external_id.clone(),
            amount_minor: tariff.price_minor,
            description: tariff.name.clone(),
            settings,
        };
        let built = self
            .gateway
            .create_invoice(&request)
            .and_then(|invoice| {
                let payload = serde_json::to_string(&invoice.payload)?;
                Ok((invoice, payload))
            });
        let (invoice, payload_json) = match built {
            Ok(pair) => pair,
            Err(err) => {
                if let Some(reservation) = &reservation {
                    let _ = self.keys.release(reservation.key.id);
                    tracing::warn!(
                        key = %reservation.key.id,
                        error = %err,
                        "Invoice failed, hold released"
                    );
                }
                return Err(err);
            }
        };

        let reserved_key = reservation.as_ref().map(|r| r.key.id);
        let reserved_until = reservation.as_ref().map(|r| r.expires_at);
        let payment = self.ledger.create(NewPayment {
            buyer_id: buyer,
            tariff_id,
            amount_minor: tariff.price_minor,
            provider,
            channel,
            external_id,
            reserved_key,
            reserved_until,
            payload: Some(payload_json),
        });

        Ok(CheckoutSession {
            payment,
            checkout_url: invoice.checkout_url,
            reserved_key,
            reserved_until,
        })
    }

    // =====================================================================
    // Settlement
    // =====================================================================

    /// Handle a provider confirmation callback.
    ///
    /// Verification runs before any lookup: a bad signature mutates nothing
    /// and does not even reveal whether the external id exists.
    ///
    /// # Errors
    /// `InvalidSignature`, `UnknownExternalId`, `ProviderMismatch`, or the
    /// settlement's own errors.
    pub fn confirm_callback(
        &self,
        provider: ProviderId,
        claim: &CallbackClaim,
    ) -> Result<SettlementOutcome> {
        let settings = self.settings();
        crate::signature::verify(
            settings.secret(provider),
            provider,
            &claim.external_id,
            claim.amount_minor,
            claim.signature.as_deref(),
        )?;

        let payment = self
            .ledger
            .find_by_external(&claim.external_id)
            .ok_or_else(|| VendError::UnknownExternalId(claim.external_id.to_string()))?;

        if payment.provider != provider {
            return Err(VendError::ProviderMismatch {
                expected: payment.provider,
                got: provider,
            });
        }

        self.settle_payment(payment.id)
    }

    /// Settle a payment: claim the PENDING → PAID edge, then deliver.
    ///
    /// Idempotent: repeat calls return the recorded outcome and touch
    /// nothing. The snapshot key is sold only while its hold still matches
    /// the snapshot; a lost key downgrades delivery, never the settlement.
    ///
    /// # Errors
    /// `PaymentNotFound`, or `AlreadySettled` for a FAILED payment.
    pub fn settle_payment(&self, id: PaymentId) -> Result<SettlementOutcome> {
        sweeper::sweep(&self.keys, &self.ledger, Utc::now());

        let claimed = match self.ledger.claim_settlement(id)? {
            SettlementClaim::AlreadyPaid { payment } => {
                tracing::info!(payment = %payment.id, "Repeat settlement, returning recorded outcome");
                let sold_key = payment.sold_key.and_then(|key| self.keys.get(key));
                return Ok(SettlementOutcome { payment, sold_key });
            }
            SettlementClaim::Claimed { payment } => payment,
        };

        let sold = match (claimed.reserved_key, claimed.reserved_until) {
            (Some(key_id), Some(expiry)) => match self.keys.sell_reserved(
                key_id,
                expiry,
                claimed.buyer_id,
                Some(claimed.channel),
            ) {
                Ok(key) => Some(key),
                Err(err) => {
                    tracing::warn!(
                        payment = %claimed.id,
                        key = %key_id,
                        error = %err,
                        "Held key was not sellable at settlement"
                    );
                    None
                }
            },
            _ => None,
        };

        let payment = self
            .ledger
            .record_delivery(claimed.id, sold.as_ref().map(|key| key.id))?;
        self.buyers.increment_purchases(payment.buyer_id);

        if let Some(key) = &sold {
            tracing::info!(payment = %payment.id, key = %key.id, "Payment settled, key delivered");
        } else {
            tracing::error!(
                payment = %payment.id,
                reserved_key = ?claimed.reserved_key,
                "Payment settled without a deliverable key"
            );
            self.alerts.raise(OpsAlert::PaidNoKey {
                payment: payment.id,
                reserved_key: claimed.reserved_key,
            });
        }

        Ok(SettlementOutcome { payment, sold_key: sold })
    }

    /// Resolve the current state of a payment for a polling storefront.
    ///
    /// # Errors
    /// `PaymentNotFound`, or `TariffNotFound` if the catalog lost the row.
    pub fn payment_status(&self, id: PaymentId) -> Result<PaymentView> {
        sweeper::sweep(&self.keys, &self.ledger, Utc::now());
        let payment = self
            .ledger
            .get(id)
            .ok_or(VendError::PaymentNotFound(id))?;
        let key = payment
            .sold_key
            .or(payment.reserved_key)
            .and_then(|key| self.keys.get(key));
        let tariff = self.tariffs.get(payment.tariff_id)?;
        Ok(PaymentView { payment, key, tariff })
    }

    // =====================================================================
    // Manual operations
    // =====================================================================

    /// Sell a key outside the payment flow (operator hand-delivery).
    ///
    /// # Errors
    /// `KeyNotFound`, or `Conflict` when the key is SOLD or DISABLED.
    pub fn sell_key_direct(
        &self,
        key_id: KeyId,
        buyer: Option<BuyerId>,
        channel: Option<SaleChannel>,
    ) -> Result<AccessKey> {
        let key = self.keys.sell(key_id, buyer, channel)?;
        self.buyers.increment_purchases(buyer);
        tracing::info!(key = %key_id, "Key sold directly");
        Ok(key)
    }

    /// Release a key's hold outside the payment flow.
    ///
    /// # Errors
    /// `NotReserved` when the key holds no live reservation.
    pub fn release_key(&self, key_id: KeyId) -> Result<AccessKey> {
        self.reservations.release_reservation(key_id)
    }
}
