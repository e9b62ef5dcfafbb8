//! The assembled engine.
//!
//! [`VendService`] owns every store, the settlement coordinator, and the
//! background sweeper handle. Embedders (an HTTP API, a messenger bot)
//! construct one service behind an `Arc` and call the operations directly;
//! the stores stay reachable for inventory and catalog management.

use std::sync::Arc;

use keyvend_store::{BuyerRegistry, KeyStore, PaymentLedger, TariffCatalog};
use keyvend_types::{
    AccessKey, BuyerId, EngineConfig, KeyId, PaymentId, ProviderId, ProviderSettings, Result,
    SaleChannel, TariffId,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::alerts::{AlertLog, AlertSink};
use crate::coordinator::{
    CallbackClaim, CheckoutSession, PaymentView, SettlementCoordinator, SettlementOutcome,
};
use crate::invoice::{HostedCheckoutGateway, InvoiceGateway};
use crate::sweeper;

/// Handle to the background sweeper task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// The fully wired reservation and settlement engine.
pub struct VendService {
    keys: Arc<KeyStore>,
    tariffs: Arc<TariffCatalog>,
    ledger: Arc<PaymentLedger>,
    buyers: Arc<BuyerRegistry>,
    alerts: Arc<AlertLog>,
    coordinator: SettlementCoordinator,
    config: EngineConfig,
}

impl VendService {
    /// Build a service with the production invoice gateway.
    #[must_use]
    pub fn new(settings: ProviderSettings, config: EngineConfig) -> Self {
        Self::with_gateway(settings, config, Arc::new(HostedCheckoutGateway::new()))
    }

    /// Build a service around a custom invoice gateway.
    #[must_use]
    pub fn with_gateway(
        settings: ProviderSettings,
        config: EngineConfig,
        gateway: Arc<dyn InvoiceGateway>,
    ) -> Self {
        let keys = Arc::new(KeyStore::new());
        let tariffs = Arc::new(TariffCatalog::new());
        let ledger = Arc::new(PaymentLedger::new());
        let buyers = Arc::new(BuyerRegistry::new());
        let alerts = Arc::new(AlertLog::new());

        let coordinator = SettlementCoordinator::new(
            Arc::clone(&keys),
            Arc::clone(&tariffs),
            Arc::clone(&ledger),
            Arc::clone(&buyers),
            gateway,
            Arc::clone(&alerts) as Arc<dyn AlertSink>,
            settings,
            &config,
        );
        Self {
            keys,
            tariffs,
            ledger,
            buyers,
            alerts,
            coordinator,
            config,
        }
    }

    // =====================================================================
    // Stores
    // =====================================================================

    #[must_use]
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    #[must_use]
    pub fn tariffs(&self) -> &TariffCatalog {
        &self.tariffs
    }

    #[must_use]
    pub fn ledger(&self) -> &PaymentLedger {
        &self.ledger
    }

    #[must_use]
    pub fn buyers(&self) -> &BuyerRegistry {
        &self.buyers
    }

    #[must_use]
    pub fn alerts(&self) -> &AlertLog {
        &self.alerts
    }

    // =====================================================================
    // Operations
    // =====================================================================

    /// See [`SettlementCoordinator::create_payment`].
    pub fn create_payment(
        &self,
        tariff_id: TariffId,
        channel: SaleChannel,
        buyer: Option<BuyerId>,
    ) -> Result<CheckoutSession> {
        self.coordinator.create_payment(tariff_id, channel, buyer)
    }

    /// See [`SettlementCoordinator::confirm_callback`].
    pub fn confirm_callback(
        &self,
        provider: ProviderId,
        claim: &CallbackClaim,
    ) -> Result<SettlementOutcome> {
        self.coordinator.confirm_callback(provider, claim)
    }

    /// See [`SettlementCoordinator::settle_payment`].
    pub fn settle_payment(&self, id: PaymentId) -> Result<SettlementOutcome> {
        self.coordinator.settle_payment(id)
    }

    /// See [`SettlementCoordinator::payment_status`].
    pub fn payment_status(&self, id: PaymentId) -> Result<PaymentView> {
        self.coordinator.payment_status(id)
    }

    /// See [`SettlementCoordinator::sell_key_direct`].
    pub fn sell_key_direct(
        &self,
        key_id: KeyId,
        buyer: Option<BuyerId>,
        channel: Option<SaleChannel>,
    ) -> Result<AccessKey> {
        self.coordinator.sell_key_direct(key_id, buyer, channel)
    }

    /// See [`SettlementCoordinator::release_key`].
    pub fn release_key(&self, key_id: KeyId) -> Result<AccessKey> {
        self.coordinator.release_key(key_id)
    }

    /// Run one sweep right now.
    pub fn sweep_now(&self) -> sweeper::SweepReport {
        sweeper::sweep(&self.keys, &self.ledger, chrono::Utc::now())
    }

    // =====================================================================
    // Settings & background task
    // =====================================================================

    #[must_use]
    pub fn settings(&self) -> ProviderSettings {
        self.coordinator.settings()
    }

    pub fn update_settings(&self, settings: ProviderSettings) {
        self.coordinator.update_settings(settings);
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start the background sweeper at the configured interval.
    ///
    /// Must be called inside a tokio runtime. The task keeps lightweight
    /// handles on the stores, so dropping the service does not stop it;
    /// call [`SweeperHandle::stop`] for an orderly shutdown.
    #[must_use]
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(sweeper::run_periodic(
            Arc::clone(&self.keys),
            Arc::clone(&self.ledger),
            self.config.sweep_interval(),
            rx,
        ));
        SweeperHandle { shutdown, handle }
    }
}

#[cfg(test)]
mod tests {
    use keyvend_types::{KeyStatus, Tariff};

    use super::*;

    fn service_with_stock(stock: usize) -> (VendService, TariffId) {
        let service = VendService::new(ProviderSettings::default(), EngineConfig::default());
        let tariff = service.tariffs().insert(Tariff::new("Monthly", 999));
        for _ in 0..stock {
            service.keys().insert(AccessKey::dummy(tariff));
        }
        (service, tariff)
    }

    #[test]
    fn facade_shares_state_with_the_coordinator() {
        let (service, tariff) = service_with_stock(1);
        let session = service
            .create_payment(tariff, SaleChannel::Web, None)
            .unwrap();

        // The same stores are visible through the accessors.
        assert_eq!(service.ledger().count(), 1);
        let held = session.reserved_key.unwrap();
        assert_eq!(service.keys().get(held).unwrap().status, KeyStatus::Reserved);

        service.settle_payment(session.payment.id).unwrap();
        assert_eq!(service.keys().get(held).unwrap().status, KeyStatus::Sold);
        assert!(service.alerts().is_empty());
    }

    #[test]
    fn sweep_now_reclaims_inline() {
        let (service, _tariff) = service_with_stock(1);
        let id = service.keys().list()[0].id;
        service
            .keys()
            .try_reserve(id, chrono::Utc::now() - chrono::Duration::seconds(1))
            .unwrap();

        let report = service.sweep_now();
        assert_eq!(report.released_keys, vec![id]);
        assert!(service.keys().get(id).unwrap().is_available());
    }

    #[tokio::test]
    async fn sweeper_task_starts_and_stops() {
        let (service, _) = service_with_stock(0);
        let sweeper = service.spawn_sweeper();
        // First tick fires immediately; an empty sweep is a no-op.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        sweeper.stop().await;
    }
}
