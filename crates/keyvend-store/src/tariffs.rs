//! Tariff catalog: the priced plans keys are sold under.
//!
//! Deactivation is the only removal: a tariff referenced by payments and
//! sold keys must stay resolvable forever.

use std::collections::BTreeMap;

use keyvend_types::{Result, Tariff, TariffId, TariffPatch, VendError};
use parking_lot::RwLock;

/// In-memory tariff catalog.
#[derive(Debug, Default)]
pub struct TariffCatalog {
    tariffs: RwLock<BTreeMap<TariffId, Tariff>>,
}

impl TariffCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tariff to the catalog.
    pub fn insert(&self, tariff: Tariff) -> TariffId {
        let id = tariff.id;
        self.tariffs.write().insert(id, tariff);
        id
    }

    /// Look up a tariff.
    ///
    /// # Errors
    /// `TariffNotFound` if absent.
    pub fn get(&self, id: TariffId) -> Result<Tariff> {
        self.tariffs
            .read()
            .get(&id)
            .cloned()
            .ok_or(VendError::TariffNotFound(id))
    }

    /// List tariffs, id-ordered. The storefront passes
    /// `include_inactive = false` to hide deactivated plans.
    #[must_use]
    pub fn list(&self, include_inactive: bool) -> Vec<Tariff> {
        self.tariffs
            .read()
            .values()
            .filter(|t| include_inactive || t.active)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.tariffs.read().len()
    }

    /// Apply a partial update.
    ///
    /// # Errors
    /// `TariffNotFound` if absent.
    pub fn update(&self, id: TariffId, patch: TariffPatch) -> Result<Tariff> {
        let mut tariffs = self.tariffs.write();
        let tariff = tariffs.get_mut(&id).ok_or(VendError::TariffNotFound(id))?;
        tariff.apply(patch);
        Ok(tariff.clone())
    }
}
