//! Buyer registry: accounts and their purchase counters.
//!
//! Bot buyers are keyed by an external messenger handle and upserted on
//! contact. The purchase counter is a convenience statistic: settlement
//! increments it best-effort and never fails because of it.

use std::collections::BTreeMap;

use keyvend_types::{Buyer, BuyerId};
use parking_lot::RwLock;

/// In-memory buyer registry.
#[derive(Debug, Default)]
pub struct BuyerRegistry {
    buyers: RwLock<BTreeMap<BuyerId, Buyer>>,
}

impl BuyerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a buyer account.
    pub fn insert(&self, buyer: Buyer) -> BuyerId {
        let id = buyer.id;
        self.buyers.write().insert(id, buyer);
        id
    }

    /// Snapshot of a single buyer.
    #[must_use]
    pub fn get(&self, id: BuyerId) -> Option<Buyer> {
        self.buyers.read().get(&id).cloned()
    }

    /// All buyers, id-ordered.
    #[must_use]
    pub fn list(&self) -> Vec<Buyer> {
        self.buyers.read().values().cloned().collect()
    }

    /// Find or create the buyer for an external messenger handle. A fresh
    /// username on a known handle overwrites the stored one.
    pub fn upsert_bot_buyer(&self, handle: &str, username: Option<&str>) -> Buyer {
        let mut buyers = self.buyers.write();
        if let Some(existing) = buyers
            .values_mut()
            .find(|b| b.external_handle.as_deref() == Some(handle))
        {
            if let Some(name) = username {
                existing.username = Some(name.to_string());
            }
            return existing.clone();
        }
        let mut buyer = Buyer::new().with_handle(handle);
        if let Some(name) = username {
            buyer = buyer.with_username(name);
        }
        let created = buyer.clone();
        buyers.insert(buyer.id, buyer);
        created
    }

    /// Bump the purchase counter. Best-effort by contract: an anonymous
    /// payment (`None`) or an unknown buyer is a silent no-op.
    pub fn increment_purchases(&self, id: Option<BuyerId>) {
        let Some(id) = id else { return };
        let mut buyers = self.buyers.write();
        match buyers.get_mut(&id) {
            Some(buyer) => buyer.purchase_count += 1,
            None => {
                tracing::debug!(buyer = %id, "Purchase counter skipped, buyer unknown");
            }
        }
    }
}
