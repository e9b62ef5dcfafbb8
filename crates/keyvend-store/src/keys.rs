//! Key inventory store, the ground truth for every access key.
//!
//! Every mutating contract here is a conditional update: the row is
//! re-checked against its expected pre-state under the same write-lock
//! acquisition that applies the change. Two concurrent reservation attempts
//! on one key therefore cannot both succeed, regardless of what either
//! caller read beforehand. A durable backend would express the same
//! contracts as update-where-status-equals statements.
//!
//! Selection policy: among available keys, lowest id first. Ids are UUIDv7,
//! so this is oldest-inventory-first and no key starves.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use keyvend_types::{
    AccessKey, BuyerId, KeyId, KeyPatch, KeyStatus, Result, SaleChannel, TariffId, VendError,
};
use parking_lot::RwLock;

/// In-memory key inventory with conditional-update semantics.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: RwLock<BTreeMap<KeyId, AccessKey>>,
}

impl KeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key to the inventory.
    pub fn insert(&self, key: AccessKey) -> KeyId {
        let id = key.id;
        self.keys.write().insert(id, key);
        id
    }

    /// Bulk import. The whole batch lands under one lock acquisition.
    ///
    /// # Errors
    /// `EmptyImport` when the batch carries no keys.
    pub fn insert_bulk(&self, batch: Vec<AccessKey>) -> Result<Vec<KeyId>> {
        if batch.is_empty() {
            return Err(VendError::EmptyImport);
        }
        let mut keys = self.keys.write();
        let ids = batch
            .into_iter()
            .map(|key| {
                let id = key.id;
                keys.insert(id, key);
                id
            })
            .collect();
        Ok(ids)
    }

    /// Snapshot of a single key.
    #[must_use]
    pub fn get(&self, id: KeyId) -> Option<AccessKey> {
        self.keys.read().get(&id).cloned()
    }

    /// Snapshot of the whole inventory, id-ordered.
    #[must_use]
    pub fn list(&self) -> Vec<AccessKey> {
        self.keys.read().values().cloned().collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.keys.read().len()
    }

    /// Lowest-id available key, optionally restricted to a tariff.
    ///
    /// The returned row is a snapshot; pair it with [`KeyStore::try_reserve`]
    /// to take the hold.
    #[must_use]
    pub fn find_available(&self, tariff: Option<TariffId>) -> Option<AccessKey> {
        let keys = self.keys.read();
        keys.values()
            .find(|key| {
                key.is_available() && tariff.is_none_or(|t| key.tariff_id == Some(t))
            })
            .cloned()
    }

    /// Reserve a key until `expires_at`.
    ///
    /// # Errors
    /// - `KeyNotFound` if the key does not exist.
    /// - `Conflict` unless the key is still AVAILABLE at write time; the
    ///   caller lost the race and must pick a different candidate.
    pub fn try_reserve(&self, id: KeyId, expires_at: DateTime<Utc>) -> Result<AccessKey> {
        let mut keys = self.keys.write();
        let key = keys.get_mut(&id).ok_or(VendError::KeyNotFound(id))?;
        key.mark_reserved(expires_at)?;
        Ok(key.clone())
    }

    /// Sell a key to a buyer. Takes AVAILABLE or RESERVED keys.
    ///
    /// # Errors
    /// - `KeyNotFound` if the key does not exist.
    /// - `Conflict` if the key is SOLD or DISABLED.
    pub fn sell(
        &self,
        id: KeyId,
        buyer: Option<BuyerId>,
        channel: Option<SaleChannel>,
    ) -> Result<AccessKey> {
        let mut keys = self.keys.write();
        let key = keys.get_mut(&id).ok_or(VendError::KeyNotFound(id))?;
        key.mark_sold(buyer, channel)?;
        Ok(key.clone())
    }

    /// Sell a key through a reservation snapshot.
    ///
    /// Stricter than [`KeyStore::sell`]: the key must still be RESERVED and
    /// its `reserved_until` must equal the snapshot the caller holds. A key
    /// that expired and was re-reserved by a later checkout carries a
    /// different expiry, so a stale settlement cannot take it.
    ///
    /// # Errors
    /// - `KeyNotFound` if the key does not exist.
    /// - `Conflict` when the hold is gone or belongs to someone else.
    pub fn sell_reserved(
        &self,
        id: KeyId,
        expected_expiry: DateTime<Utc>,
        buyer: Option<BuyerId>,
        channel: Option<SaleChannel>,
    ) -> Result<AccessKey> {
        let mut keys = self.keys.write();
        let key = keys.get_mut(&id).ok_or(VendError::KeyNotFound(id))?;
        if key.status != KeyStatus::Reserved {
            return Err(VendError::Conflict {
                key: id,
                reason: format!("expected a live hold, key is {}", key.status),
            });
        }
        if key.reserved_until != Some(expected_expiry) {
            return Err(VendError::Conflict {
                key: id,
                reason: "hold expiry does not match the reservation snapshot".into(),
            });
        }
        key.mark_sold(buyer, channel)?;
        Ok(key.clone())
    }

    /// Release a reservation back to AVAILABLE.
    ///
    /// Silent by contract: a key that is absent or not RESERVED yields
    /// `None` and nothing changes.
    #[must_use]
    pub fn release(&self, id: KeyId) -> Option<AccessKey> {
        let mut keys = self.keys.write();
        let key = keys.get_mut(&id)?;
        if key.status != KeyStatus::Reserved {
            return None;
        }
        key.mark_available().ok()?;
        Some(key.clone())
    }

    /// Reclaim every reservation whose expiry has passed.
    ///
    /// Predicate-guarded bulk update: only rows actually past TTL fire, so
    /// concurrent and repeated sweeps are harmless.
    pub fn release_expired(&self, now: DateTime<Utc>) -> Vec<KeyId> {
        let mut keys = self.keys.write();
        let mut released = Vec::new();
        for key in keys.values_mut() {
            if key.reservation_expired(now) && key.mark_available().is_ok() {
                released.push(key.id);
            }
        }
        if !released.is_empty() {
            tracing::debug!(count = released.len(), "Reclaimed expired key holds");
        }
        released
    }

    /// Apply an inventory-management edit.
    ///
    /// A status change goes through the state machine; patching into
    /// RESERVED is rejected because holds carry an expiry only the reserve
    /// path assigns.
    ///
    /// # Errors
    /// - `KeyNotFound` if the key does not exist.
    /// - `Conflict` for a status change the machine forbids, SOLD keys
    ///   in particular.
    pub fn update(&self, id: KeyId, patch: KeyPatch) -> Result<AccessKey> {
        let mut keys = self.keys.write();
        let key = keys.get_mut(&id).ok_or(VendError::KeyNotFound(id))?;

        if let Some(status) = patch.status {
            if status != key.status {
                match status {
                    KeyStatus::Available => key.mark_available()?,
                    KeyStatus::Disabled => key.mark_disabled()?,
                    KeyStatus::Sold => key.mark_sold(None, None)?,
                    KeyStatus::Reserved => {
                        return Err(VendError::Conflict {
                            key: id,
                            reason: "holds are created by reserve, not by edit".into(),
                        });
                    }
                }
            }
        }
        if let Some(raw_uri) = patch.raw_uri {
            key.raw_uri = raw_uri;
        }
        if let Some(protocol) = patch.protocol {
            key.protocol = protocol;
        }
        if let Some(label) = patch.label {
            key.label = Some(label);
        }
        if let Some(qr) = patch.qr_image_url {
            key.qr_image_url = Some(qr);
        }
        if let Some(tariff) = patch.tariff_id {
            key.tariff_id = Some(tariff);
        }
        if let Some(days) = patch.valid_days {
            key.valid_days = Some(days);
        }
        if let Some(note) = patch.note {
            key.note = Some(note);
        }
        key.updated_at = Utc::now();
        Ok(key.clone())
    }
}
