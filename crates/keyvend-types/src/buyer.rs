//! Buyers: the accounts keys are sold to.
//!
//! A buyer is either a storefront account or a bot user identified by an
//! external messenger handle. Settlement only touches the purchase counter,
//! and only best-effort.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BuyerId;

/// A buyer account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buyer {
    pub id: BuyerId,
    /// Messenger-side identifier for bot buyers.
    pub external_handle: Option<String>,
    pub username: Option<String>,
    /// Settled purchases. Incremented best-effort on settlement.
    pub purchase_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Buyer {
    /// Create an anonymous buyer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: BuyerId::new(),
            external_handle: None,
            username: None,
            purchase_count: 0,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.external_handle = Some(handle.into());
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl Default for Buyer {
    fn default() -> Self {
        Self::new()
    }
}
