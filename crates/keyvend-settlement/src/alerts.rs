//! Operational alerts.
//!
//! A payment can settle without a deliverable key (inventory ran dry, or the
//! hold expired and the key went to someone else). The money is taken and
//! nothing was delivered, so the condition must surface to an operator
//! instead of disappearing into a log line.

use std::fmt;

use keyvend_types::{KeyId, PaymentId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A condition that needs operator attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpsAlert {
    /// A payment settled and no key could be delivered.
    PaidNoKey {
        payment: PaymentId,
        /// The key the checkout originally held, when there was one.
        reserved_key: Option<KeyId>,
    },
}

impl fmt::Display for OpsAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PaidNoKey {
                payment,
                reserved_key: Some(key),
            } => write!(f, "{payment} settled without a key, snapshot held {key}"),
            Self::PaidNoKey {
                payment,
                reserved_key: None,
            } => write!(f, "{payment} settled without a key, no hold existed"),
        }
    }
}

/// Where the coordinator reports alerts.
pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: OpsAlert);
}

/// In-memory alert buffer an operator surface can poll and acknowledge.
#[derive(Debug, Default)]
pub struct AlertLog {
    alerts: RwLock<Vec<OpsAlert>>,
}

impl AlertLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every unacknowledged alert, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<OpsAlert> {
        self.alerts.read().clone()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.alerts.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }

    /// Take every alert out of the buffer (operator acknowledgement).
    pub fn drain(&self) -> Vec<OpsAlert> {
        std::mem::take(&mut *self.alerts.write())
    }
}

impl AlertSink for AlertLog {
    fn raise(&self, alert: OpsAlert) {
        tracing::warn!(alert = %alert, "Operational alert raised");
        self.alerts.write().push(alert);
    }
}
