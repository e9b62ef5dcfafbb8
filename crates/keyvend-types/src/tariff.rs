//! Tariffs: the priced plans keys are sold under.
//!
//! Tariffs are never deleted once a payment references them; operators
//! deactivate them instead. Price edits apply to future checkouts only,
//! because every payment copies the price at creation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TariffId;

/// Protocol family a tariff (or key) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolClass {
    /// No protocol restriction.
    #[default]
    Any,
    Wireguard,
    Shadowsocks,
    Vless,
}

impl std::fmt::Display for ProtocolClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Wireguard => write!(f, "wireguard"),
            Self::Shadowsocks => write!(f, "shadowsocks"),
            Self::Vless => write!(f, "vless"),
        }
    }
}

/// A priced plan. `price_minor` is in minor currency units (e.g. cents).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tariff {
    pub id: TariffId,
    pub name: String,
    pub description: Option<String>,
    pub price_minor: i64,
    /// How long a key sold under this tariff stays valid.
    pub valid_days: u32,
    pub protocol: ProtocolClass,
    /// Inactive tariffs are hidden from the storefront but remain
    /// purchasable by direct id and keep their sold keys valid.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tariff {
    /// Create an active tariff with default validity (30 days).
    #[must_use]
    pub fn new(name: impl Into<String>, price_minor: i64) -> Self {
        let now = Utc::now();
        Self {
            id: TariffId::new(),
            name: name.into(),
            description: None,
            price_minor,
            valid_days: crate::constants::DEFAULT_VALID_DAYS,
            protocol: ProtocolClass::Any,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolClass) -> Self {
        self.protocol = protocol;
        self
    }

    #[must_use]
    pub fn with_valid_days(mut self, days: u32) -> Self {
        self.valid_days = days;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Apply a partial update, touching `updated_at` only when something
    /// actually changed.
    pub fn apply(&mut self, patch: TariffPatch) {
        let mut touched = false;
        if let Some(name) = patch.name {
            self.name = name;
            touched = true;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
            touched = true;
        }
        if let Some(price) = patch.price_minor {
            self.price_minor = price;
            touched = true;
        }
        if let Some(days) = patch.valid_days {
            self.valid_days = days;
            touched = true;
        }
        if let Some(protocol) = patch.protocol {
            self.protocol = protocol;
            touched = true;
        }
        if let Some(active) = patch.active {
            self.active = active;
            touched = true;
        }
        if touched {
            self.updated_at = Utc::now();
        }
    }
}

/// Partial tariff update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TariffPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_minor: Option<i64>,
    pub valid_days: Option<u32>,
    pub protocol: Option<ProtocolClass>,
    pub active: Option<bool>,
}
