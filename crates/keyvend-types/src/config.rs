//! Configuration types for the KeyVend engine.
//!
//! Provider settings are operator-editable at runtime, so the engine never
//! caches them: each operation receives a snapshot looked up at its start.

use serde::{Deserialize, Serialize};

use crate::{ProviderId, constants};

/// Per-provider connection profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Hosted-checkout endpoint override. `None` falls back to the
    /// provider's default host.
    pub checkout_host: Option<String>,
    /// Merchant identifier at the provider.
    pub shop_id: Option<String>,
    /// Callback signing secret. `None` switches callback verification into
    /// the dev-mode pass-through; never leave it unset in production.
    pub secret: Option<String>,
}

/// Snapshot of the operator-editable provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider new checkouts are routed through.
    pub active_provider: ProviderId,
    /// Base URL providers call back into.
    pub public_base_url: String,
    pub crystalpay: ProviderProfile,
    pub enot: ProviderProfile,
}

impl ProviderSettings {
    #[must_use]
    pub fn profile(&self, provider: ProviderId) -> &ProviderProfile {
        match provider {
            ProviderId::CrystalPay => &self.crystalpay,
            ProviderId::Enot => &self.enot,
        }
    }

    /// Signing secret for the provider, when one is configured.
    #[must_use]
    pub fn secret(&self, provider: ProviderId) -> Option<&str> {
        self.profile(provider).secret.as_deref()
    }

    /// Checkout host for the provider, falling back to the default.
    #[must_use]
    pub fn checkout_host(&self, provider: ProviderId) -> &str {
        self.profile(provider)
            .checkout_host
            .as_deref()
            .unwrap_or(match provider {
                ProviderId::CrystalPay => constants::DEFAULT_CRYSTALPAY_HOST,
                ProviderId::Enot => constants::DEFAULT_ENOT_HOST,
            })
    }

    /// Shop id for the provider, falling back to the demo value.
    #[must_use]
    pub fn shop_id(&self, provider: ProviderId) -> &str {
        self.profile(provider)
            .shop_id
            .as_deref()
            .unwrap_or(constants::DEFAULT_SHOP_ID)
    }

    /// Callback URL the provider should confirm payments against.
    #[must_use]
    pub fn callback_url(&self, provider: ProviderId) -> String {
        format!(
            "{}/api/payments/callback/{provider}",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            active_provider: ProviderId::CrystalPay,
            public_base_url: constants::DEFAULT_PUBLIC_BASE_URL.to_string(),
            crystalpay: ProviderProfile::default(),
            enot: ProviderProfile::default(),
        }
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reservation TTL in minutes.
    pub reservation_ttl_minutes: i64,
    /// Background sweep interval in seconds.
    pub sweep_interval_secs: u64,
}

impl EngineConfig {
    /// Reservation TTL as a duration.
    #[must_use]
    pub fn reservation_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.reservation_ttl_minutes)
    }

    /// Sweep interval as a duration.
    #[must_use]
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_minutes: constants::RESERVATION_TTL_MINUTES,
            sweep_interval_secs: constants::SWEEP_INTERVAL_SECS,
        }
    }
}
