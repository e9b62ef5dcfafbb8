//! System-wide constants for the KeyVend engine.

/// How long a reservation holds a key before the sweeper reclaims it.
pub const RESERVATION_TTL_MINUTES: i64 = 15;

/// Interval of the background sweep safety net, in seconds.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// How many times a lost key-status race is retried with a fresh candidate.
/// Never retried against the same key.
pub const CONFLICT_RETRY_LIMIT: usize = 1;

/// Default validity of a key sold without a per-key or tariff override.
pub const DEFAULT_VALID_DAYS: u32 = 30;

/// Default CrystalPay hosted-checkout endpoint.
pub const DEFAULT_CRYSTALPAY_HOST: &str = "https://pay.crystalpay.io/invoice";

/// Default Enot hosted-checkout endpoint.
pub const DEFAULT_ENOT_HOST: &str = "https://enot.io/pay";

/// Shop id used when a provider profile has none configured.
pub const DEFAULT_SHOP_ID: &str = "demo-shop";

/// Base URL providers call back into when none is configured.
pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://api.keyvend.dev";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "KeyVend";
