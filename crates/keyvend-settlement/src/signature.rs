//! Callback signature scheme.
//!
//! Providers confirm payments by calling back with the external correlation
//! id, the amount, and an HMAC-SHA256 signature over
//! `"<external_id>:<amount>"` (lowercase hex). The secret is per-provider and
//! operator-configured.
//!
//! A provider profile without a secret runs in dev mode: every callback
//! verifies trivially. That is acceptable on a workbench and nowhere else,
//! so each unsigned acceptance is logged at WARN.

use hmac::{Hmac, Mac};
use keyvend_types::{ExternalId, ProviderId, Result, VendError};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(secret: &str, external_id: &ExternalId, amount_minor: i64) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VendError::Internal("HMAC key setup failed".into()))?;
    mac.update(format!("{}:{amount_minor}", external_id.as_str()).as_bytes());
    Ok(mac)
}

/// Sign a checkout for the provider.
///
/// Returns the lowercase hex digest the provider must echo back.
pub fn sign(secret: &str, external_id: &ExternalId, amount_minor: i64) -> Result<String> {
    let mac = keyed_mac(secret, external_id, amount_minor)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a callback signature.
///
/// Comparison runs in constant time via [`Mac::verify_slice`]. With no
/// secret configured the callback passes unchecked (dev mode).
///
/// # Errors
/// `InvalidSignature` when a secret is configured and the presented
/// signature is absent, malformed hex, or a mismatch.
pub fn verify(
    secret: Option<&str>,
    provider: ProviderId,
    external_id: &ExternalId,
    amount_minor: i64,
    presented: Option<&str>,
) -> Result<()> {
    let Some(secret) = secret else {
        tracing::warn!(
            provider = %provider,
            external_id = %external_id,
            "No callback secret configured, accepting unsigned callback"
        );
        return Ok(());
    };
    let presented = presented.ok_or(VendError::InvalidSignature { provider })?;
    let sig_bytes =
        hex::decode(presented).map_err(|_| VendError::InvalidSignature { provider })?;
    let mac = keyed_mac(secret, external_id, amount_minor)?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| VendError::InvalidSignature { provider })?;
    Ok(())
}
