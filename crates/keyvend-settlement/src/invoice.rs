//! Invoice building.
//!
//! Checkout happens on the provider's hosted page: the engine only builds
//! the redirect URL and the payload persisted on the payment for audit.
//! [`InvoiceGateway`] is the seam a real provider API client would plug
//! into; [`HostedCheckoutGateway`] is the production implementation for
//! providers that accept query-string invoices.

use keyvend_types::{ExternalId, ProviderId, ProviderSettings, Result, VendError};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::signature;

/// Everything the gateway needs to build one invoice.
///
/// The settings snapshot travels inside the request because provider
/// settings are operator-editable: whatever was configured when the
/// checkout started is what this invoice is built against.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub provider: ProviderId,
    pub external_id: ExternalId,
    pub amount_minor: i64,
    /// Human-readable purchase description, shown on the checkout page.
    pub description: String,
    pub settings: ProviderSettings,
}

/// The provider-facing record of one checkout, persisted on the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum ProviderPayload {
    #[serde(rename = "crystalpay", rename_all = "camelCase")]
    CrystalPay {
        shop_id: String,
        amount: i64,
        order: String,
        description: String,
        callback: String,
    },
    #[serde(rename = "enot", rename_all = "camelCase")]
    Enot {
        shop_id: String,
        amount: i64,
        order: String,
        description: String,
        callback: String,
    },
}

impl ProviderPayload {
    #[must_use]
    pub fn provider(&self) -> ProviderId {
        match self {
            Self::CrystalPay { .. } => ProviderId::CrystalPay,
            Self::Enot { .. } => ProviderId::Enot,
        }
    }
}

/// A built invoice: where to send the buyer, and what was sent.
#[derive(Debug, Clone)]
pub struct Invoice {
    /// Hosted checkout page for the buyer.
    pub checkout_url: String,
    /// Provider payload, kept on the payment row.
    pub payload: ProviderPayload,
    /// Signature over the invoice, when a secret is configured.
    pub signature: Option<String>,
}

/// Outbound invoice collaborator.
pub trait InvoiceGateway: Send + Sync {
    fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice>;
}

/// Builds hosted-checkout URLs of the shape
/// `<host>?order=<external_id>&amount=<amount>&desc=<description>`, plus a
/// `signature` parameter when the provider profile carries a secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostedCheckoutGateway;

impl HostedCheckoutGateway {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl InvoiceGateway for HostedCheckoutGateway {
    fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice> {
        let provider = request.provider;
        let settings = &request.settings;

        let host = settings.checkout_host(provider);
        let mut url = Url::parse(host).map_err(|err| VendError::InvoiceRejected {
            reason: format!("bad checkout host {host}: {err}"),
        })?;
        url.query_pairs_mut()
            .append_pair("order", request.external_id.as_str())
            .append_pair("amount", &request.amount_minor.to_string())
            .append_pair("desc", &request.description);

        let signature = match settings.secret(provider) {
            Some(secret) => Some(signature::sign(
                secret,
                &request.external_id,
                request.amount_minor,
            )?),
            None => None,
        };
        if let Some(sig) = &signature {
            url.query_pairs_mut().append_pair("signature", sig);
        }

        let shop_id = settings.shop_id(provider).to_string();
        let order = request.external_id.to_string();
        let description = request.description.clone();
        let callback = settings.callback_url(provider);
        let payload = match provider {
            ProviderId::CrystalPay => ProviderPayload::CrystalPay {
                shop_id,
                amount: request.amount_minor,
                order,
                description,
                callback,
            },
            ProviderId::Enot => ProviderPayload::Enot {
                shop_id,
                amount: request.amount_minor,
                order,
                description,
                callback,
            },
        };

        tracing::debug!(
            provider = %provider,
            external_id = %request.external_id,
            amount = request.amount_minor,
            signed = signature.is_some(),
            "Invoice built"
        );
        Ok(Invoice {
            checkout_url: url.to_string(),
            payload,
            signature,
        })
    }
}
