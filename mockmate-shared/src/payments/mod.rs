/// Payment provider abstraction
///
/// A [`PaymentProvider`] creates hosted-checkout orders, reports their status
/// and authenticates webhooks. Fulfilment (marking the payment paid and
/// crediting the user) is provider-independent and lives in
/// [`crate::models::payment::Payment::fulfil`].

use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

pub mod cashfree;
pub mod dummy;
pub mod stripe;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider API error: {0}")]
    ProviderApi(String),

    #[error("HTTP error talking to payment provider: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid payment data: {0}")]
    InvalidData(String),

    #[error("Webhooks are not supported by the {0} provider")]
    WebhooksUnsupported(&'static str),
}

/// Which gateway to use, built from `PAYMENT_PROVIDER` and its settings
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Cashfree(cashfree::CashfreeConfig),
    Stripe(stripe::StripeConfig),
    Dummy,
}

/// The single point where configuration becomes a provider instance
pub fn create_provider(config: ProviderConfig) -> Arc<dyn PaymentProvider> {
    match config {
        ProviderConfig::Cashfree(c) => Arc::new(cashfree::CashfreeProvider::new(c)),
        ProviderConfig::Stripe(c) => Arc::new(stripe::StripeProvider::new(c)),
        ProviderConfig::Dummy => Arc::new(dummy::DummyProvider),
    }
}

/// A purchasable bundle of credits, configured under `payments.packages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPackage {
    pub id: String,
    pub name: String,
    pub credits: i32,
    /// Price in minor units (paise, cents)
    pub amount_minor: i64,
    pub currency: String,
}

/// What the provider needs to open a checkout
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Our order id (`mm_ord_...`)
    pub order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub customer_id: Uuid,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub description: String,
    /// Where the customer lands after paying; `{order_id}` is substituted
    pub return_url: String,
}

impl OrderRequest {
    pub fn return_url(&self) -> String {
        self.return_url.replace("{order_id}", &self.order_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderOrder {
    pub provider_order_id: String,
    pub checkout_url: Option<String>,
    /// Client-side session token (Cashfree `payment_session_id`, Stripe session id)
    pub session_id: Option<String>,
    /// Provider response kept in `payments.metadata`
    pub raw: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Pending,
    Paid,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: ProviderStatus,
    pub provider_payment_id: Option<String>,
}

/// An authenticated webhook notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub event_type: String,
    /// Our order id or the provider's order reference
    pub reference: String,
    pub status: ProviderStatus,
    pub provider_payment_id: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Stored in `payments.provider`
    fn name(&self) -> &'static str;

    async fn create_order(&self, request: &OrderRequest) -> Result<ProviderOrder>;

    async fn fetch_status(&self, order_id: &str, provider_order_id: Option<&str>) -> Result<StatusReport>;

    /// Verifies the signature over the raw body and parses the event
    ///
    /// `Ok(None)` for authentic events that carry no payment outcome.
    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<Option<WebhookEvent>>;
}

type HmacSha256 = Hmac<Sha256>;

pub(crate) fn hmac_sha256(secret: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Converts minor units to the decimal major-unit amount Cashfree expects
pub fn minor_to_major(amount_minor: i64) -> f64 {
    amount_minor as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_known_vector() {
        // RFC 4231 test case 2
        let mac = hmac_sha256(b"Jefe", &[b"what do ya want ", b"for nothing?"]);
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_return_url_substitution() {
        let req = OrderRequest {
            order_id: "mm_ord_1".into(),
            amount_minor: 100,
            currency: "INR".into(),
            customer_id: Uuid::nil(),
            customer_email: "a@b.c".into(),
            customer_name: None,
            customer_phone: None,
            description: "Starter".into(),
            return_url: "https://app.example/payments/{order_id}".into(),
        };
        assert_eq!(req.return_url(), "https://app.example/payments/mm_ord_1");
    }

    #[test]
    fn test_minor_to_major() {
        assert_eq!(minor_to_major(49900), 499.0);
        assert_eq!(minor_to_major(1), 0.01);
    }

    #[test]
    fn test_package_deserializes_from_config() {
        let json = serde_json::json!({"id": "pro", "name": "Pro", "credits": 15, "amount_minor": 129900, "currency": "INR"});
        let pkg: CreditPackage = serde_json::from_value(json).unwrap();
        assert_eq!(pkg.credits, 15);
    }
}
