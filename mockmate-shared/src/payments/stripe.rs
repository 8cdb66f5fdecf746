/// Stripe Checkout Sessions over the REST API

use super::cashfree::constant_time_eq;
use super::{
    header_str, hmac_sha256, OrderRequest, PaymentError, PaymentProvider, ProviderOrder, ProviderStatus, Result,
    StatusReport, WebhookEvent,
};
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value as JsonValue;

const API_BASE: &str = "https://api.stripe.com/v1";
const SIGNATURE_HEADER: &str = "stripe-signature";
/// Maximum age of a signed webhook
const TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

pub struct StripeProvider {
    config: StripeConfig,
    http: reqwest::Client,
}

impl StripeProvider {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<JsonValue> {
        let response = builder.bearer_auth(&self.config.secret_key).send().await?;
        let status = response.status();
        let body: JsonValue = response.json().await.unwrap_or(JsonValue::Null);

        if !status.is_success() {
            let message = body["error"]["message"].as_str().unwrap_or("unknown error").to_string();
            tracing::error!(status = %status, message = %message, "Stripe API call failed");
            return Err(PaymentError::ProviderApi(format!("{}: {}", status, message)));
        }

        Ok(body)
    }
}

fn session_status(session: &JsonValue) -> ProviderStatus {
    match (session["payment_status"].as_str(), session["status"].as_str()) {
        (Some("paid"), _) | (Some("no_payment_required"), _) => ProviderStatus::Paid,
        (_, Some("expired")) => ProviderStatus::Failed,
        _ => ProviderStatus::Pending,
    }
}

fn payment_intent_id(session: &JsonValue) -> Option<String> {
    match &session["payment_intent"] {
        JsonValue::String(id) => Some(id.clone()),
        JsonValue::Object(obj) => obj.get("id").and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

/// Checks a `t=<ts>,v1=<hex>` header against `HMAC-SHA256(secret, "<ts>.<body>")`
pub fn verify_signature(secret: &str, header: &str, body: &[u8], now: i64) -> Result<()> {
    if secret.is_empty() {
        return Err(PaymentError::InvalidSignature);
    }

    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(PaymentError::InvalidSignature)?;
    if (now - timestamp).abs() > TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature);
    }

    let expected = hmac_sha256(secret.as_bytes(), &[timestamp.to_string().as_bytes(), b".", body]);
    let matched = candidates
        .iter()
        .filter_map(|c| hex::decode(c).ok())
        .any(|given| constant_time_eq(&expected, &given));

    if matched {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature)
    }
}

fn parse_event(body: &[u8]) -> Result<Option<WebhookEvent>> {
    let event: JsonValue =
        serde_json::from_slice(body).map_err(|e| PaymentError::InvalidData(format!("webhook body: {}", e)))?;

    let event_type = event["type"].as_str().unwrap_or_default().to_string();
    let status = match event_type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            session_status(&event["data"]["object"])
        }
        "checkout.session.expired" | "checkout.session.async_payment_failed" => ProviderStatus::Failed,
        _ => return Ok(None),
    };

    let session = &event["data"]["object"];
    let reference = session["client_reference_id"]
        .as_str()
        .or_else(|| session["metadata"]["order_id"].as_str())
        .or_else(|| session["id"].as_str())
        .ok_or_else(|| PaymentError::InvalidData("session without reference".to_string()))?
        .to_string();

    Ok(Some(WebhookEvent {
        event_type,
        reference,
        status,
        provider_payment_id: payment_intent_id(session),
    }))
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<ProviderOrder> {
        let return_url = request.return_url();
        let amount = request.amount_minor.to_string();
        let currency = request.currency.to_ascii_lowercase();
        let customer = request.customer_id.to_string();

        let form = [
            ("mode", "payment"),
            ("success_url", return_url.as_str()),
            ("cancel_url", return_url.as_str()),
            ("client_reference_id", request.order_id.as_str()),
            ("customer_email", request.customer_email.as_str()),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", currency.as_str()),
            ("line_items[0][price_data][unit_amount]", amount.as_str()),
            ("line_items[0][price_data][product_data][name]", request.description.as_str()),
            ("metadata[order_id]", request.order_id.as_str()),
            ("metadata[user_id]", customer.as_str()),
        ];

        let raw = self
            .send(self.http.post(format!("{}/checkout/sessions", API_BASE)).form(&form))
            .await?;

        let session_id = raw["id"]
            .as_str()
            .ok_or_else(|| PaymentError::InvalidData("missing session id".to_string()))?
            .to_string();

        tracing::info!(order_id = %request.order_id, session_id = %session_id, "Created Stripe checkout session");

        Ok(ProviderOrder {
            provider_order_id: session_id.clone(),
            checkout_url: raw["url"].as_str().map(str::to_string),
            session_id: Some(session_id),
            raw,
        })
    }

    async fn fetch_status(&self, _order_id: &str, provider_order_id: Option<&str>) -> Result<StatusReport> {
        let session_id = provider_order_id
            .ok_or_else(|| PaymentError::InvalidData("payment has no checkout session".to_string()))?;

        let session = self
            .send(self.http.get(format!("{}/checkout/sessions/{}", API_BASE, session_id)))
            .await?;

        Ok(StatusReport {
            status: session_status(&session),
            provider_payment_id: payment_intent_id(&session),
        })
    }

    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<Option<WebhookEvent>> {
        let header = header_str(headers, SIGNATURE_HEADER).ok_or(PaymentError::InvalidSignature)?;

        if let Err(e) = verify_signature(&self.config.webhook_secret, header, body, chrono::Utc::now().timestamp()) {
            tracing::warn!("Rejected Stripe webhook with bad signature");
            return Err(e);
        }

        parse_event(body)
    }
}
