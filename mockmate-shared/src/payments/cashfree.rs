/// Cashfree Payment Gateway (PG API v2023-08-01)

use super::{
    header_str, hmac_sha256, minor_to_major, OrderRequest, PaymentError, PaymentProvider, ProviderOrder,
    ProviderStatus, Result, StatusReport, WebhookEvent,
};
use async_trait::async_trait;
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

const API_VERSION: &str = "2023-08-01";
const SANDBOX_BASE: &str = "https://sandbox.cashfree.com";
const PRODUCTION_BASE: &str = "https://api.cashfree.com";
const SIGNATURE_HEADER: &str = "x-webhook-signature";
const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";
const FALLBACK_PHONE: &str = "9999999999";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashfreeEnvironment {
    Sandbox,
    Production,
}

impl CashfreeEnvironment {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" | "live" => CashfreeEnvironment::Production,
            _ => CashfreeEnvironment::Sandbox,
        }
    }

    fn base_url(&self) -> &'static str {
        match self {
            CashfreeEnvironment::Sandbox => SANDBOX_BASE,
            CashfreeEnvironment::Production => PRODUCTION_BASE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CashfreeConfig {
    pub app_id: String,
    pub secret_key: String,
    pub environment: CashfreeEnvironment,
    /// Defaults to `secret_key`, which is what Cashfree signs with
    pub webhook_secret: Option<String>,
}

pub struct CashfreeProvider {
    config: CashfreeConfig,
    http: reqwest::Client,
}

impl CashfreeProvider {
    pub fn new(config: CashfreeConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.config.environment.base_url(), path))
            .header("x-client-id", &self.config.app_id)
            .header("x-client-secret", &self.config.secret_key)
            .header("x-api-version", API_VERSION)
    }

    fn webhook_secret(&self) -> &str {
        self.config
            .webhook_secret
            .as_deref()
            .unwrap_or(&self.config.secret_key)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<JsonValue> {
        let response = builder.send().await?;
        let status = response.status();
        let body: JsonValue = response.json().await.unwrap_or(JsonValue::Null);

        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string();
            tracing::error!(status = %status, message = %message, "Cashfree API call failed");
            return Err(PaymentError::ProviderApi(format!("{}: {}", status, message)));
        }

        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct CashfreeOrder {
    cf_order_id: JsonValue,
    payment_session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CashfreePayment {
    cf_payment_id: JsonValue,
    payment_status: String,
}

fn id_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn map_order_status(status: &str) -> ProviderStatus {
    match status {
        "PAID" => ProviderStatus::Paid,
        "EXPIRED" | "TERMINATED" | "TERMINATION_REQUESTED" => ProviderStatus::Failed,
        _ => ProviderStatus::Pending,
    }
}

fn map_payment_status(status: &str) -> ProviderStatus {
    match status {
        "SUCCESS" => ProviderStatus::Paid,
        "FAILED" | "USER_DROPPED" | "CANCELLED" | "VOID" => ProviderStatus::Failed,
        _ => ProviderStatus::Pending,
    }
}

/// Checks `base64(HMAC-SHA256(secret, timestamp + body))`
pub fn verify_signature(secret: &str, timestamp: &str, body: &[u8], signature: &str) -> bool {
    let expected = hmac_sha256(secret.as_bytes(), &[timestamp.as_bytes(), body]);
    match BASE64.decode(signature.trim()) {
        Ok(given) => constant_time_eq(&expected, &given),
        Err(_) => false,
    }
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn parse_webhook(body: &[u8]) -> Result<Option<WebhookEvent>> {
    let payload: JsonValue =
        serde_json::from_slice(body).map_err(|e| PaymentError::InvalidData(format!("webhook body: {}", e)))?;

    let event_type = payload
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string();

    let data = &payload["data"];
    let Some(order_id) = data["order"]["order_id"].as_str() else {
        return Ok(None);
    };
    let Some(payment_status) = data["payment"]["payment_status"].as_str() else {
        return Ok(None);
    };

    Ok(Some(WebhookEvent {
        event_type,
        reference: order_id.to_string(),
        status: map_payment_status(payment_status),
        provider_payment_id: id_to_string(&data["payment"]["cf_payment_id"]),
    }))
}

#[async_trait]
impl PaymentProvider for CashfreeProvider {
    fn name(&self) -> &'static str {
        "cashfree"
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<ProviderOrder> {
        let body = json!({
            "order_id": request.order_id,
            "order_amount": minor_to_major(request.amount_minor),
            "order_currency": request.currency,
            "customer_details": {
                "customer_id": request.customer_id.to_string(),
                "customer_email": request.customer_email,
                "customer_phone": request.customer_phone.as_deref().unwrap_or(FALLBACK_PHONE),
                "customer_name": request.customer_name,
            },
            "order_meta": {
                "return_url": request.return_url(),
            },
            "order_note": request.description,
        });

        let raw = self
            .send(self.request(reqwest::Method::POST, "/pg/orders").json(&body))
            .await?;

        let order: CashfreeOrder = serde_json::from_value(raw.clone())
            .map_err(|e| PaymentError::InvalidData(format!("order response: {}", e)))?;

        let provider_order_id = id_to_string(&order.cf_order_id)
            .ok_or_else(|| PaymentError::InvalidData("missing cf_order_id".to_string()))?;

        tracing::info!(order_id = %request.order_id, cf_order_id = %provider_order_id, "Created Cashfree order");

        Ok(ProviderOrder {
            provider_order_id,
            checkout_url: None,
            session_id: order.payment_session_id,
            raw,
        })
    }

    async fn fetch_status(&self, order_id: &str, _provider_order_id: Option<&str>) -> Result<StatusReport> {
        let order = self
            .send(self.request(reqwest::Method::GET, &format!("/pg/orders/{}", order_id)))
            .await?;

        let status = map_order_status(order["order_status"].as_str().unwrap_or_default());
        if status != ProviderStatus::Paid {
            return Ok(StatusReport {
                status,
                provider_payment_id: None,
            });
        }

        let payments = self
            .send(self.request(reqwest::Method::GET, &format!("/pg/orders/{}/payments", order_id)))
            .await?;
        let payments: Vec<CashfreePayment> = serde_json::from_value(payments).unwrap_or_default();

        let provider_payment_id = payments
            .iter()
            .find(|p| p.payment_status == "SUCCESS")
            .and_then(|p| id_to_string(&p.cf_payment_id));

        Ok(StatusReport {
            status,
            provider_payment_id,
        })
    }

    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<Option<WebhookEvent>> {
        let signature = header_str(headers, SIGNATURE_HEADER).ok_or(PaymentError::InvalidSignature)?;
        let timestamp = header_str(headers, TIMESTAMP_HEADER).ok_or(PaymentError::InvalidSignature)?;

        if !verify_signature(self.webhook_secret(), timestamp, body, signature) {
            tracing::warn!("Rejected Cashfree webhook with bad signature");
            return Err(PaymentError::InvalidSignature);
        }

        parse_webhook(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> CashfreeProvider {
        CashfreeProvider::new(CashfreeConfig {
            app_id: "app".into(),
            secret_key: "cf_secret".into(),
            environment: CashfreeEnvironment::Sandbox,
            webhook_secret: None,
        })
    }

    fn signed_headers(secret: &str, timestamp: &str, body: &[u8]) -> HeaderMap {
        let sig = BASE64.encode(hmac_sha256(secret.as_bytes(), &[timestamp.as_bytes(), body]));
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, sig.parse().unwrap());
        headers.insert(TIMESTAMP_HEADER, timestamp.parse().unwrap());
        headers
    }

    const SUCCESS_BODY: &[u8] = br#"{"type":"PAYMENT_SUCCESS_WEBHOOK","data":{"order":{"order_id":"mm_ord_1"},"payment":{"cf_payment_id":5114910,"payment_status":"SUCCESS"}}}"#;

    #[test]
    fn test_valid_webhook_is_parsed() {
        let headers = signed_headers("cf_secret", "1700000000", SUCCESS_BODY);
        let event = provider().verify_webhook(&headers, SUCCESS_BODY).unwrap().unwrap();

        assert_eq!(event.reference, "mm_ord_1");
        assert_eq!(event.status, ProviderStatus::Paid);
        assert_eq!(event.provider_payment_id.as_deref(), Some("5114910"));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let headers = signed_headers("cf_secret", "1700000000", SUCCESS_BODY);
        let tampered = String::from_utf8_lossy(SUCCESS_BODY).replace("mm_ord_1", "mm_ord_2");

        let result = provider().verify_webhook(&headers, tampered.as_bytes());
        assert!(matches!(result, Err(PaymentError::InvalidSignature)));
    }

    #[test]
    fn test_missing_headers_rejected() {
        let result = provider().verify_webhook(&HeaderMap::new(), SUCCESS_BODY);
        assert!(matches!(result, Err(PaymentError::InvalidSignature)));
    }

    #[test]
    fn test_event_without_payment_is_ignored() {
        let body = br#"{"type":"REFUND_STATUS_WEBHOOK","data":{"refund":{}}}"#;
        let headers = signed_headers("cf_secret", "1", body);
        assert!(provider().verify_webhook(&headers, body).unwrap().is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_order_status("PAID"), ProviderStatus::Paid);
        assert_eq!(map_order_status("ACTIVE"), ProviderStatus::Pending);
        assert_eq!(map_order_status("EXPIRED"), ProviderStatus::Failed);
        assert_eq!(map_payment_status("USER_DROPPED"), ProviderStatus::Failed);
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(CashfreeEnvironment::parse("PRODUCTION"), CashfreeEnvironment::Production);
        assert_eq!(CashfreeEnvironment::parse("anything"), CashfreeEnvironment::Sandbox);
    }
}
