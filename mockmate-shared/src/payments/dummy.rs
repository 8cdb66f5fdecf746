/// Provider for development and tests: every order is immediately paid

use super::{
    OrderRequest, PaymentError, PaymentProvider, ProviderOrder, ProviderStatus, Result, StatusReport, WebhookEvent,
};
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::json;

pub struct DummyProvider;

#[async_trait]
impl PaymentProvider for DummyProvider {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<ProviderOrder> {
        let session_id = format!("dummy_session_{}_{}", request.customer_id, uuid::Uuid::new_v4());

        tracing::info!(order_id = %request.order_id, "Created dummy order");

        Ok(ProviderOrder {
            provider_order_id: format!("dummy_{}", request.order_id),
            checkout_url: Some(request.return_url()),
            session_id: Some(session_id.clone()),
            raw: json!({ "session_id": session_id, "amount_minor": request.amount_minor }),
        })
    }

    async fn fetch_status(&self, order_id: &str, _provider_order_id: Option<&str>) -> Result<StatusReport> {
        Ok(StatusReport {
            status: ProviderStatus::Paid,
            provider_payment_id: Some(format!("dummy_pay_{}", order_id)),
        })
    }

    fn verify_webhook(&self, _headers: &HeaderMap, _body: &[u8]) -> Result<Option<WebhookEvent>> {
        Err(PaymentError::WebhooksUnsupported("dummy"))
    }
}
