/// Credit purchase endpoints
///
/// # Flow
///
/// 1. `GET /api/payments/packages` lists what can be bought
/// 2. `POST /api/payments/orders` stores a pending payment and opens a
///    hosted checkout with the configured provider
/// 3. The provider notifies `POST /api/payments/webhook/:provider`, and/or
///    the client calls `POST /api/payments/verify` after returning
/// 4. Either path settles the payment: paid orders are fulfilled exactly
///    once, failed ones are marked failed
///
/// `GET /api/payments/orders/:order_id` and `GET /api/payments/history`
/// report state.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Page, Pagination, ValidJson},
    middleware::auth::CurrentUser,
    ws::events::ServerEvent,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use bytes::Bytes;
use mockmate_shared::{
    email::templates,
    models::{
        activity_log::{ActivityLog, NewActivity},
        alert::{Alert, AlertSeverity, CreateAlert},
        payment::{new_order_id, CreatePayment, Fulfilment, Payment, PaymentFilter, PaymentStatus},
        user::User,
    },
    payments::{minor_to_major, CreditPackage, OrderRequest, ProviderStatus, StatusReport},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct PackagesResponse {
    pub provider: &'static str,
    pub packages: Vec<CreditPackage>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 64, message = "Package id is required"))]
    pub package_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub payment: Payment,
    pub checkout_url: Option<String>,

    /// Token for the provider's client-side checkout
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, max = 128, message = "Order id is required"))]
    pub order_id: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Applies a provider outcome to a stored payment and notifies the buyer
///
/// Returns the payment as it stands afterwards. Safe to call repeatedly for
/// the same order.
pub(crate) async fn settle(state: &AppState, payment: Payment, report: &StatusReport) -> ApiResult<Payment> {
    match report.status {
        ProviderStatus::Pending => Ok(payment),

        ProviderStatus::Failed => {
            let Some(failed) = Payment::mark_unpaid(&state.db, payment.id, PaymentStatus::Failed).await? else {
                return Ok(payment);
            };

            tracing::info!(order_id = %failed.order_id, "Payment failed");
            state.hub.emit_to_user(
                failed.user_id,
                ServerEvent::PaymentStatus {
                    order_id: failed.order_id.clone(),
                    status: failed.status.clone(),
                    credits: 0,
                },
            );
            ActivityLog::record_quietly(
                &state.db,
                NewActivity::new(Some(failed.user_id), "payment.failed").entity("payment", failed.id),
            )
            .await;

            Ok(failed)
        }

        ProviderStatus::Paid => {
            let fulfilment = Payment::fulfil(&state.db, &payment.order_id, report.provider_payment_id.as_deref())
                .await?
                .ok_or_else(|| ApiError::not_found("Order not found"))?;

            match fulfilment {
                Fulfilment::Credited { payment, balance } => {
                    on_credited(state, &payment, balance).await?;
                    Ok(payment)
                }
                Fulfilment::AlreadyPaid(payment) => Ok(payment),
                Fulfilment::NotPending(payment) => {
                    tracing::warn!(
                        order_id = %payment.order_id,
                        status = %payment.status,
                        "Provider reports paid for a payment that is no longer pending"
                    );
                    Ok(payment)
                }
            }
        }
    }
}

async fn on_credited(state: &AppState, payment: &Payment, balance: i32) -> ApiResult<()> {
    tracing::info!(
        order_id = %payment.order_id,
        user_id = %payment.user_id,
        credits = payment.credits,
        balance,
        "Payment fulfilled"
    );

    state.hub.emit_to_user(
        payment.user_id,
        ServerEvent::PaymentStatus {
            order_id: payment.order_id.clone(),
            status: payment.status.clone(),
            credits: payment.credits,
        },
    );
    state
        .hub
        .emit_to_user(payment.user_id, ServerEvent::CreditsUpdated { balance });

    let alert = Alert::create(
        &state.db,
        CreateAlert::new(
            payment.user_id,
            "Payment received",
            format!("{} credits were added to your account.", payment.credits),
        )
        .severity(AlertSeverity::Success)
        .alert_type("payment"),
    )
    .await?;
    super::alerts::deliver(state, &[alert], false).await?;

    if let Some(user) = User::find_by_id(&state.db, payment.user_id).await? {
        let package = state
            .settings
            .credit_packages()
            .await
            .into_iter()
            .find(|p| p.id == payment.package_id)
            .map(|p| p.name)
            .unwrap_or_else(|| payment.package_id.clone());

        state.email.send_template_detached(
            user.email.clone(),
            templates::PAYMENT_RECEIPT,
            json!({
                "app_name": state.settings.app_name().await,
                "name": user.name.as_deref().unwrap_or("there"),
                "order_id": payment.order_id,
                "amount": format!("{:.2}", minor_to_major(payment.amount_minor)),
                "currency": payment.currency,
                "package": package,
                "credits": payment.credits,
                "balance": balance,
            }),
        );
    }

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(payment.user_id), "payment.paid")
            .entity("payment", payment.id)
            .metadata(json!({ "credits": payment.credits, "amount_minor": payment.amount_minor })),
    )
    .await;

    Ok(())
}

async fn own_payment(state: &AppState, user: &User, order_id: &str) -> ApiResult<Payment> {
    Payment::find_by_order_id(&state.db, order_id)
        .await?
        .filter(|p| p.user_id == user.id || user.is_admin())
        .ok_or_else(|| ApiError::not_found("Order not found"))
}

pub async fn packages(State(state): State<AppState>) -> ApiResult<Json<PackagesResponse>> {
    Ok(Json(PackagesResponse {
        provider: state.payments.name(),
        packages: state.settings.credit_packages().await,
    }))
}

/// Opens a checkout for a credit package
///
/// # Errors
///
/// - `400 VALIDATION_ERROR`: unknown package
/// - `503 SERVICE_UNAVAILABLE`: provider unreachable or maintenance mode
pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(req): ValidJson<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<CreateOrderResponse>)> {
    super::ensure_open(&state).await?;

    let package = state
        .settings
        .credit_packages()
        .await
        .into_iter()
        .find(|p| p.id == req.package_id)
        .ok_or_else(|| ApiError::invalid_field("package_id", "Unknown package"))?;

    let payment = Payment::create(
        &state.db,
        CreatePayment {
            user_id: user.id,
            provider: state.payments.name().to_string(),
            order_id: new_order_id(),
            package_id: package.id.clone(),
            amount_minor: package.amount_minor,
            currency: package.currency.clone(),
            credits: package.credits,
        },
    )
    .await?;

    let request = OrderRequest {
        order_id: payment.order_id.clone(),
        amount_minor: payment.amount_minor,
        currency: payment.currency.clone(),
        customer_id: user.id,
        customer_email: user.email.clone(),
        customer_name: user.name.clone(),
        customer_phone: user.phone.clone(),
        description: format!("{} ({} credits)", package.name, package.credits),
        return_url: state.config.app_url("payments/return?order_id={order_id}"),
    };

    let order = match state.payments.create_order(&request).await {
        Ok(order) => order,
        Err(e) => {
            tracing::error!(order_id = %payment.order_id, error = %e, "Provider rejected order");
            Payment::mark_unpaid(&state.db, payment.id, PaymentStatus::Failed).await?;
            return Err(e.into());
        }
    };

    let payment = Payment::attach_provider_order(
        &state.db,
        payment.id,
        &order.provider_order_id,
        order.checkout_url.as_deref(),
        json!({ "provider_response": order.raw }),
    )
    .await?;

    tracing::info!(order_id = %payment.order_id, package = %package.id, provider = state.payments.name(), "Order created");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(user.id), "payment.order_created").entity("payment", payment.id),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            checkout_url: order.checkout_url,
            session_id: order.session_id,
            payment,
        }),
    ))
}

pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Payment>> {
    Ok(Json(own_payment(&state, &user, &order_id).await?))
}

/// Asks the provider for the order's status and settles it
pub async fn verify(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(req): ValidJson<VerifyPaymentRequest>,
) -> ApiResult<Json<Payment>> {
    let payment = own_payment(&state, &user, &req.order_id).await?;

    if payment.get_status() != Some(PaymentStatus::Pending) {
        return Ok(Json(payment));
    }

    let report = state
        .payments
        .fetch_status(&payment.order_id, payment.provider_order_id.as_deref())
        .await?;

    Ok(Json(settle(&state, payment, &report).await?))
}

pub async fn history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<Page<Payment>>> {
    let filter = PaymentFilter {
        user_id: Some(user.id),
        status: None,
    };

    let items = Payment::list(&state.db, &filter, pagination.limit(), pagination.offset()).await?;
    let total = Payment::count(&state.db, &filter).await?;

    Ok(Json(pagination.wrap(items, total)))
}

/// Provider notification
///
/// The signature is checked over the raw body before anything is parsed.
/// Events for unknown orders are acknowledged so the provider stops
/// retrying them.
///
/// # Errors
///
/// - `401 INVALID_SIGNATURE`
/// - `404 NOT_FOUND`: `:provider` is not the active provider
pub async fn webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    if provider != state.payments.name() {
        return Err(ApiError::not_found(format!("No webhook endpoint for '{}'", provider)));
    }

    let Some(event) = state.payments.verify_webhook(&headers, &body)? else {
        return Ok(Json(WebhookAck {
            received: true,
            status: None,
        }));
    };

    tracing::info!(provider = %provider, event_type = %event.event_type, reference = %event.reference, "Webhook received");

    let Some(payment) = Payment::find_by_any_reference(&state.db, &event.reference).await? else {
        tracing::warn!(reference = %event.reference, "Webhook for unknown order");
        return Ok(Json(WebhookAck {
            received: true,
            status: None,
        }));
    };

    let report = StatusReport {
        status: event.status,
        provider_payment_id: event.provider_payment_id,
    };
    let payment = settle(&state, payment, &report).await?;

    Ok(Json(WebhookAck {
        received: true,
        status: Some(payment.status),
    }))
}
