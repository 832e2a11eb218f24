use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{run, Caller, Service};
use crate::domain::payment::{Gateway, GatewayEvent, Payment, PaymentAttempt};
use crate::errors::AppError;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterPaymentRequest {
    /// `mercadopago`, `pagseguro` or `stripe`.
    pub gateway: String,
    pub method: String,
    pub external_transaction_id: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub raw_payload: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub gateway: String,
    pub method: String,
    pub amount: String,
    pub status: String,
    pub external_transaction_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        PaymentResponse {
            id: p.id,
            order_id: p.order_id,
            gateway: p.gateway.as_str().to_string(),
            method: p.method,
            amount: p.amount.to_string(),
            status: p.status.as_str().to_string(),
            external_transaction_id: p.external_transaction_id,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Gateway notification as delivered to the webhook.
#[derive(Debug, Deserialize, ToSchema)]
pub struct GatewayNotification {
    pub external_transaction_id: String,
    /// Status in the gateway's own vocabulary, e.g. `approved`, `in_process`.
    pub gateway_status: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub raw_payload: Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookResponse {
    /// `noop`, `updated`, `order_paid`, `stock_shortfall` or `refund_requested`.
    pub result: String,
    #[schema(value_type = Object)]
    pub detail: Value,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /orders/{id}/payments
///
/// Registers a charge already created at the gateway. The payment starts
/// `pending` and is settled by the gateway's webhook.
#[utoipa::path(
    post,
    path = "/orders/{id}/payments",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body = RegisterPaymentRequest,
    responses(
        (status = 201, description = "Pending payment recorded", body = PaymentResponse),
        (status = 400, description = "Order is not awaiting payment or the request is invalid"),
        (status = 409, description = "Transaction id already registered"),
    ),
    tag = "payments"
)]
pub async fn register_payment(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<RegisterPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let body = body.into_inner();
    let attempt = PaymentAttempt {
        gateway: body.gateway.parse::<Gateway>()?,
        method: body.method,
        external_transaction_id: body.external_transaction_id,
        raw_payload: body.raw_payload.unwrap_or(Value::Null),
    };
    let payment = run(service, move |svc| {
        svc.register_payment(&caller.0, order_id, attempt)
    })
    .await?;
    Ok(HttpResponse::Created().json(PaymentResponse::from(payment)))
}

/// GET /orders/{id}/payments
#[utoipa::path(
    get,
    path = "/orders/{id}/payments",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Every payment attempt for the order", body = Vec<PaymentResponse>),
        (status = 404, description = "Order not found"),
    ),
    tag = "payments"
)]
pub async fn list_payments(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let payments = run(service, move |svc| svc.order_payments(&caller.0, order_id)).await?;
    let body: Vec<PaymentResponse> = payments.into_iter().map(PaymentResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// POST /webhooks/payments/{gateway}
///
/// Applies a gateway notification. Redeliveries and late events answer 200
/// with `noop` and change nothing.
#[utoipa::path(
    post,
    path = "/webhooks/payments/{gateway}",
    params(("gateway" = String, Path, description = "mercadopago, pagseguro or stripe")),
    request_body = GatewayNotification,
    responses(
        (status = 200, description = "Notification applied (or already applied)", body = WebhookResponse),
        (status = 400, description = "Malformed payload or unknown gateway"),
        (status = 404, description = "Unknown transaction id"),
        (status = 409, description = "Notification would regress a paid payment"),
    ),
    tag = "payments"
)]
pub async fn gateway_webhook(
    service: web::Data<Service>,
    path: web::Path<String>,
    body: web::Json<GatewayNotification>,
) -> Result<HttpResponse, AppError> {
    let gateway: Gateway = path.into_inner().parse()?;
    let body = body.into_inner();
    if body.external_transaction_id.trim().is_empty() {
        return Err(AppError::BadRequest("external_transaction_id is required".to_string()));
    }
    let event = GatewayEvent {
        gateway,
        external_transaction_id: body.external_transaction_id.trim().to_string(),
        gateway_status: body.gateway_status,
        raw_payload: body.raw_payload,
    };
    let outcome = run(service, move |svc| svc.apply_gateway_event(event)).await?;

    let mut detail = serde_json::to_value(&outcome).map_err(|e| AppError::Internal(e.to_string()))?;
    let result = detail
        .as_object_mut()
        .and_then(|fields| fields.remove("result"))
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    Ok(HttpResponse::Ok().json(WebhookResponse { result, detail }))
}
