use actix_web::{web, HttpResponse};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::finance::CommissionResponse;
use super::{run, Caller, Service};
use crate::application::ShipmentDetails;
use crate::domain::errors::DomainError;
use crate::domain::order::{CheckoutLine, CheckoutRequest, Order, OrderItem, OrderView, ShippingAddress};
use crate::domain::prescription::{PrescriberIdentity, Prescription, PrescriptionUpload};
use crate::domain::Outcome;
use crate::errors::AppError;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddressBody {
    pub recipient: String,
    pub street: String,
    pub number: String,
    #[serde(default)]
    pub complement: Option<String>,
    pub district: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl From<ShippingAddressBody> for ShippingAddress {
    fn from(b: ShippingAddressBody) -> Self {
        ShippingAddress {
            recipient: b.recipient,
            street: b.street,
            number: b.number,
            complement: b.complement,
            district: b.district,
            city: b.city,
            state: b.state,
            postal_code: b.postal_code,
            country: b.country,
        }
    }
}

impl From<ShippingAddress> for ShippingAddressBody {
    fn from(a: ShippingAddress) -> Self {
        ShippingAddressBody {
            recipient: a.recipient,
            street: a.street,
            number: a.number,
            complement: a.complement,
            district: a.district,
            city: a.city,
            state: a.state,
            postal_code: a.postal_code,
            country: a.country,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequestBody {
    #[serde(default)]
    pub doctor_id: Option<Uuid>,
    pub items: Vec<CheckoutLineRequest>,
    /// Decimal amount as a string, e.g. "10.00". Defaults to zero.
    #[serde(default)]
    pub discount: Option<String>,
    pub payment_method: String,
    pub shipping_address: ShippingAddressBody,
}

impl TryFrom<CheckoutRequestBody> for CheckoutRequest {
    type Error = DomainError;

    fn try_from(body: CheckoutRequestBody) -> Result<Self, Self::Error> {
        let discount = match body.discount.as_deref() {
            None => BigDecimal::zero(),
            Some(raw) => parse_money("discount", raw)?,
        };
        Ok(CheckoutRequest {
            doctor_id: body.doctor_id,
            lines: body
                .items
                .into_iter()
                .map(|l| CheckoutLine {
                    product_id: l.product_id,
                    quantity: l.quantity,
                })
                .collect(),
            discount,
            payment_method: body.payment_method,
            shipping_address: body.shipping_address.into(),
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: String,
    pub line_total: String,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(i: OrderItem) -> Self {
        OrderItemResponse {
            id: i.id,
            product_id: i.product_id,
            quantity: i.quantity,
            unit_price: i.unit_price.to_string(),
            line_total: i.line_total.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub code: String,
    pub client_id: Uuid,
    pub vendor_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub prescription_id: Option<Uuid>,
    pub status: String,
    pub subtotal: String,
    pub discount: String,
    pub total: String,
    pub payment_method: String,
    pub shipping_address: ShippingAddressBody,
    pub tracking_code: Option<String>,
    pub carrier: Option<String>,
    pub cancellation_reason: Option<String>,
    /// Set when a payment arrived but stock could not be committed.
    pub stock_shortfall: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<OrderItemResponse>>,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        OrderResponse {
            id: o.id,
            code: o.code,
            client_id: o.client_id,
            vendor_id: o.vendor_id,
            doctor_id: o.doctor_id,
            prescription_id: o.prescription_id,
            status: o.status.as_str().to_string(),
            subtotal: o.subtotal.to_string(),
            discount: o.discount.to_string(),
            total: o.total.to_string(),
            payment_method: o.payment_method,
            shipping_address: o.shipping_address.into(),
            tracking_code: o.tracking_code,
            carrier: o.carrier,
            cancellation_reason: o.cancellation_reason,
            stock_shortfall: o.stock_shortfall,
            approved_at: o.approved_at,
            cancelled_at: o.cancelled_at,
            created_at: o.created_at,
            updated_at: o.updated_at,
            items: None,
        }
    }
}

impl From<OrderView> for OrderResponse {
    fn from(view: OrderView) -> Self {
        let mut response = OrderResponse::from(view.order);
        response.items = Some(view.items.into_iter().map(OrderItemResponse::from).collect());
        response
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitPrescriptionRequest {
    pub file_reference: String,
    pub prescriber_name: String,
    pub prescriber_registration: String,
    pub prescriber_jurisdiction: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PrescriptionResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub file_reference: String,
    pub prescriber_name: String,
    pub prescriber_registration: String,
    pub prescriber_jurisdiction: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Prescription> for PrescriptionResponse {
    fn from(p: Prescription) -> Self {
        PrescriptionResponse {
            id: p.id,
            order_id: p.order_id,
            file_reference: p.file_reference,
            prescriber_name: p.prescriber.name,
            prescriber_registration: p.prescriber.registration,
            prescriber_jurisdiction: p.prescriber.jurisdiction,
            status: p.status.as_str().to_string(),
            rejection_reason: p.rejection_reason,
            reviewed_by: p.reviewed_by,
            reviewed_at: p.reviewed_at,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApprovalResponse {
    /// `applied`, or `noop` when the prescription was already approved.
    pub outcome: String,
    pub order: OrderResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectPrescriptionRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ShipRequest {
    pub tracking_code: String,
    pub carrier: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShipResponse {
    pub order: OrderResponse,
    pub commission: CommissionResponse,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub(crate) fn parse_money(field: &str, raw: &str) -> Result<BigDecimal, DomainError> {
    BigDecimal::from_str(raw.trim())
        .map_err(|e| DomainError::InvalidInput(format!("invalid {} '{}': {}", field, raw, e)))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /orders
///
/// Checks out a cart for the calling client. Prices are taken from the
/// catalog; stock is only checked here and is committed at payment.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CheckoutRequestBody,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Malformed or invalid cart"),
        (status = 401, description = "Missing actor headers"),
        (status = 403, description = "Caller is not a client"),
        (status = 409, description = "Insufficient stock"),
    ),
    tag = "orders"
)]
pub async fn checkout(
    service: web::Data<Service>,
    caller: Caller,
    body: web::Json<CheckoutRequestBody>,
) -> Result<HttpResponse, AppError> {
    let req = CheckoutRequest::try_from(body.into_inner())?;
    let view = run(service, move |svc| svc.checkout(&caller.0, req)).await?;
    Ok(HttpResponse::Created().json(OrderResponse::from(view)))
}

/// GET /orders/{id}
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 403, description = "Order belongs to someone else"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let view = run(service, move |svc| svc.get_order(&caller.0, order_id)).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(view)))
}

/// POST /orders/{id}/prescriptions
#[utoipa::path(
    post,
    path = "/orders/{id}/prescriptions",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body = SubmitPrescriptionRequest,
    responses(
        (status = 201, description = "Prescription submitted for review", body = PrescriptionResponse),
        (status = 409, description = "Order is not awaiting a prescription"),
    ),
    tag = "orders"
)]
pub async fn submit_prescription(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<SubmitPrescriptionRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let body = body.into_inner();
    let upload = PrescriptionUpload {
        file_reference: body.file_reference,
        prescriber: PrescriberIdentity {
            name: body.prescriber_name,
            registration: body.prescriber_registration,
            jurisdiction: body.prescriber_jurisdiction,
        },
    };
    let prescription = run(service, move |svc| {
        svc.submit_prescription(&caller.0, order_id, upload)
    })
    .await?;
    Ok(HttpResponse::Created().json(PrescriptionResponse::from(prescription)))
}

/// POST /prescriptions/{id}/approve
#[utoipa::path(
    post,
    path = "/prescriptions/{id}/approve",
    params(("id" = Uuid, Path, description = "Prescription UUID")),
    responses(
        (status = 200, description = "Prescription and order approved", body = ApprovalResponse),
        (status = 403, description = "Caller is not an administrator"),
        (status = 409, description = "Prescription was rejected or superseded"),
    ),
    tag = "orders"
)]
pub async fn approve_prescription(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let prescription_id = path.into_inner();
    let outcome = run(service, move |svc| {
        svc.approve_prescription(&caller.0, prescription_id)
    })
    .await?;
    let (label, order) = match outcome {
        Outcome::Applied(order) => ("applied", order),
        Outcome::NoOp(order) => ("noop", order),
    };
    Ok(HttpResponse::Ok().json(ApprovalResponse {
        outcome: label.to_string(),
        order: order.into(),
    }))
}

/// POST /prescriptions/{id}/reject
#[utoipa::path(
    post,
    path = "/prescriptions/{id}/reject",
    params(("id" = Uuid, Path, description = "Prescription UUID")),
    request_body = RejectPrescriptionRequest,
    responses(
        (status = 200, description = "Prescription rejected; order awaits a new one", body = OrderResponse),
        (status = 400, description = "Missing reason"),
        (status = 403, description = "Caller is not an administrator"),
    ),
    tag = "orders"
)]
pub async fn reject_prescription(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<RejectPrescriptionRequest>,
) -> Result<HttpResponse, AppError> {
    let prescription_id = path.into_inner();
    let reason = body.into_inner().reason;
    let order = run(service, move |svc| {
        svc.reject_prescription(&caller.0, prescription_id, &reason)
    })
    .await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// POST /orders/{id}/approve
///
/// Approves an order whose prescription has already been approved.
#[utoipa::path(
    post,
    path = "/orders/{id}/approve",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order approved", body = OrderResponse),
        (status = 403, description = "Caller is not an administrator"),
        (status = 409, description = "Order is not awaiting approval or its prescription is not approved"),
    ),
    tag = "orders"
)]
pub async fn approve_order(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let order = run(service, move |svc| svc.approve_order(&caller.0, order_id)).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// POST /orders/{id}/request-payment
#[utoipa::path(
    post,
    path = "/orders/{id}/request-payment",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order awaits payment", body = OrderResponse),
        (status = 409, description = "Order is not approved"),
    ),
    tag = "orders"
)]
pub async fn request_payment(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let order = run(service, move |svc| svc.request_payment(&caller.0, order_id)).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// POST /orders/{id}/retry-payment
///
/// Re-runs the paid transition after a stock shortfall has been resolved.
#[utoipa::path(
    post,
    path = "/orders/{id}/retry-payment",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order is paid", body = OrderResponse),
        (status = 403, description = "Caller is not an administrator"),
        (status = 409, description = "Stock is still short"),
    ),
    tag = "orders"
)]
pub async fn retry_payment(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let order = run(service, move |svc| {
        svc.retry_payment_confirmation(&caller.0, order_id)
    })
    .await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// POST /orders/{id}/prepare
#[utoipa::path(
    post,
    path = "/orders/{id}/prepare",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order is being prepared", body = OrderResponse),
        (status = 409, description = "Order is not paid"),
    ),
    tag = "orders"
)]
pub async fn prepare(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let order = run(service, move |svc| svc.start_preparation(&caller.0, order_id)).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// POST /orders/{id}/ship
///
/// Marks the order shipped and creates its vendor commission in the same
/// transaction.
#[utoipa::path(
    post,
    path = "/orders/{id}/ship",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body = ShipRequest,
    responses(
        (status = 200, description = "Order shipped", body = ShipResponse),
        (status = 400, description = "Missing tracking code or carrier"),
        (status = 409, description = "Order is not being prepared"),
    ),
    tag = "orders"
)]
pub async fn ship(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<ShipRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let body = body.into_inner();
    let shipment = ShipmentDetails {
        tracking_code: body.tracking_code,
        carrier: body.carrier,
    };
    let (order, commission) = run(service, move |svc| svc.ship(&caller.0, order_id, shipment)).await?;
    Ok(HttpResponse::Ok().json(ShipResponse {
        order: order.into(),
        commission: commission.into(),
    }))
}

/// POST /orders/{id}/deliver
#[utoipa::path(
    post,
    path = "/orders/{id}/deliver",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order delivered", body = OrderResponse),
        (status = 409, description = "Order is not shipped"),
    ),
    tag = "orders"
)]
pub async fn deliver(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let order = run(service, move |svc| svc.deliver(&caller.0, order_id)).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// POST /orders/{id}/cancel
#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Order cancelled", body = OrderResponse),
        (status = 403, description = "Caller may not cancel at this stage"),
        (status = 409, description = "Order is already delivered or cancelled"),
    ),
    tag = "orders"
)]
pub async fn cancel(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: Option<web::Json<CancelRequest>>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let reason = body.map(|b| b.into_inner()).unwrap_or_default().reason;
    let order = run(service, move |svc| svc.cancel(&caller.0, order_id, reason)).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddressBody {
        ShippingAddressBody {
            recipient: "Ana Souza".to_string(),
            street: "Rua Augusta".to_string(),
            number: "1500".to_string(),
            complement: None,
            district: "Consolação".to_string(),
            city: "São Paulo".to_string(),
            state: "SP".to_string(),
            postal_code: "01304-001".to_string(),
            country: "BR".to_string(),
        }
    }

    #[test]
    fn checkout_body_parses_discount() {
        let body = CheckoutRequestBody {
            doctor_id: None,
            items: vec![CheckoutLineRequest {
                product_id: Uuid::new_v4(),
                quantity: 2,
            }],
            discount: Some("12.50".to_string()),
            payment_method: "pix".to_string(),
            shipping_address: address(),
        };
        let req = CheckoutRequest::try_from(body).unwrap();
        assert_eq!(req.discount, "12.50".parse::<BigDecimal>().unwrap());
        assert_eq!(req.lines.len(), 1);
    }

    #[test]
    fn malformed_discount_is_invalid_input() {
        let body = CheckoutRequestBody {
            doctor_id: None,
            items: vec![],
            discount: Some("ten".to_string()),
            payment_method: "pix".to_string(),
            shipping_address: address(),
        };
        assert!(matches!(
            CheckoutRequest::try_from(body),
            Err(DomainError::InvalidInput(_))
        ));
    }
}
