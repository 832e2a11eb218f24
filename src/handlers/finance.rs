use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{run, Caller, Service};
use crate::application::commission_engine::MAX_MATURITY_DAYS;
use crate::domain::commission::{Commission, ReleaseReport};
use crate::domain::withdrawal::{CommissionSelection, Withdrawal, WithdrawalDecision, WithdrawalItem};
use crate::errors::AppError;

// ── Commissions ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct CommissionResponse {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub order_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub amount: String,
    pub percentage: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Commission> for CommissionResponse {
    fn from(c: Commission) -> Self {
        CommissionResponse {
            id: c.id,
            vendor_id: c.vendor_id,
            order_id: c.order_id,
            doctor_id: c.doctor_id,
            amount: c.amount.to_string(),
            percentage: c.percentage.to_string(),
            status: c.status.as_str().to_string(),
            created_at: c.created_at,
            available_at: c.available_at,
            paid_at: c.paid_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReleaseRequest {
    /// Overrides the configured holding period for this run.
    #[serde(default)]
    pub maturity_days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReleaseResponse {
    pub released: usize,
    pub voided: usize,
}

impl From<ReleaseReport> for ReleaseResponse {
    fn from(r: ReleaseReport) -> Self {
        ReleaseResponse {
            released: r.released,
            voided: r.voided,
        }
    }
}

/// POST /commissions/release
///
/// Runs the maturation sweep now.
#[utoipa::path(
    post,
    path = "/commissions/release",
    request_body = ReleaseRequest,
    responses(
        (status = 200, description = "Sweep finished", body = ReleaseResponse),
        (status = 400, description = "maturity_days is negative or too large"),
        (status = 403, description = "Caller is not an administrator"),
    ),
    tag = "finance"
)]
pub async fn release_commissions(
    service: web::Data<Service>,
    caller: Caller,
    body: Option<web::Json<ReleaseRequest>>,
) -> Result<HttpResponse, AppError> {
    let maturity_days = body.map(|b| b.into_inner()).unwrap_or_default().maturity_days;
    if maturity_days.is_some_and(|d| !(0..=MAX_MATURITY_DAYS).contains(&d)) {
        return Err(AppError::BadRequest(format!(
            "maturity_days must be between 0 and {}",
            MAX_MATURITY_DAYS
        )));
    }
    let report = run(service, move |svc| {
        svc.release_matured_commissions(&caller.0, maturity_days)
    })
    .await?;
    Ok(HttpResponse::Ok().json(ReleaseResponse::from(report)))
}

/// GET /orders/{id}/commission
#[utoipa::path(
    get,
    path = "/orders/{id}/commission",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Commission of the order", body = CommissionResponse),
        (status = 403, description = "Order belongs to another vendor"),
        (status = 404, description = "Order not found or not shipped yet"),
    ),
    tag = "finance"
)]
pub async fn order_commission(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let commission = run(service, move |svc| svc.commission_for_order(&caller.0, order_id)).await?;
    match commission {
        Some(c) => Ok(HttpResponse::Ok().json(CommissionResponse::from(c))),
        None => Err(AppError::NotFound("commission not found".to_string())),
    }
}

// ── Withdrawals ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct WithdrawalRequestBody {
    /// Commissions to withdraw; omit to take every available one.
    #[serde(default)]
    pub commission_ids: Option<Vec<Uuid>>,
    #[schema(value_type = Object)]
    pub bank_details: Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawalItemResponse {
    pub commission_id: Uuid,
    pub amount: String,
}

impl From<WithdrawalItem> for WithdrawalItemResponse {
    fn from(i: WithdrawalItem) -> Self {
        WithdrawalItemResponse {
            commission_id: i.commission_id,
            amount: i.amount.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawalResponse {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub gross_amount: String,
    pub fee: String,
    pub net_amount: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<WithdrawalItemResponse>>,
}

impl From<Withdrawal> for WithdrawalResponse {
    fn from(w: Withdrawal) -> Self {
        WithdrawalResponse {
            id: w.id,
            vendor_id: w.vendor_id,
            gross_amount: w.gross_amount.to_string(),
            fee: w.fee.to_string(),
            net_amount: w.net_amount.to_string(),
            status: w.status.as_str().to_string(),
            rejection_reason: w.rejection_reason,
            requested_at: w.requested_at,
            processed_at: w.processed_at,
            processed_by: w.processed_by,
            items: None,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessWithdrawalRequest {
    /// `processed` or `rejected`.
    pub decision: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl TryFrom<ProcessWithdrawalRequest> for WithdrawalDecision {
    type Error = AppError;

    fn try_from(body: ProcessWithdrawalRequest) -> Result<Self, Self::Error> {
        match body.decision.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(WithdrawalDecision::Processed),
            "rejected" => Ok(WithdrawalDecision::Rejected {
                reason: body.reason.unwrap_or_default(),
            }),
            other => Err(AppError::BadRequest(format!(
                "decision must be 'processed' or 'rejected', got '{}'",
                other
            ))),
        }
    }
}

/// POST /withdrawals
///
/// Bundles the calling vendor's available commissions into one payout
/// request with a single fee.
#[utoipa::path(
    post,
    path = "/withdrawals",
    request_body = WithdrawalRequestBody,
    responses(
        (status = 201, description = "Withdrawal requested", body = WithdrawalResponse),
        (status = 400, description = "Nothing to withdraw or net amount not positive"),
        (status = 403, description = "Caller is not a vendor"),
        (status = 409, description = "A selected commission is not available"),
    ),
    tag = "finance"
)]
pub async fn request_withdrawal(
    service: web::Data<Service>,
    caller: Caller,
    body: web::Json<WithdrawalRequestBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let selection = match body.commission_ids {
        Some(ids) => CommissionSelection::Ids(ids),
        None => CommissionSelection::AllAvailable,
    };
    let bank_details = body.bank_details;
    let (withdrawal, items) = run(service, move |svc| {
        svc.request_withdrawal(&caller.0, selection, bank_details)
    })
    .await?;
    let mut response = WithdrawalResponse::from(withdrawal);
    response.items = Some(items.into_iter().map(WithdrawalItemResponse::from).collect());
    Ok(HttpResponse::Created().json(response))
}

/// POST /withdrawals/{id}/process
#[utoipa::path(
    post,
    path = "/withdrawals/{id}/process",
    params(("id" = Uuid, Path, description = "Withdrawal UUID")),
    request_body = ProcessWithdrawalRequest,
    responses(
        (status = 200, description = "Withdrawal processed or rejected", body = WithdrawalResponse),
        (status = 400, description = "Unknown decision or missing rejection reason"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 409, description = "Withdrawal already decided"),
    ),
    tag = "finance"
)]
pub async fn process_withdrawal(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<ProcessWithdrawalRequest>,
) -> Result<HttpResponse, AppError> {
    let withdrawal_id = path.into_inner();
    let decision = WithdrawalDecision::try_from(body.into_inner())?;
    let withdrawal = run(service, move |svc| {
        svc.process_withdrawal(&caller.0, withdrawal_id, decision)
    })
    .await?;
    Ok(HttpResponse::Ok().json(WithdrawalResponse::from(withdrawal)))
}
