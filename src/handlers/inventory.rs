use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{run, Caller, Service};
use crate::domain::inventory::StockMovement;
use crate::errors::AppError;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustStockRequest {
    /// New absolute stock quantity.
    pub quantity: i32,
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockMovementResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub order_id: Option<Uuid>,
    /// `commit`, `restore` or `adjust`.
    pub movement_type: String,
    pub delta: i32,
    pub quantity_after: i32,
    pub actor_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl From<StockMovement> for StockMovementResponse {
    fn from(m: StockMovement) -> Self {
        StockMovementResponse {
            id: m.id,
            product_id: m.product_id,
            order_id: m.order_id,
            movement_type: m.movement_type.as_str().to_string(),
            delta: m.delta,
            quantity_after: m.quantity_after,
            actor_id: m.actor_id,
            reason: m.reason,
            created_at: m.created_at,
        }
    }
}

/// POST /inventory/{product_id}/adjust
#[utoipa::path(
    post,
    path = "/inventory/{product_id}/adjust",
    params(("product_id" = Uuid, Path, description = "Product UUID")),
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Stock set; movement recorded", body = StockMovementResponse),
        (status = 400, description = "Negative quantity or missing reason"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "Product not found"),
    ),
    tag = "inventory"
)]
pub async fn adjust_stock(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<AdjustStockRequest>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let body = body.into_inner();
    let movement = run(service, move |svc| {
        svc.adjust_stock(&caller.0, product_id, body.quantity, &body.reason)
    })
    .await?;
    Ok(HttpResponse::Ok().json(StockMovementResponse::from(movement)))
}

/// GET /inventory/{product_id}/movements
#[utoipa::path(
    get,
    path = "/inventory/{product_id}/movements",
    params(("product_id" = Uuid, Path, description = "Product UUID")),
    responses(
        (status = 200, description = "Movement history, oldest first", body = Vec<StockMovementResponse>),
        (status = 403, description = "Product belongs to another vendor"),
        (status = 404, description = "Product not found"),
    ),
    tag = "inventory"
)]
pub async fn list_movements(
    service: web::Data<Service>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let movements = run(service, move |svc| svc.stock_movements(&caller.0, product_id)).await?;
    let body: Vec<StockMovementResponse> = movements.into_iter().map(StockMovementResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}
