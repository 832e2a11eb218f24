pub mod finance;
pub mod inventory;
pub mod orders;
pub mod payments;

use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::application::OrderLifecycle;
use crate::domain::context::{Actor, RequestContext, Role};
use crate::domain::errors::DomainError;
use crate::errors::AppError;
use crate::infrastructure::Storage;

pub type Service = OrderLifecycle<Storage>;

pub const ACTOR_ID_HEADER: &str = "X-Actor-Id";
pub const ACTOR_ROLE_HEADER: &str = "X-Actor-Role";

/// Caller identity taken from the `X-Actor-Id` / `X-Actor-Role` headers.
/// Session handling happens upstream; this only trusts what it is given.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub RequestContext);

impl FromRequest for Caller {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(caller_from_headers(req).map(|actor| Caller(RequestContext::new(actor))))
    }
}

fn caller_from_headers(req: &HttpRequest) -> Result<Actor, AppError> {
    let header = |name: &str| -> Result<String, AppError> {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::Unauthorized(format!("{} header is required", name)))
    };
    let id = Uuid::parse_str(header(ACTOR_ID_HEADER)?.trim())
        .map_err(|_| AppError::Unauthorized(format!("{} must be a UUID", ACTOR_ID_HEADER)))?;
    let role: Role = header(ACTOR_ROLE_HEADER)?
        .parse()
        .map_err(|e: DomainError| AppError::Unauthorized(e.to_string()))?;
    if role == Role::System {
        return Err(AppError::Unauthorized("the system role cannot be asserted over HTTP".to_string()));
    }
    Ok(Actor::new(id, role))
}

/// Runs a blocking lifecycle call on the actix blocking pool.
pub async fn run<T, F>(service: web::Data<Service>, f: F) -> Result<T, AppError>
where
    F: FnOnce(&Service) -> Result<T, DomainError> + Send + 'static,
    T: Send + 'static,
{
    web::block(move || f(&service))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(AppError::from)
}

/// JSON extractor failures answer with the same error body as everything else.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        orders::checkout,
        orders::get_order,
        orders::submit_prescription,
        orders::approve_prescription,
        orders::reject_prescription,
        orders::approve_order,
        orders::request_payment,
        orders::retry_payment,
        orders::prepare,
        orders::ship,
        orders::deliver,
        orders::cancel,
        payments::register_payment,
        payments::list_payments,
        payments::gateway_webhook,
        inventory::adjust_stock,
        inventory::list_movements,
        finance::release_commissions,
        finance::order_commission,
        finance::request_withdrawal,
        finance::process_withdrawal,
    ),
    tags(
        (name = "orders", description = "Order lifecycle"),
        (name = "payments", description = "Payment registration and gateway reconciliation"),
        (name = "inventory", description = "Stock ledger"),
        (name = "finance", description = "Commissions and withdrawals"),
    )
)]
pub struct ApiDoc;
