use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

use crate::domain::errors::DomainError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Missing or invalid actor: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        let msg = e.to_string();
        match e {
            DomainError::NotFound(_) | DomainError::UnknownTransaction(_) => AppError::NotFound(msg),
            DomainError::InvalidInput(_) => AppError::BadRequest(msg),
            DomainError::UnauthorizedAction(_) => AppError::Forbidden(msg),
            DomainError::InvalidStateTransition { .. }
            | DomainError::InsufficientStock { .. }
            | DomainError::PrescriptionNotApproved(_)
            | DomainError::DuplicateCommission(_)
            | DomainError::InvalidCommissionState { .. }
            | DomainError::PaymentStatusRegression { .. }
            | DomainError::Conflict(_) => AppError::Conflict(msg),
            DomainError::Internal(detail) => AppError::Internal(detail),
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Internal(detail) => {
                log::error!("Request failed: {}", detail);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Internal server error"
                }))
            }
            other => HttpResponse::build(other.status_code()).json(serde_json::json!({
                "error": other.to_string()
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;
    use uuid::Uuid;

    fn status_of(e: DomainError) -> StatusCode {
        AppError::from(e).error_response().status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(status_of(DomainError::NotFound("order")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(DomainError::UnknownTransaction("tx-1".to_string())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn invalid_input_returns_400() {
        assert_eq!(
            status_of(DomainError::InvalidInput("bad value".to_string())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unauthorized_action_returns_403() {
        assert_eq!(
            status_of(DomainError::UnauthorizedAction("nope".to_string())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn business_rule_violations_return_409() {
        let order_id = Uuid::new_v4();
        for e in [
            DomainError::transition("order", "paid", "approved"),
            DomainError::InsufficientStock {
                product_id: Uuid::new_v4(),
                requested: 3,
                available: 1,
            },
            DomainError::PrescriptionNotApproved(order_id),
            DomainError::DuplicateCommission(order_id),
            DomainError::PaymentStatusRegression {
                external_id: "tx-1".to_string(),
                from: "paid".to_string(),
                to: "rejected".to_string(),
            },
        ] {
            assert_eq!(status_of(e), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn internal_error_hides_detail() {
        let resp = AppError::Internal("connection refused".to_string()).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_actor_returns_401() {
        let err = AppError::Unauthorized("X-Actor-Id header is required".to_string());
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Missing or invalid actor: X-Actor-Id header is required");
    }

    #[test]
    fn not_found_display_names_the_entity() {
        let app_err: AppError = DomainError::NotFound("order").into();
        assert_eq!(app_err.to_string(), "order not found");
    }
}
