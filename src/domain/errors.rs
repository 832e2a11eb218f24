use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state transition for {entity}: {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Prescription for order {0} is not approved")]
    PrescriptionNotApproved(Uuid),

    #[error("Unauthorized action: {0}")]
    UnauthorizedAction(String),

    #[error("A commission already exists for order {0}")]
    DuplicateCommission(Uuid),

    #[error("Commission {commission_id} cannot be withdrawn (status: {status})")]
    InvalidCommissionState { commission_id: Uuid, status: String },

    #[error("Unknown payment transaction: {0}")]
    UnknownTransaction(String),

    #[error("Payment {external_id} cannot move from {from} to {to}")]
    PaymentStatusRegression {
        external_id: String,
        from: String,
        to: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn transition(entity: &'static str, from: impl ToString, to: impl ToString) -> Self {
        DomainError::InvalidStateTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
