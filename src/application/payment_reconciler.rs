use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::context::RequestContext;
use crate::domain::errors::DomainError;
use crate::domain::order::Order;
use crate::domain::payment::{Gateway, GatewayEvent, Payment, PaymentAttempt, PaymentStatus};
use crate::domain::ports::PaymentStore;

/// Maps a gateway's own status vocabulary onto [`PaymentStatus`]. Unknown
/// values are treated as `pending`, never as `paid`.
pub fn normalize_status(gateway: Gateway, raw: &str) -> PaymentStatus {
    let raw = raw.trim().to_ascii_lowercase();
    let mapped = match gateway {
        Gateway::MercadoPago => match raw.as_str() {
            "approved" => Some(PaymentStatus::Paid),
            "authorized" => Some(PaymentStatus::Authorized),
            "pending" | "in_process" | "in_mediation" => Some(PaymentStatus::Pending),
            "rejected" | "cancelled" | "refunded" | "charged_back" => Some(PaymentStatus::Rejected),
            _ => None,
        },
        Gateway::PagSeguro => match raw.as_str() {
            "paid" | "available" => Some(PaymentStatus::Paid),
            "authorized" => Some(PaymentStatus::Authorized),
            "waiting" | "in_analysis" => Some(PaymentStatus::Pending),
            "declined" | "canceled" | "refunded" | "in_dispute" => Some(PaymentStatus::Rejected),
            _ => None,
        },
        Gateway::Stripe => match raw.as_str() {
            "succeeded" => Some(PaymentStatus::Paid),
            "requires_capture" => Some(PaymentStatus::Authorized),
            "processing" | "requires_payment_method" | "requires_confirmation" | "requires_action" => {
                Some(PaymentStatus::Pending)
            }
            "canceled" => Some(PaymentStatus::Rejected),
            _ => None,
        },
    };
    mapped.unwrap_or_else(|| {
        log::warn!("Unknown {} status '{}', treating as pending", gateway, raw);
        PaymentStatus::Pending
    })
}

/// What applying an event to the stored payment amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Same status as stored; nothing is written.
    Unchanged(Payment),
    /// Late redelivery of a status the payment already moved past.
    Stale { payment: Payment, incoming: PaymentStatus },
    /// The stored payment should move to `to`.
    Advance { payment: Payment, to: PaymentStatus },
}

#[derive(Debug, Clone, Default)]
pub struct PaymentReconciler;

impl PaymentReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Stores a charge already created at the gateway as a `pending` payment
    /// for the order's total.
    pub fn register<S: PaymentStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        order: &Order,
        attempt: PaymentAttempt,
    ) -> Result<Payment, DomainError> {
        if attempt.external_transaction_id.trim().is_empty() {
            return Err(DomainError::InvalidInput("external transaction id is required".to_string()));
        }
        if attempt.method.trim().is_empty() {
            return Err(DomainError::InvalidInput("payment method is required".to_string()));
        }
        let payment = Payment {
            id: Uuid::new_v4(),
            order_id: order.id,
            gateway: attempt.gateway,
            method: attempt.method,
            amount: order.total.clone(),
            status: PaymentStatus::Pending,
            external_transaction_id: attempt.external_transaction_id.trim().to_string(),
            raw_payload: attempt.raw_payload,
            created_at: ctx.now,
            updated_at: ctx.now,
        };
        tx.insert_payment(&payment)?;
        Ok(payment)
    }

    /// Resolves an inbound event against the stored payment (row-locked)
    /// without writing anything.
    pub fn evaluate<S: PaymentStore + ?Sized>(
        &self,
        tx: &mut S,
        event: &GatewayEvent,
    ) -> Result<Reconciliation, DomainError> {
        let payment = tx
            .lock_payment_by_external_id(&event.external_transaction_id)?
            .ok_or_else(|| DomainError::UnknownTransaction(event.external_transaction_id.clone()))?;
        if payment.gateway != event.gateway {
            return Err(DomainError::InvalidInput(format!(
                "transaction {} belongs to {}, not {}",
                payment.external_transaction_id, payment.gateway, event.gateway
            )));
        }
        let incoming = normalize_status(event.gateway, &event.gateway_status);
        match progression(payment.status, incoming) {
            Progression::Same => Ok(Reconciliation::Unchanged(payment)),
            Progression::Stale => Ok(Reconciliation::Stale { payment, incoming }),
            Progression::Advance => Ok(Reconciliation::Advance { payment, to: incoming }),
            Progression::Regression => {
                log::warn!(
                    "Anomaly: gateway {} tried to move payment {} from {} to {}",
                    event.gateway,
                    payment.external_transaction_id,
                    payment.status,
                    incoming
                );
                Err(DomainError::PaymentStatusRegression {
                    external_id: payment.external_transaction_id,
                    from: payment.status.to_string(),
                    to: incoming.to_string(),
                })
            }
        }
    }

    pub fn record<S: PaymentStore + ?Sized>(
        &self,
        tx: &mut S,
        mut payment: Payment,
        status: PaymentStatus,
        raw_payload: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<Payment, DomainError> {
        payment.status = status;
        if let Some(raw) = raw_payload {
            payment.raw_payload = raw;
        }
        payment.updated_at = now;
        tx.update_payment(&payment)?;
        Ok(payment)
    }

    /// Flags the order's paid payment for refund, if there is one.
    pub fn request_refund<S: PaymentStore + ?Sized>(
        &self,
        tx: &mut S,
        order_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Payment>, DomainError> {
        match tx.find_order_payment_with_status(order_id, PaymentStatus::Paid)? {
            Some(paid) => Ok(Some(self.record(tx, paid, PaymentStatus::RefundPending, None, now)?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progression {
    Same,
    Stale,
    Advance,
    Regression,
}

fn progression(stored: PaymentStatus, incoming: PaymentStatus) -> Progression {
    use PaymentStatus::*;
    if stored == incoming {
        return Progression::Same;
    }
    match (stored, incoming) {
        (Paid, _) => Progression::Regression,
        (RefundPending, Paid) => Progression::Stale,
        // The refund settled at the gateway.
        (RefundPending, Rejected) => Progression::Advance,
        (RefundPending, _) => Progression::Regression,
        (Authorized, Pending) | (Rejected, Pending) => Progression::Stale,
        _ => Progression::Advance,
    }
}
