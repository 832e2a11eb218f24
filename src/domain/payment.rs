use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

status_enum! {
    PaymentStatus {
        Pending => "pending",
        Authorized => "authorized",
        Paid => "paid",
        Rejected => "rejected",
        RefundPending => "refund_pending",
    }
}

status_enum! {
    /// Payment providers whose notifications are understood.
    Gateway {
        MercadoPago => "mercadopago",
        PagSeguro => "pagseguro",
        Stripe => "stripe",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub gateway: Gateway,
    pub method: String,
    pub amount: BigDecimal,
    pub status: PaymentStatus,
    pub external_transaction_id: String,
    pub raw_payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A charge already created at the gateway, registered against an order.
#[derive(Debug, Clone)]
pub struct PaymentAttempt {
    pub gateway: Gateway,
    pub method: String,
    pub external_transaction_id: String,
    pub raw_payload: Value,
}

/// Inbound gateway notification.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub gateway: Gateway,
    pub external_transaction_id: String,
    pub gateway_status: String,
    pub raw_payload: Value,
}
