use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

status_enum! {
    OrderStatus {
        Cart => "cart",
        AwaitingPrescription => "awaiting_prescription",
        AwaitingApproval => "awaiting_approval",
        Approved => "approved",
        AwaitingPayment => "awaiting_payment",
        Paid => "paid",
        PreparingShipment => "preparing_shipment",
        Shipped => "shipped",
        Delivered => "delivered",
        Cancelled => "cancelled",
    }
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Next state on the forward path, if any.
    pub fn successor(self) -> Option<OrderStatus> {
        use OrderStatus::*;
        match self {
            Cart => Some(AwaitingPrescription),
            AwaitingPrescription => Some(AwaitingApproval),
            AwaitingApproval => Some(Approved),
            Approved => Some(AwaitingPayment),
            AwaitingPayment => Some(Paid),
            Paid => Some(PreparingShipment),
            PreparingShipment => Some(Shipped),
            Shipped => Some(Delivered),
            Delivered | Cancelled => None,
        }
    }

    /// The full transition table. Besides the forward path this admits
    /// cancellation from any non-terminal state, the prescription-free
    /// `cart -> approved` edge and the rejection edge back to
    /// `awaiting_prescription`.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (_, OrderStatus::Cancelled) => true,
            (OrderStatus::Cart, OrderStatus::Approved) => true,
            (OrderStatus::AwaitingApproval, OrderStatus::AwaitingPrescription) => true,
            (from, to) => from.successor() == Some(to),
        }
    }

    /// States in which the order's items have been taken out of stock.
    pub fn has_committed_stock(self) -> bool {
        matches!(
            self,
            OrderStatus::Paid
                | OrderStatus::PreparingShipment
                | OrderStatus::Shipped
                | OrderStatus::Delivered
        )
    }

    /// Early states a client may still cancel from.
    pub fn is_client_cancellable(self) -> bool {
        matches!(
            self,
            OrderStatus::Cart
                | OrderStatus::AwaitingPrescription
                | OrderStatus::AwaitingApproval
                | OrderStatus::Approved
        )
    }

    /// States a vendor may still cancel from.
    pub fn is_vendor_cancellable(self) -> bool {
        self.is_client_cancellable() || self == OrderStatus::AwaitingPayment
    }
}

/// Copy of the delivery address taken at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
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

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub code: String,
    pub client_id: Uuid,
    pub vendor_id: Uuid,
    pub doctor_id: Option<Uuid>,
    /// Current prescription; earlier rejected ones stay on record.
    pub prescription_id: Option<Uuid>,
    pub status: OrderStatus,
    pub subtotal: BigDecimal,
    pub discount: BigDecimal,
    pub total: BigDecimal,
    pub payment_method: String,
    pub shipping_address: ShippingAddress,
    pub tracking_code: Option<String>,
    pub carrier: Option<String>,
    pub cancellation_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    /// Set when payment arrived but stock could not be committed.
    pub stock_shortfall: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Moves the order to `to` if the transition table allows it and returns
    /// the previous status.
    pub fn transition_to(
        &mut self,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<OrderStatus, DomainError> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::transition("order", self.status, to));
        }
        let from = self.status;
        self.status = to;
        self.updated_at = now;
        Ok(from)
    }

    pub fn human_code(id: Uuid, now: DateTime<Utc>) -> String {
        let suffix = id.simple().to_string()[..8].to_ascii_uppercase();
        format!("RX-{}-{}", now.format("%Y%m%d"), suffix)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    /// Price at checkout time; later catalog changes do not touch it.
    pub unit_price: BigDecimal,
    pub line_total: BigDecimal,
}

impl OrderItem {
    pub fn new(order_id: Uuid, product_id: Uuid, quantity: i32, unit_price: BigDecimal) -> Self {
        let line_total = &unit_price * BigDecimal::from(quantity);
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            quantity,
            unit_price,
            line_total,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub doctor_id: Option<Uuid>,
    pub lines: Vec<CheckoutLine>,
    pub discount: BigDecimal,
    pub payment_method: String,
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Clone)]
pub struct OrderView {
    pub order: Order,
    pub items: Vec<OrderItem>,
}
