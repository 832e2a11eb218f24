use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

status_enum! {
    MovementType {
        Commit => "commit",
        Restore => "restore",
        Adjust => "adjust",
    }
}

/// The slice of a catalog product the fulfillment core needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub requires_prescription: bool,
    pub stock_quantity: i32,
}

/// Immutable audit row appended for every stock mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub order_id: Option<Uuid>,
    pub movement_type: MovementType,
    pub delta: i32,
    pub quantity_after: i32,
    pub actor_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
