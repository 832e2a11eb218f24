use serde_json::{json, Value};
use uuid::Uuid;

use super::order::OrderStatus;

/// Event handed to external collaborators (notifications, refunds) through
/// the outbox table, written in the same transaction as the change.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    pub aggregate_type: &'static str,
    pub aggregate_id: Uuid,
    pub event_type: &'static str,
    pub payload: Value,
}

impl OutboxEvent {
    pub fn order_status_changed(order_id: Uuid, from: OrderStatus, to: OrderStatus, actor: Uuid) -> Self {
        Self {
            aggregate_type: "Order",
            aggregate_id: order_id,
            event_type: "OrderStatusChanged",
            payload: json!({
                "order_id": order_id,
                "from": from.as_str(),
                "to": to.as_str(),
                "actor_id": actor,
            }),
        }
    }

    pub fn new(aggregate_type: &'static str, aggregate_id: Uuid, event_type: &'static str, payload: Value) -> Self {
        Self {
            aggregate_type,
            aggregate_id,
            event_type,
            payload,
        }
    }
}
