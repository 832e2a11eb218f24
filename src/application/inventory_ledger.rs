use uuid::Uuid;

use crate::domain::context::RequestContext;
use crate::domain::errors::DomainError;
use crate::domain::inventory::{MovementType, Product, StockMovement};
use crate::domain::order::OrderItem;
use crate::domain::ports::InventoryStore;

/// Per-product stock with an append-only movement history. Quantities never
/// go below zero: every decrement is a conditional update evaluated at
/// write time.
#[derive(Debug, Clone, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Non-mutating availability check.
    pub fn check_available<S: InventoryStore + ?Sized>(
        &self,
        tx: &mut S,
        product_id: Uuid,
        qty: i32,
    ) -> Result<bool, DomainError> {
        ensure_positive(qty)?;
        let product = load(tx, product_id)?;
        Ok(product.stock_quantity >= qty)
    }

    /// Decrements stock by `qty`, re-validating availability in the same
    /// statement that writes.
    pub fn commit<S: InventoryStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        product_id: Uuid,
        qty: i32,
        order_id: Option<Uuid>,
        reason: &str,
    ) -> Result<StockMovement, DomainError> {
        ensure_positive(qty)?;
        match tx.decrement_stock(product_id, qty)? {
            Some(quantity_after) => {
                let movement = movement(ctx, product_id, order_id, MovementType::Commit, -qty, quantity_after, reason);
                tx.insert_movement(&movement)?;
                Ok(movement)
            }
            None => {
                let available = load(tx, product_id)?.stock_quantity;
                Err(DomainError::InsufficientStock {
                    product_id,
                    requested: qty,
                    available,
                })
            }
        }
    }

    pub fn restore<S: InventoryStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        product_id: Uuid,
        qty: i32,
        order_id: Option<Uuid>,
        reason: &str,
    ) -> Result<StockMovement, DomainError> {
        ensure_positive(qty)?;
        let quantity_after = tx.increment_stock(product_id, qty)?;
        let movement = movement(ctx, product_id, order_id, MovementType::Restore, qty, quantity_after, reason);
        tx.insert_movement(&movement)?;
        Ok(movement)
    }

    /// Manual correction to an absolute quantity.
    pub fn adjust<S: InventoryStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        product_id: Uuid,
        new_qty: i32,
        reason: &str,
    ) -> Result<StockMovement, DomainError> {
        ctx.require_admin("stock adjustment")?;
        if new_qty < 0 {
            return Err(DomainError::InvalidInput("stock quantity cannot be negative".to_string()));
        }
        if reason.trim().is_empty() {
            return Err(DomainError::InvalidInput("a stock adjustment needs a reason".to_string()));
        }
        let product = tx
            .lock_product(product_id)?
            .ok_or(DomainError::NotFound("product"))?;
        tx.set_stock(product_id, new_qty)?;
        let delta = new_qty - product.stock_quantity;
        let movement = movement(ctx, product_id, None, MovementType::Adjust, delta, new_qty, reason);
        tx.insert_movement(&movement)?;
        log::info!(
            "Stock of product {} adjusted from {} to {} by {}: {}",
            product_id,
            product.stock_quantity,
            new_qty,
            ctx.actor.id,
            reason
        );
        Ok(movement)
    }

    /// Locks every product of the order (in id order) and verifies the whole
    /// order can be committed, without writing anything.
    pub fn ensure_committable<S: InventoryStore + ?Sized>(
        &self,
        tx: &mut S,
        items: &[OrderItem],
    ) -> Result<(), DomainError> {
        let mut sorted: Vec<&OrderItem> = items.iter().collect();
        sorted.sort_by_key(|i| i.product_id);
        for item in sorted {
            let product = tx
                .lock_product(item.product_id)?
                .ok_or(DomainError::NotFound("product"))?;
            if product.stock_quantity < item.quantity {
                return Err(DomainError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: product.stock_quantity,
                });
            }
        }
        Ok(())
    }

    pub fn commit_order<S: InventoryStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        order_id: Uuid,
        items: &[OrderItem],
    ) -> Result<Vec<StockMovement>, DomainError> {
        let reason = format!("order {} paid", order_id);
        items
            .iter()
            .map(|i| self.commit(tx, ctx, i.product_id, i.quantity, Some(order_id), &reason))
            .collect()
    }

    /// Puts back exactly what the order's commit movements took out.
    pub fn restore_order<S: InventoryStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> Result<Vec<StockMovement>, DomainError> {
        let committed: Vec<StockMovement> = tx
            .order_movements(order_id)?
            .into_iter()
            .filter(|m| m.movement_type == MovementType::Commit)
            .collect();
        let reason = format!("order {} cancelled", order_id);
        committed
            .iter()
            .map(|m| self.restore(tx, ctx, m.product_id, -m.delta, Some(order_id), &reason))
            .collect()
    }
}

fn ensure_positive(qty: i32) -> Result<(), DomainError> {
    if qty <= 0 {
        return Err(DomainError::InvalidInput(format!("quantity must be positive, got {}", qty)));
    }
    Ok(())
}

fn load<S: InventoryStore + ?Sized>(tx: &mut S, product_id: Uuid) -> Result<Product, DomainError> {
    tx.find_product(product_id)?.ok_or(DomainError::NotFound("product"))
}

fn movement(
    ctx: &RequestContext,
    product_id: Uuid,
    order_id: Option<Uuid>,
    movement_type: MovementType,
    delta: i32,
    quantity_after: i32,
    reason: &str,
) -> StockMovement {
    StockMovement {
        id: Uuid::new_v4(),
        product_id,
        order_id,
        movement_type,
        delta,
        quantity_after,
        actor_id: ctx.actor.id,
        reason: reason.to_string(),
        created_at: ctx.now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::{Actor, Role};
    use crate::infrastructure::memory::MemoryState;
    use bigdecimal::BigDecimal;

    fn setup(stock: i32) -> (MemoryState, Uuid) {
        let id = Uuid::new_v4();
        let mut state = MemoryState::default();
        state.add_product(Product {
            id,
            vendor_id: Uuid::new_v4(),
            name: "Full spectrum oil".to_string(),
            price: BigDecimal::from(180),
            requires_prescription: true,
            stock_quantity: stock,
        });
        (state, id)
    }

    fn admin() -> RequestContext {
        RequestContext::new(Actor::new(Uuid::new_v4(), Role::Admin))
    }

    #[test]
    fn check_available_does_not_mutate() {
        let (mut state, id) = setup(2);
        let ledger = InventoryLedger::new();

        assert!(ledger.check_available(&mut state, id, 2).unwrap());
        assert!(!ledger.check_available(&mut state, id, 3).unwrap());
        assert_eq!(state.product(id).unwrap().stock_quantity, 2);
        assert!(state.movements().is_empty());
    }

    #[test]
    fn commit_decrements_and_records_movement() {
        let (mut state, id) = setup(5);
        let ledger = InventoryLedger::new();

        let m = ledger.commit(&mut state, &admin(), id, 3, None, "test").unwrap();

        assert_eq!(m.delta, -3);
        assert_eq!(m.quantity_after, 2);
        assert_eq!(state.product(id).unwrap().stock_quantity, 2);
        assert_eq!(state.movements().len(), 1);
    }

    #[test]
    fn commit_beyond_stock_fails_and_leaves_stock_untouched() {
        let (mut state, id) = setup(1);
        let ledger = InventoryLedger::new();

        let err = ledger.commit(&mut state, &admin(), id, 2, None, "test").unwrap_err();

        assert!(matches!(
            err,
            DomainError::InsufficientStock { requested: 2, available: 1, .. }
        ));
        assert_eq!(state.product(id).unwrap().stock_quantity, 1);
        assert!(state.movements().is_empty());
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let (mut state, id) = setup(1);
        let ledger = InventoryLedger::new();
        assert!(matches!(
            ledger.commit(&mut state, &admin(), id, 0, None, "test"),
            Err(DomainError::InvalidInput(_))
        ));
        assert!(matches!(
            ledger.restore(&mut state, &admin(), id, -1, None, "test"),
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[test]
    fn adjust_logs_delta_and_requires_admin() {
        let (mut state, id) = setup(4);
        let ledger = InventoryLedger::new();

        let m = ledger.adjust(&mut state, &admin(), id, 10, "recount").unwrap();
        assert_eq!(m.delta, 6);
        assert_eq!(m.movement_type, MovementType::Adjust);

        let vendor = RequestContext::new(Actor::new(Uuid::new_v4(), Role::Vendor));
        assert!(matches!(
            ledger.adjust(&mut state, &vendor, id, 1, "recount"),
            Err(DomainError::UnauthorizedAction(_))
        ));
        assert!(matches!(
            ledger.adjust(&mut state, &admin(), id, -1, "recount"),
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[test]
    fn restore_order_reverses_commit_movements() {
        let (mut state, id) = setup(5);
        let ledger = InventoryLedger::new();
        let order_id = Uuid::new_v4();
        let item = OrderItem::new(order_id, id, 2, BigDecimal::from(180));

        ledger.commit_order(&mut state, &admin(), order_id, &[item]).unwrap();
        assert_eq!(state.product(id).unwrap().stock_quantity, 3);

        ledger.restore_order(&mut state, &admin(), order_id).unwrap();
        assert_eq!(state.product(id).unwrap().stock_quantity, 5);
        assert_eq!(state.movements().len(), 2);
    }
}
