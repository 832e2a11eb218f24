use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::commission::{Commission, CommissionStatus, DoctorProfile, VendorProfile};
use crate::domain::errors::DomainError;
use crate::domain::inventory::{Product, StockMovement};
use crate::domain::order::{Order, OrderItem};
use crate::domain::outbox::OutboxEvent;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{
    CommissionStore, InventoryStore, OrderStore, OutboxStore, PartyStore, PaymentStore,
    PrescriptionStore, Store, UnitOfWork, WithdrawalStore,
};
use crate::domain::prescription::Prescription;
use crate::domain::withdrawal::{Withdrawal, WithdrawalItem};
use crate::schema::{
    commissions, doctors, marketplace_outbox, order_items, orders, payments, prescriptions, products,
    stock_movements, vendors, withdrawal_items, withdrawals,
};

use super::models::{
    CommissionRow, DoctorRow, NewOrderItemRow, NewOutboxEventRow, OrderItemRow, OrderRow, PaymentRow,
    PrescriptionRow, ProductRow, StockMovementRow, VendorRow, WithdrawalItemRow, WithdrawalRow,
};

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<DieselError> for DomainError {
    fn from(e: DieselError) -> Self {
        DomainError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

/// True when the statement failed on the named unique constraint.
fn violates(e: &DieselError, constraint: &str) -> bool {
    matches!(
        e,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)
            if info.constraint_name() == Some(constraint)
    )
}

// ── Unit of work ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DieselUnitOfWork {
    pool: DbPool,
}

impl DieselUnitOfWork {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl UnitOfWork for DieselUnitOfWork {
    fn transaction<T, F>(&self, f: F) -> Result<T, DomainError>
    where
        F: FnOnce(&mut dyn Store) -> Result<T, DomainError>,
    {
        let mut pooled = self.pool.get()?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<_, DomainError, _>(|conn| f(&mut PgStore { conn }))
    }
}

/// Store bound to one open Postgres transaction.
pub struct PgStore<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }
}

impl OrderStore for PgStore<'_> {
    fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> Result<(), DomainError> {
        let row = OrderRow::try_from(order)?;
        diesel::insert_into(orders::table)
            .values(&row)
            .execute(self.conn)
            .map_err(|e| {
                if violates(&e, "orders_pkey") || violates(&e, "orders_code_key") {
                    DomainError::Conflict(format!("order {} already exists", order.id))
                } else {
                    e.into()
                }
            })?;

        let new_items: Vec<NewOrderItemRow> = items.iter().map(NewOrderItemRow::from).collect();
        diesel::insert_into(order_items::table)
            .values(&new_items)
            .execute(self.conn)?;
        Ok(())
    }

    fn find_order(&mut self, id: Uuid) -> Result<Option<Order>, DomainError> {
        orders::table
            .find(id)
            .select(OrderRow::as_select())
            .first(self.conn)
            .optional()?
            .map(Order::try_from)
            .transpose()
    }

    fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>, DomainError> {
        orders::table
            .find(id)
            .select(OrderRow::as_select())
            .for_update()
            .first(self.conn)
            .optional()?
            .map(Order::try_from)
            .transpose()
    }

    fn update_order(&mut self, order: &Order) -> Result<(), DomainError> {
        let row = OrderRow::try_from(order)?;
        let updated = diesel::update(orders::table.find(order.id))
            .set(&row)
            .execute(self.conn)?;
        if updated == 0 {
            return Err(DomainError::NotFound("order"));
        }
        Ok(())
    }

    fn order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>, DomainError> {
        let rows = order_items::table
            .filter(order_items::order_id.eq(order_id))
            .order(order_items::created_at.asc())
            .select(OrderItemRow::as_select())
            .load(self.conn)?;
        Ok(rows.into_iter().map(OrderItem::from).collect())
    }
}

impl InventoryStore for PgStore<'_> {
    fn find_product(&mut self, id: Uuid) -> Result<Option<Product>, DomainError> {
        let row = products::table
            .find(id)
            .select(ProductRow::as_select())
            .first(self.conn)
            .optional()?;
        Ok(row.map(Product::from))
    }

    fn lock_product(&mut self, id: Uuid) -> Result<Option<Product>, DomainError> {
        let row = products::table
            .find(id)
            .select(ProductRow::as_select())
            .for_update()
            .first(self.conn)
            .optional()?;
        Ok(row.map(Product::from))
    }

    fn decrement_stock(&mut self, id: Uuid, qty: i32) -> Result<Option<i32>, DomainError> {
        let remaining = diesel::update(
            products::table
                .filter(products::id.eq(id))
                .filter(products::stock_quantity.ge(qty)),
        )
        .set(products::stock_quantity.eq(products::stock_quantity - qty))
        .returning(products::stock_quantity)
        .get_result::<i32>(self.conn)
        .optional()?;
        Ok(remaining)
    }

    fn increment_stock(&mut self, id: Uuid, qty: i32) -> Result<i32, DomainError> {
        diesel::update(products::table.find(id))
            .set(products::stock_quantity.eq(products::stock_quantity + qty))
            .returning(products::stock_quantity)
            .get_result::<i32>(self.conn)
            .optional()?
            .ok_or(DomainError::NotFound("product"))
    }

    fn set_stock(&mut self, id: Uuid, qty: i32) -> Result<(), DomainError> {
        let updated = diesel::update(products::table.find(id))
            .set(products::stock_quantity.eq(qty))
            .execute(self.conn)?;
        if updated == 0 {
            return Err(DomainError::NotFound("product"));
        }
        Ok(())
    }

    fn insert_movement(&mut self, movement: &StockMovement) -> Result<(), DomainError> {
        diesel::insert_into(stock_movements::table)
            .values(&StockMovementRow::from(movement))
            .execute(self.conn)?;
        Ok(())
    }

    fn product_movements(&mut self, product_id: Uuid) -> Result<Vec<StockMovement>, DomainError> {
        stock_movements::table
            .filter(stock_movements::product_id.eq(product_id))
            .order(stock_movements::created_at.asc())
            .select(StockMovementRow::as_select())
            .load(self.conn)?
            .into_iter()
            .map(StockMovement::try_from)
            .collect()
    }

    fn order_movements(&mut self, order_id: Uuid) -> Result<Vec<StockMovement>, DomainError> {
        stock_movements::table
            .filter(stock_movements::order_id.eq(order_id))
            .order(stock_movements::created_at.asc())
            .select(StockMovementRow::as_select())
            .load(self.conn)?
            .into_iter()
            .map(StockMovement::try_from)
            .collect()
    }
}

impl PartyStore for PgStore<'_> {
    fn find_vendor(&mut self, vendor_id: Uuid) -> Result<Option<VendorProfile>, DomainError> {
        let row = vendors::table
            .find(vendor_id)
            .select(VendorRow::as_select())
            .first(self.conn)
            .optional()?;
        Ok(row.map(VendorProfile::from))
    }

    fn find_doctor(&mut self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, DomainError> {
        let row = doctors::table
            .find(doctor_id)
            .select(DoctorRow::as_select())
            .first(self.conn)
            .optional()?;
        Ok(row.map(DoctorProfile::from))
    }
}

impl PrescriptionStore for PgStore<'_> {
    fn insert_prescription(&mut self, prescription: &Prescription) -> Result<(), DomainError> {
        diesel::insert_into(prescriptions::table)
            .values(&PrescriptionRow::from(prescription))
            .execute(self.conn)?;
        Ok(())
    }

    fn find_prescription(&mut self, id: Uuid) -> Result<Option<Prescription>, DomainError> {
        prescriptions::table
            .find(id)
            .select(PrescriptionRow::as_select())
            .first(self.conn)
            .optional()?
            .map(Prescription::try_from)
            .transpose()
    }

    fn order_prescriptions(&mut self, order_id: Uuid) -> Result<Vec<Prescription>, DomainError> {
        prescriptions::table
            .filter(prescriptions::order_id.eq(order_id))
            .order(prescriptions::created_at.asc())
            .select(PrescriptionRow::as_select())
            .load(self.conn)?
            .into_iter()
            .map(Prescription::try_from)
            .collect()
    }

    fn update_prescription(&mut self, prescription: &Prescription) -> Result<(), DomainError> {
        let updated = diesel::update(prescriptions::table.find(prescription.id))
            .set(&PrescriptionRow::from(prescription))
            .execute(self.conn)?;
        if updated == 0 {
            return Err(DomainError::NotFound("prescription"));
        }
        Ok(())
    }
}

impl PaymentStore for PgStore<'_> {
    fn insert_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        diesel::insert_into(payments::table)
            .values(&PaymentRow::from(payment))
            .execute(self.conn)
            .map_err(|e| {
                if violates(&e, "payments_external_transaction_id_key") {
                    DomainError::Conflict(format!(
                        "transaction {} is already registered",
                        payment.external_transaction_id
                    ))
                } else {
                    e.into()
                }
            })?;
        Ok(())
    }

    fn lock_payment_by_external_id(&mut self, external_id: &str) -> Result<Option<Payment>, DomainError> {
        payments::table
            .filter(payments::external_transaction_id.eq(external_id))
            .select(PaymentRow::as_select())
            .for_update()
            .first(self.conn)
            .optional()?
            .map(Payment::try_from)
            .transpose()
    }

    fn update_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        let updated = diesel::update(payments::table.find(payment.id))
            .set((
                payments::status.eq(payment.status.as_str()),
                payments::amount.eq(&payment.amount),
                payments::raw_payload.eq(&payment.raw_payload),
                payments::updated_at.eq(payment.updated_at),
            ))
            .execute(self.conn)
            .map_err(|e| {
                if violates(&e, "payments_one_paid_per_order") {
                    DomainError::Conflict(format!("order {} already has a paid payment", payment.order_id))
                } else {
                    e.into()
                }
            })?;
        if updated == 0 {
            return Err(DomainError::NotFound("payment"));
        }
        Ok(())
    }

    fn order_payments(&mut self, order_id: Uuid) -> Result<Vec<Payment>, DomainError> {
        payments::table
            .filter(payments::order_id.eq(order_id))
            .order(payments::created_at.asc())
            .select(PaymentRow::as_select())
            .load(self.conn)?
            .into_iter()
            .map(Payment::try_from)
            .collect()
    }

    fn find_order_payment_with_status(
        &mut self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Payment>, DomainError> {
        payments::table
            .filter(payments::order_id.eq(order_id))
            .filter(payments::status.eq(status.as_str()))
            .order(payments::created_at.asc())
            .select(PaymentRow::as_select())
            .first(self.conn)
            .optional()?
            .map(Payment::try_from)
            .transpose()
    }
}

impl CommissionStore for PgStore<'_> {
    fn insert_commission(&mut self, commission: &Commission) -> Result<(), DomainError> {
        diesel::insert_into(commissions::table)
            .values(&CommissionRow::from(commission))
            .execute(self.conn)
            .map_err(|e| {
                if violates(&e, "commissions_order_id_key") {
                    DomainError::DuplicateCommission(commission.order_id)
                } else {
                    e.into()
                }
            })?;
        Ok(())
    }

    fn find_commission_by_order(&mut self, order_id: Uuid) -> Result<Option<Commission>, DomainError> {
        commissions::table
            .filter(commissions::order_id.eq(order_id))
            .select(CommissionRow::as_select())
            .first(self.conn)
            .optional()?
            .map(Commission::try_from)
            .transpose()
    }

    fn lock_commissions(&mut self, ids: &[Uuid]) -> Result<Vec<Commission>, DomainError> {
        // Fixed lock order keeps concurrent withdrawals from deadlocking.
        commissions::table
            .filter(commissions::id.eq_any(ids))
            .order(commissions::id.asc())
            .select(CommissionRow::as_select())
            .for_update()
            .load(self.conn)?
            .into_iter()
            .map(Commission::try_from)
            .collect()
    }

    fn lock_vendor_commissions(
        &mut self,
        vendor_id: Uuid,
        status: CommissionStatus,
    ) -> Result<Vec<Commission>, DomainError> {
        commissions::table
            .filter(commissions::vendor_id.eq(vendor_id))
            .filter(commissions::status.eq(status.as_str()))
            .order(commissions::id.asc())
            .select(CommissionRow::as_select())
            .for_update()
            .load(self.conn)?
            .into_iter()
            .map(Commission::try_from)
            .collect()
    }

    fn pending_commissions_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Commission>, DomainError> {
        commissions::table
            .filter(commissions::status.eq(CommissionStatus::Pending.as_str()))
            .filter(commissions::created_at.le(cutoff))
            .order(commissions::created_at.asc())
            .select(CommissionRow::as_select())
            .load(self.conn)?
            .into_iter()
            .map(Commission::try_from)
            .collect()
    }

    fn transition_commission(
        &mut self,
        id: Uuid,
        from: CommissionStatus,
        to: CommissionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DomainError> {
        let target = commissions::table
            .filter(commissions::id.eq(id))
            .filter(commissions::status.eq(from.as_str()));
        let updated = match paid_at {
            Some(at) => diesel::update(target)
                .set((commissions::status.eq(to.as_str()), commissions::paid_at.eq(at)))
                .execute(self.conn)?,
            None => diesel::update(target)
                .set(commissions::status.eq(to.as_str()))
                .execute(self.conn)?,
        };
        Ok(updated == 1)
    }
}

impl WithdrawalStore for PgStore<'_> {
    fn insert_withdrawal(&mut self, withdrawal: &Withdrawal, items: &[WithdrawalItem]) -> Result<(), DomainError> {
        diesel::insert_into(withdrawals::table)
            .values(&WithdrawalRow::from(withdrawal))
            .execute(self.conn)?;

        let rows: Vec<WithdrawalItemRow> = items.iter().map(WithdrawalItemRow::from).collect();
        diesel::insert_into(withdrawal_items::table)
            .values(&rows)
            .execute(self.conn)?;
        Ok(())
    }

    fn lock_withdrawal(&mut self, id: Uuid) -> Result<Option<Withdrawal>, DomainError> {
        withdrawals::table
            .find(id)
            .select(WithdrawalRow::as_select())
            .for_update()
            .first(self.conn)
            .optional()?
            .map(Withdrawal::try_from)
            .transpose()
    }

    fn update_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), DomainError> {
        let updated = diesel::update(withdrawals::table.find(withdrawal.id))
            .set(&WithdrawalRow::from(withdrawal))
            .execute(self.conn)?;
        if updated == 0 {
            return Err(DomainError::NotFound("withdrawal"));
        }
        Ok(())
    }

    fn withdrawal_items(&mut self, withdrawal_id: Uuid) -> Result<Vec<WithdrawalItem>, DomainError> {
        let rows = withdrawal_items::table
            .filter(withdrawal_items::withdrawal_id.eq(withdrawal_id))
            .select(WithdrawalItemRow::as_select())
            .load(self.conn)?;
        Ok(rows.into_iter().map(WithdrawalItem::from).collect())
    }
}

impl OutboxStore for PgStore<'_> {
    fn append_event(&mut self, event: &OutboxEvent) -> Result<(), DomainError> {
        // Relays route on `aggregate_type`; the row commits with the caller's transaction.
        diesel::insert_into(marketplace_outbox::table)
            .values(&NewOutboxEventRow {
                id: Uuid::new_v4(),
                aggregate_type: event.aggregate_type.to_string(),
                aggregate_id: event.aggregate_id.to_string(),
                event_type: event.event_type.to_string(),
                payload: event.payload.clone(),
            })
            .execute(self.conn)?;
        Ok(())
    }
}
