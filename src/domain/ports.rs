use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::commission::{Commission, CommissionStatus, DoctorProfile, VendorProfile};
use super::errors::DomainError;
use super::inventory::{Product, StockMovement};
use super::order::{Order, OrderItem};
use super::outbox::OutboxEvent;
use super::payment::{Payment, PaymentStatus};
use super::prescription::Prescription;
use super::withdrawal::{Withdrawal, WithdrawalItem};

pub trait OrderStore {
    fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> Result<(), DomainError>;
    fn find_order(&mut self, id: Uuid) -> Result<Option<Order>, DomainError>;
    /// Loads the order and holds a row lock until the transaction ends.
    fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>, DomainError>;
    fn update_order(&mut self, order: &Order) -> Result<(), DomainError>;
    fn order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>, DomainError>;
}

pub trait InventoryStore {
    fn find_product(&mut self, id: Uuid) -> Result<Option<Product>, DomainError>;
    fn lock_product(&mut self, id: Uuid) -> Result<Option<Product>, DomainError>;
    /// Conditional decrement: applies only while `stock_quantity >= qty`.
    /// Returns the new quantity, or `None` when the guard did not match.
    fn decrement_stock(&mut self, id: Uuid, qty: i32) -> Result<Option<i32>, DomainError>;
    fn increment_stock(&mut self, id: Uuid, qty: i32) -> Result<i32, DomainError>;
    fn set_stock(&mut self, id: Uuid, qty: i32) -> Result<(), DomainError>;
    fn insert_movement(&mut self, movement: &StockMovement) -> Result<(), DomainError>;
    fn product_movements(&mut self, product_id: Uuid) -> Result<Vec<StockMovement>, DomainError>;
    fn order_movements(&mut self, order_id: Uuid) -> Result<Vec<StockMovement>, DomainError>;
}

pub trait PartyStore {
    fn find_vendor(&mut self, vendor_id: Uuid) -> Result<Option<VendorProfile>, DomainError>;
    fn find_doctor(&mut self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, DomainError>;
}

pub trait PrescriptionStore {
    fn insert_prescription(&mut self, prescription: &Prescription) -> Result<(), DomainError>;
    fn find_prescription(&mut self, id: Uuid) -> Result<Option<Prescription>, DomainError>;
    fn order_prescriptions(&mut self, order_id: Uuid) -> Result<Vec<Prescription>, DomainError>;
    fn update_prescription(&mut self, prescription: &Prescription) -> Result<(), DomainError>;
}

pub trait PaymentStore {
    fn insert_payment(&mut self, payment: &Payment) -> Result<(), DomainError>;
    fn lock_payment_by_external_id(&mut self, external_id: &str) -> Result<Option<Payment>, DomainError>;
    fn update_payment(&mut self, payment: &Payment) -> Result<(), DomainError>;
    fn order_payments(&mut self, order_id: Uuid) -> Result<Vec<Payment>, DomainError>;
    fn find_order_payment_with_status(
        &mut self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Payment>, DomainError>;
}

pub trait CommissionStore {
    /// Fails with `DuplicateCommission` when the order already has one.
    fn insert_commission(&mut self, commission: &Commission) -> Result<(), DomainError>;
    fn find_commission_by_order(&mut self, order_id: Uuid) -> Result<Option<Commission>, DomainError>;
    fn lock_commissions(&mut self, ids: &[Uuid]) -> Result<Vec<Commission>, DomainError>;
    fn lock_vendor_commissions(
        &mut self,
        vendor_id: Uuid,
        status: CommissionStatus,
    ) -> Result<Vec<Commission>, DomainError>;
    fn pending_commissions_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Commission>, DomainError>;
    /// Conditional status flip; returns `false` if the commission was no
    /// longer in `from`.
    fn transition_commission(
        &mut self,
        id: Uuid,
        from: CommissionStatus,
        to: CommissionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DomainError>;
}

pub trait WithdrawalStore {
    fn insert_withdrawal(&mut self, withdrawal: &Withdrawal, items: &[WithdrawalItem]) -> Result<(), DomainError>;
    fn lock_withdrawal(&mut self, id: Uuid) -> Result<Option<Withdrawal>, DomainError>;
    fn update_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), DomainError>;
    fn withdrawal_items(&mut self, withdrawal_id: Uuid) -> Result<Vec<WithdrawalItem>, DomainError>;
}

pub trait OutboxStore {
    fn append_event(&mut self, event: &OutboxEvent) -> Result<(), DomainError>;
}

/// Everything a transaction can touch.
pub trait Store:
    OrderStore
    + InventoryStore
    + PartyStore
    + PrescriptionStore
    + PaymentStore
    + CommissionStore
    + WithdrawalStore
    + OutboxStore
{
}

impl<T> Store for T where
    T: OrderStore
        + InventoryStore
        + PartyStore
        + PrescriptionStore
        + PaymentStore
        + CommissionStore
        + WithdrawalStore
        + OutboxStore
        + ?Sized
{
}

pub trait UnitOfWork: Send + Sync + 'static {
    /// Runs `f` in one transaction: `Ok` commits every write, `Err` discards
    /// all of them.
    fn transaction<T, F>(&self, f: F) -> Result<T, DomainError>
    where
        F: FnOnce(&mut dyn Store) -> Result<T, DomainError>;
}
