use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

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

/// Whole-store state held in memory. Each transaction works on a clone that
/// replaces the original only when the closure succeeds.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderItem>,
    products: HashMap<Uuid, Product>,
    movements: Vec<StockMovement>,
    vendors: HashMap<Uuid, VendorProfile>,
    doctors: HashMap<Uuid, DoctorProfile>,
    prescriptions: Vec<Prescription>,
    payments: Vec<Payment>,
    commissions: Vec<Commission>,
    withdrawals: HashMap<Uuid, Withdrawal>,
    withdrawal_items: Vec<WithdrawalItem>,
    outbox: Vec<OutboxEvent>,
}

impl MemoryState {
    pub fn add_product(&mut self, product: Product) {
        self.products.insert(product.id, product);
    }

    pub fn add_vendor(&mut self, vendor: VendorProfile) {
        self.vendors.insert(vendor.vendor_id, vendor);
    }

    pub fn add_doctor(&mut self, doctor: DoctorProfile) {
        self.doctors.insert(doctor.doctor_id, doctor);
    }

    pub fn product(&self, id: Uuid) -> Option<&Product> {
        self.products.get(&id)
    }

    pub fn movements(&self) -> &[StockMovement] {
        &self.movements
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn commissions(&self) -> &[Commission] {
        &self.commissions
    }

    pub fn withdrawal_item_rows(&self) -> &[WithdrawalItem] {
        &self.withdrawal_items
    }

    pub fn outbox(&self) -> &[OutboxEvent] {
        &self.outbox
    }

    fn product_mut(&mut self, id: Uuid) -> Result<&mut Product, DomainError> {
        self.products.get_mut(&id).ok_or(DomainError::NotFound("product"))
    }
}

impl OrderStore for MemoryState {
    fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> Result<(), DomainError> {
        if self.orders.contains_key(&order.id) {
            return Err(DomainError::Conflict(format!("order {} already exists", order.id)));
        }
        self.orders.insert(order.id, order.clone());
        self.order_items.extend_from_slice(items);
        Ok(())
    }

    fn find_order(&mut self, id: Uuid) -> Result<Option<Order>, DomainError> {
        Ok(self.orders.get(&id).cloned())
    }

    fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>, DomainError> {
        self.find_order(id)
    }

    fn update_order(&mut self, order: &Order) -> Result<(), DomainError> {
        match self.orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(DomainError::NotFound("order")),
        }
    }

    fn order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>, DomainError> {
        Ok(self
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }
}

impl InventoryStore for MemoryState {
    fn find_product(&mut self, id: Uuid) -> Result<Option<Product>, DomainError> {
        Ok(self.products.get(&id).cloned())
    }

    fn lock_product(&mut self, id: Uuid) -> Result<Option<Product>, DomainError> {
        self.find_product(id)
    }

    fn decrement_stock(&mut self, id: Uuid, qty: i32) -> Result<Option<i32>, DomainError> {
        let product = self.product_mut(id)?;
        if product.stock_quantity < qty {
            return Ok(None);
        }
        product.stock_quantity -= qty;
        Ok(Some(product.stock_quantity))
    }

    fn increment_stock(&mut self, id: Uuid, qty: i32) -> Result<i32, DomainError> {
        let product = self.product_mut(id)?;
        product.stock_quantity = product
            .stock_quantity
            .checked_add(qty)
            .ok_or_else(|| DomainError::InvalidInput(format!("stock for product {} would overflow", id)))?;
        Ok(product.stock_quantity)
    }

    fn set_stock(&mut self, id: Uuid, qty: i32) -> Result<(), DomainError> {
        self.product_mut(id)?.stock_quantity = qty;
        Ok(())
    }

    fn insert_movement(&mut self, movement: &StockMovement) -> Result<(), DomainError> {
        self.movements.push(movement.clone());
        Ok(())
    }

    fn product_movements(&mut self, product_id: Uuid) -> Result<Vec<StockMovement>, DomainError> {
        Ok(self
            .movements
            .iter()
            .filter(|m| m.product_id == product_id)
            .cloned()
            .collect())
    }

    fn order_movements(&mut self, order_id: Uuid) -> Result<Vec<StockMovement>, DomainError> {
        Ok(self
            .movements
            .iter()
            .filter(|m| m.order_id == Some(order_id))
            .cloned()
            .collect())
    }
}

impl PartyStore for MemoryState {
    fn find_vendor(&mut self, vendor_id: Uuid) -> Result<Option<VendorProfile>, DomainError> {
        Ok(self.vendors.get(&vendor_id).cloned())
    }

    fn find_doctor(&mut self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, DomainError> {
        Ok(self.doctors.get(&doctor_id).cloned())
    }
}

impl PrescriptionStore for MemoryState {
    fn insert_prescription(&mut self, prescription: &Prescription) -> Result<(), DomainError> {
        self.prescriptions.push(prescription.clone());
        Ok(())
    }

    fn find_prescription(&mut self, id: Uuid) -> Result<Option<Prescription>, DomainError> {
        Ok(self.prescriptions.iter().find(|p| p.id == id).cloned())
    }

    fn order_prescriptions(&mut self, order_id: Uuid) -> Result<Vec<Prescription>, DomainError> {
        Ok(self
            .prescriptions
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }

    fn update_prescription(&mut self, prescription: &Prescription) -> Result<(), DomainError> {
        let existing = self
            .prescriptions
            .iter_mut()
            .find(|p| p.id == prescription.id)
            .ok_or(DomainError::NotFound("prescription"))?;
        *existing = prescription.clone();
        Ok(())
    }
}

impl PaymentStore for MemoryState {
    fn insert_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        if self
            .payments
            .iter()
            .any(|p| p.external_transaction_id == payment.external_transaction_id)
        {
            return Err(DomainError::Conflict(format!(
                "transaction {} is already registered",
                payment.external_transaction_id
            )));
        }
        self.payments.push(payment.clone());
        Ok(())
    }

    fn lock_payment_by_external_id(&mut self, external_id: &str) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .payments
            .iter()
            .find(|p| p.external_transaction_id == external_id)
            .cloned())
    }

    fn update_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        if payment.status == PaymentStatus::Paid
            && self
                .payments
                .iter()
                .any(|p| p.order_id == payment.order_id && p.id != payment.id && p.status == PaymentStatus::Paid)
        {
            return Err(DomainError::Conflict(format!(
                "order {} already has a paid payment",
                payment.order_id
            )));
        }
        let existing = self
            .payments
            .iter_mut()
            .find(|p| p.id == payment.id)
            .ok_or(DomainError::NotFound("payment"))?;
        *existing = payment.clone();
        Ok(())
    }

    fn order_payments(&mut self, order_id: Uuid) -> Result<Vec<Payment>, DomainError> {
        Ok(self
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }

    fn find_order_payment_with_status(
        &mut self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .payments
            .iter()
            .find(|p| p.order_id == order_id && p.status == status)
            .cloned())
    }
}

impl CommissionStore for MemoryState {
    fn insert_commission(&mut self, commission: &Commission) -> Result<(), DomainError> {
        if self.commissions.iter().any(|c| c.order_id == commission.order_id) {
            return Err(DomainError::DuplicateCommission(commission.order_id));
        }
        self.commissions.push(commission.clone());
        Ok(())
    }

    fn find_commission_by_order(&mut self, order_id: Uuid) -> Result<Option<Commission>, DomainError> {
        Ok(self.commissions.iter().find(|c| c.order_id == order_id).cloned())
    }

    fn lock_commissions(&mut self, ids: &[Uuid]) -> Result<Vec<Commission>, DomainError> {
        Ok(self
            .commissions
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    fn lock_vendor_commissions(
        &mut self,
        vendor_id: Uuid,
        status: CommissionStatus,
    ) -> Result<Vec<Commission>, DomainError> {
        Ok(self
            .commissions
            .iter()
            .filter(|c| c.vendor_id == vendor_id && c.status == status)
            .cloned()
            .collect())
    }

    fn pending_commissions_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Commission>, DomainError> {
        Ok(self
            .commissions
            .iter()
            .filter(|c| c.status == CommissionStatus::Pending && c.created_at <= cutoff)
            .cloned()
            .collect())
    }

    fn transition_commission(
        &mut self,
        id: Uuid,
        from: CommissionStatus,
        to: CommissionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DomainError> {
        match self.commissions.iter_mut().find(|c| c.id == id && c.status == from) {
            Some(commission) => {
                commission.status = to;
                if paid_at.is_some() {
                    commission.paid_at = paid_at;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl WithdrawalStore for MemoryState {
    fn insert_withdrawal(&mut self, withdrawal: &Withdrawal, items: &[WithdrawalItem]) -> Result<(), DomainError> {
        self.withdrawals.insert(withdrawal.id, withdrawal.clone());
        self.withdrawal_items.extend_from_slice(items);
        Ok(())
    }

    fn lock_withdrawal(&mut self, id: Uuid) -> Result<Option<Withdrawal>, DomainError> {
        Ok(self.withdrawals.get(&id).cloned())
    }

    fn update_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), DomainError> {
        match self.withdrawals.get_mut(&withdrawal.id) {
            Some(existing) => {
                *existing = withdrawal.clone();
                Ok(())
            }
            None => Err(DomainError::NotFound("withdrawal")),
        }
    }

    fn withdrawal_items(&mut self, withdrawal_id: Uuid) -> Result<Vec<WithdrawalItem>, DomainError> {
        Ok(self
            .withdrawal_items
            .iter()
            .filter(|i| i.withdrawal_id == withdrawal_id)
            .cloned()
            .collect())
    }
}

impl OutboxStore for MemoryState {
    fn append_event(&mut self, event: &OutboxEvent) -> Result<(), DomainError> {
        self.outbox.push(event.clone());
        Ok(())
    }
}

/// Serialisable in-memory unit of work: the mutex is held for the whole
/// transaction, so concurrent callers observe each other's commits in order.
#[derive(Debug, Default)]
pub struct InMemoryUnitOfWork {
    state: Mutex<MemoryState>,
}

impl InMemoryUnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: MemoryState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Copy of the committed state.
    pub fn snapshot(&self) -> Result<MemoryState, DomainError> {
        let guard = self
            .state
            .lock()
            .map_err(|e| DomainError::Internal(e.to_string()))?;
        Ok(guard.clone())
    }
}

impl UnitOfWork for InMemoryUnitOfWork {
    fn transaction<T, F>(&self, f: F) -> Result<T, DomainError>
    where
        F: FnOnce(&mut dyn Store) -> Result<T, DomainError>,
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| DomainError::Internal(e.to_string()))?;
        let mut working = guard.clone();
        let value = f(&mut working)?;
        *guard = working;
        Ok(value)
    }
}
