use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::commission::{Commission, DoctorProfile, VendorProfile};
use crate::domain::errors::DomainError;
use crate::domain::inventory::{Product, StockMovement};
use crate::domain::order::{Order, OrderItem};
use crate::domain::payment::Payment;
use crate::domain::prescription::{PrescriberIdentity, Prescription};
use crate::domain::withdrawal::{Withdrawal, WithdrawalItem};
use crate::schema::{
    commissions, doctors, marketplace_outbox, order_items, orders, payments, prescriptions, products,
    stock_movements, vendors, withdrawal_items, withdrawals,
};

// ── Catalog & inventory ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductRow {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub requires_prescription: bool,
    pub stock_quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id,
            vendor_id: r.vendor_id,
            name: r.name,
            price: r.price,
            requires_prescription: r.requires_prescription,
            stock_quantity: r.stock_quantity,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = products)]
pub struct NewProductRow {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub requires_prescription: bool,
    pub stock_quantity: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = stock_movements)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StockMovementRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub order_id: Option<Uuid>,
    pub movement_type: String,
    pub delta: i32,
    pub quantity_after: i32,
    pub actor_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl From<&StockMovement> for StockMovementRow {
    fn from(m: &StockMovement) -> Self {
        StockMovementRow {
            id: m.id,
            product_id: m.product_id,
            order_id: m.order_id,
            movement_type: m.movement_type.as_str().to_string(),
            delta: m.delta,
            quantity_after: m.quantity_after,
            actor_id: m.actor_id,
            reason: m.reason.clone(),
            created_at: m.created_at,
        }
    }
}

impl TryFrom<StockMovementRow> for StockMovement {
    type Error = DomainError;

    fn try_from(r: StockMovementRow) -> Result<Self, Self::Error> {
        Ok(StockMovement {
            id: r.id,
            product_id: r.product_id,
            order_id: r.order_id,
            movement_type: r.movement_type.parse().map_err(corrupt)?,
            delta: r.delta,
            quantity_after: r.quantity_after,
            actor_id: r.actor_id,
            reason: r.reason,
            created_at: r.created_at,
        })
    }
}

// ── Parties ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = vendors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct VendorRow {
    pub vendor_id: Uuid,
    pub commission_percent: BigDecimal,
    pub active: bool,
}

impl From<VendorRow> for VendorProfile {
    fn from(r: VendorRow) -> Self {
        VendorProfile {
            vendor_id: r.vendor_id,
            commission_percent: r.commission_percent,
            active: r.active,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = vendors)]
pub struct NewVendorRow {
    pub vendor_id: Uuid,
    pub commission_percent: BigDecimal,
    pub active: bool,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = doctors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DoctorRow {
    pub doctor_id: Uuid,
    pub name: String,
    pub registration: String,
    pub jurisdiction: String,
    pub platform_registered: bool,
    pub approved: bool,
}

impl From<DoctorRow> for DoctorProfile {
    fn from(r: DoctorRow) -> Self {
        DoctorProfile {
            doctor_id: r.doctor_id,
            name: r.name,
            registration: r.registration,
            jurisdiction: r.jurisdiction,
            platform_registered: r.platform_registered,
            approved: r.approved,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = doctors)]
pub struct NewDoctorRow {
    pub doctor_id: Uuid,
    pub name: String,
    pub registration: String,
    pub jurisdiction: String,
    pub platform_registered: bool,
    pub approved: bool,
}

// ── Orders ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct OrderRow {
    pub id: Uuid,
    pub code: String,
    pub client_id: Uuid,
    pub vendor_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub prescription_id: Option<Uuid>,
    pub status: String,
    pub subtotal: BigDecimal,
    pub discount: BigDecimal,
    pub total: BigDecimal,
    pub payment_method: String,
    pub shipping_address: Value,
    pub tracking_code: Option<String>,
    pub carrier: Option<String>,
    pub cancellation_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub stock_shortfall: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&Order> for OrderRow {
    type Error = DomainError;

    fn try_from(o: &Order) -> Result<Self, Self::Error> {
        Ok(OrderRow {
            id: o.id,
            code: o.code.clone(),
            client_id: o.client_id,
            vendor_id: o.vendor_id,
            doctor_id: o.doctor_id,
            prescription_id: o.prescription_id,
            status: o.status.as_str().to_string(),
            subtotal: o.subtotal.clone(),
            discount: o.discount.clone(),
            total: o.total.clone(),
            payment_method: o.payment_method.clone(),
            shipping_address: serde_json::to_value(&o.shipping_address)
                .map_err(|e| DomainError::Internal(e.to_string()))?,
            tracking_code: o.tracking_code.clone(),
            carrier: o.carrier.clone(),
            cancellation_reason: o.cancellation_reason.clone(),
            approved_at: o.approved_at,
            approved_by: o.approved_by,
            cancelled_at: o.cancelled_at,
            cancelled_by: o.cancelled_by,
            stock_shortfall: o.stock_shortfall,
            created_at: o.created_at,
            updated_at: o.updated_at,
        })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = DomainError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: r.id,
            code: r.code,
            client_id: r.client_id,
            vendor_id: r.vendor_id,
            doctor_id: r.doctor_id,
            prescription_id: r.prescription_id,
            status: r.status.parse().map_err(corrupt)?,
            subtotal: r.subtotal,
            discount: r.discount,
            total: r.total,
            payment_method: r.payment_method,
            shipping_address: serde_json::from_value(r.shipping_address)
                .map_err(|e| DomainError::Internal(format!("corrupt shipping address: {}", e)))?,
            tracking_code: r.tracking_code,
            carrier: r.carrier,
            cancellation_reason: r.cancellation_reason,
            approved_at: r.approved_at,
            approved_by: r.approved_by,
            cancelled_at: r.cancelled_at,
            cancelled_by: r.cancelled_by,
            stock_shortfall: r.stock_shortfall,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub line_total: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(r: OrderItemRow) -> Self {
        OrderItem {
            id: r.id,
            order_id: r.order_id,
            product_id: r.product_id,
            quantity: r.quantity,
            unit_price: r.unit_price,
            line_total: r.line_total,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_items)]
pub struct NewOrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub line_total: BigDecimal,
}

impl From<&OrderItem> for NewOrderItemRow {
    fn from(i: &OrderItem) -> Self {
        NewOrderItemRow {
            id: i.id,
            order_id: i.order_id,
            product_id: i.product_id,
            quantity: i.quantity,
            unit_price: i.unit_price.clone(),
            line_total: i.line_total.clone(),
        }
    }
}

// ── Prescriptions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = prescriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct PrescriptionRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub file_reference: String,
    pub prescriber_name: String,
    pub prescriber_registration: String,
    pub prescriber_jurisdiction: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Prescription> for PrescriptionRow {
    fn from(p: &Prescription) -> Self {
        PrescriptionRow {
            id: p.id,
            order_id: p.order_id,
            file_reference: p.file_reference.clone(),
            prescriber_name: p.prescriber.name.clone(),
            prescriber_registration: p.prescriber.registration.clone(),
            prescriber_jurisdiction: p.prescriber.jurisdiction.clone(),
            status: p.status.as_str().to_string(),
            rejection_reason: p.rejection_reason.clone(),
            reviewed_by: p.reviewed_by,
            reviewed_at: p.reviewed_at,
            created_at: p.created_at,
        }
    }
}

impl TryFrom<PrescriptionRow> for Prescription {
    type Error = DomainError;

    fn try_from(r: PrescriptionRow) -> Result<Self, Self::Error> {
        Ok(Prescription {
            id: r.id,
            order_id: r.order_id,
            file_reference: r.file_reference,
            prescriber: PrescriberIdentity {
                name: r.prescriber_name,
                registration: r.prescriber_registration,
                jurisdiction: r.prescriber_jurisdiction,
            },
            status: r.status.parse().map_err(corrupt)?,
            rejection_reason: r.rejection_reason,
            reviewed_by: r.reviewed_by,
            reviewed_at: r.reviewed_at,
            created_at: r.created_at,
        })
    }
}

// ── Payments ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub gateway: String,
    pub method: String,
    pub amount: BigDecimal,
    pub status: String,
    pub external_transaction_id: String,
    pub raw_payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentRow {
    fn from(p: &Payment) -> Self {
        PaymentRow {
            id: p.id,
            order_id: p.order_id,
            gateway: p.gateway.as_str().to_string(),
            method: p.method.clone(),
            amount: p.amount.clone(),
            status: p.status.as_str().to_string(),
            external_transaction_id: p.external_transaction_id.clone(),
            raw_payload: p.raw_payload.clone(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(r: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: r.id,
            order_id: r.order_id,
            gateway: r.gateway.parse().map_err(corrupt)?,
            method: r.method,
            amount: r.amount,
            status: r.status.parse().map_err(corrupt)?,
            external_transaction_id: r.external_transaction_id,
            raw_payload: r.raw_payload,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

// ── Commissions & withdrawals ────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = commissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CommissionRow {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub order_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub amount: BigDecimal,
    pub percentage: BigDecimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<&Commission> for CommissionRow {
    fn from(c: &Commission) -> Self {
        CommissionRow {
            id: c.id,
            vendor_id: c.vendor_id,
            order_id: c.order_id,
            doctor_id: c.doctor_id,
            amount: c.amount.clone(),
            percentage: c.percentage.clone(),
            status: c.status.as_str().to_string(),
            created_at: c.created_at,
            available_at: c.available_at,
            paid_at: c.paid_at,
        }
    }
}

impl TryFrom<CommissionRow> for Commission {
    type Error = DomainError;

    fn try_from(r: CommissionRow) -> Result<Self, Self::Error> {
        Ok(Commission {
            id: r.id,
            vendor_id: r.vendor_id,
            order_id: r.order_id,
            doctor_id: r.doctor_id,
            amount: r.amount,
            percentage: r.percentage,
            status: r.status.parse().map_err(corrupt)?,
            created_at: r.created_at,
            available_at: r.available_at,
            paid_at: r.paid_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = withdrawals)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct WithdrawalRow {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub gross_amount: BigDecimal,
    pub fee: BigDecimal,
    pub net_amount: BigDecimal,
    pub status: String,
    pub bank_details: Value,
    pub rejection_reason: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<Uuid>,
}

impl From<&Withdrawal> for WithdrawalRow {
    fn from(w: &Withdrawal) -> Self {
        WithdrawalRow {
            id: w.id,
            vendor_id: w.vendor_id,
            gross_amount: w.gross_amount.clone(),
            fee: w.fee.clone(),
            net_amount: w.net_amount.clone(),
            status: w.status.as_str().to_string(),
            bank_details: w.bank_details.clone(),
            rejection_reason: w.rejection_reason.clone(),
            requested_at: w.requested_at,
            processed_at: w.processed_at,
            processed_by: w.processed_by,
        }
    }
}

impl TryFrom<WithdrawalRow> for Withdrawal {
    type Error = DomainError;

    fn try_from(r: WithdrawalRow) -> Result<Self, Self::Error> {
        Ok(Withdrawal {
            id: r.id,
            vendor_id: r.vendor_id,
            gross_amount: r.gross_amount,
            fee: r.fee,
            net_amount: r.net_amount,
            status: r.status.parse().map_err(corrupt)?,
            bank_details: r.bank_details,
            rejection_reason: r.rejection_reason,
            requested_at: r.requested_at,
            processed_at: r.processed_at,
            processed_by: r.processed_by,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = withdrawal_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WithdrawalItemRow {
    pub id: Uuid,
    pub withdrawal_id: Uuid,
    pub commission_id: Uuid,
    pub amount: BigDecimal,
}

impl From<&WithdrawalItem> for WithdrawalItemRow {
    fn from(i: &WithdrawalItem) -> Self {
        WithdrawalItemRow {
            id: i.id,
            withdrawal_id: i.withdrawal_id,
            commission_id: i.commission_id,
            amount: i.amount.clone(),
        }
    }
}

impl From<WithdrawalItemRow> for WithdrawalItem {
    fn from(r: WithdrawalItemRow) -> Self {
        WithdrawalItem {
            id: r.id,
            withdrawal_id: r.withdrawal_id,
            commission_id: r.commission_id,
            amount: r.amount,
        }
    }
}

// ── Outbox ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = marketplace_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = marketplace_outbox)]
pub struct NewOutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
}

fn corrupt(e: DomainError) -> DomainError {
    DomainError::Internal(format!("corrupt row: {}", e))
}
