use bigdecimal::{BigDecimal, Zero};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::commission_engine::CommissionEngine;
use super::inventory_ledger::InventoryLedger;
use super::payment_reconciler::{PaymentReconciler, Reconciliation};
use super::prescription_gate::PrescriptionGate;
use super::withdrawal_consolidator::WithdrawalConsolidator;
use crate::domain::commission::{Commission, ReleaseReport};
use crate::domain::context::{RequestContext, Role};
use crate::domain::errors::DomainError;
use crate::domain::inventory::StockMovement;
use crate::domain::order::{CheckoutRequest, Order, OrderItem, OrderStatus, OrderView};
use crate::domain::outbox::OutboxEvent;
use crate::domain::payment::{GatewayEvent, Payment, PaymentAttempt, PaymentStatus};
use crate::domain::ports::{Store, UnitOfWork};
use crate::domain::prescription::{Prescription, PrescriptionUpload};
use crate::domain::withdrawal::{
    CommissionSelection, FeePolicy, Withdrawal, WithdrawalDecision, WithdrawalItem,
};
use crate::domain::Outcome;

#[derive(Debug, Clone)]
pub struct SettlementPolicy {
    pub maturity_days: i64,
    pub fee_policy: FeePolicy,
}

#[derive(Debug, Clone)]
pub struct ShipmentDetails {
    pub tracking_code: String,
    pub carrier: String,
}

/// Effect of one gateway notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Already in this state, or a late redelivery; nothing was written.
    NoOp { payment_id: Uuid, status: PaymentStatus },
    Updated { payment_id: Uuid, status: PaymentStatus },
    OrderPaid { payment_id: Uuid, order_id: Uuid },
    /// Payment recorded, but the order could not take its stock.
    StockShortfall { payment_id: Uuid, order_id: Uuid, product_id: Uuid },
    /// Money arrived for an order that cannot accept it.
    RefundRequested { payment_id: Uuid, order_id: Uuid },
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        matches!(self, ReconcileOutcome::NoOp { .. })
    }
}

/// The order state machine. Every public operation runs in a single
/// transaction and drives the other components from inside it.
pub struct OrderLifecycle<U> {
    uow: U,
    ledger: InventoryLedger,
    gate: PrescriptionGate,
    reconciler: PaymentReconciler,
    commissions: CommissionEngine,
    withdrawals: WithdrawalConsolidator,
}

impl<U: UnitOfWork> OrderLifecycle<U> {
    pub fn new(uow: U, policy: SettlementPolicy) -> Self {
        Self {
            uow,
            ledger: InventoryLedger::new(),
            gate: PrescriptionGate::new(),
            reconciler: PaymentReconciler::new(),
            commissions: CommissionEngine::new(policy.maturity_days),
            withdrawals: WithdrawalConsolidator::new(policy.fee_policy),
        }
    }

    pub fn unit_of_work(&self) -> &U {
        &self.uow
    }

    // ── Checkout ─────────────────────────────────────────────────────────────

    pub fn checkout(&self, ctx: &RequestContext, req: CheckoutRequest) -> Result<OrderView, DomainError> {
        if ctx.role() != Role::Client {
            return Err(DomainError::UnauthorizedAction("only clients can check out".to_string()));
        }
        if req.lines.is_empty() {
            return Err(DomainError::InvalidInput("an order needs at least one item".to_string()));
        }
        if req.payment_method.trim().is_empty() {
            return Err(DomainError::InvalidInput("payment method is required".to_string()));
        }
        if req.discount < BigDecimal::zero() {
            return Err(DomainError::InvalidInput("discount cannot be negative".to_string()));
        }

        // Merge repeated products into a single line, keeping first-seen order.
        let mut lines: Vec<(Uuid, i32)> = Vec::new();
        for line in &req.lines {
            if line.quantity <= 0 {
                return Err(DomainError::InvalidInput(format!(
                    "quantity for product {} must be positive",
                    line.product_id
                )));
            }
            match lines.iter_mut().find(|(id, _)| *id == line.product_id) {
                Some((_, qty)) => {
                    *qty = qty.checked_add(line.quantity).ok_or_else(|| {
                        DomainError::InvalidInput(format!(
                            "quantity for product {} is too large",
                            line.product_id
                        ))
                    })?;
                }
                None => lines.push((line.product_id, line.quantity)),
            }
        }

        self.uow.transaction(|tx| {
            let order_id = Uuid::new_v4();
            let mut vendor_id = None;
            let mut requires_prescription = false;
            let mut items = Vec::with_capacity(lines.len());

            for (product_id, qty) in &lines {
                let product = tx
                    .find_product(*product_id)?
                    .ok_or(DomainError::NotFound("product"))?;
                match vendor_id {
                    None => vendor_id = Some(product.vendor_id),
                    Some(v) if v != product.vendor_id => {
                        return Err(DomainError::InvalidInput(
                            "all items of an order must come from the same vendor".to_string(),
                        ))
                    }
                    Some(_) => {}
                }
                if !self.ledger.check_available(tx, *product_id, *qty)? {
                    return Err(DomainError::InsufficientStock {
                        product_id: *product_id,
                        requested: *qty,
                        available: product.stock_quantity,
                    });
                }
                requires_prescription |= product.requires_prescription;
                items.push(OrderItem::new(order_id, *product_id, *qty, product.price.clone()));
            }

            let vendor_id = vendor_id.ok_or_else(|| DomainError::InvalidInput("no items".to_string()))?;
            match tx.find_vendor(vendor_id)? {
                Some(v) if v.active => {}
                _ => return Err(DomainError::InvalidInput(format!("vendor {} is not active", vendor_id))),
            }
            if let Some(doctor_id) = req.doctor_id {
                tx.find_doctor(doctor_id)?.ok_or(DomainError::NotFound("doctor"))?;
            }

            let subtotal = items
                .iter()
                .fold(BigDecimal::zero(), |acc, i| acc + &i.line_total);
            if req.discount > subtotal {
                return Err(DomainError::InvalidInput("discount exceeds the order subtotal".to_string()));
            }
            let total = &subtotal - &req.discount;

            let mut order = Order {
                id: order_id,
                code: Order::human_code(order_id, ctx.now),
                client_id: ctx.actor.id,
                vendor_id,
                doctor_id: req.doctor_id,
                prescription_id: None,
                status: OrderStatus::Cart,
                subtotal,
                discount: req.discount.clone(),
                total,
                payment_method: req.payment_method.trim().to_string(),
                shipping_address: req.shipping_address.clone(),
                tracking_code: None,
                carrier: None,
                cancellation_reason: None,
                approved_at: None,
                approved_by: None,
                cancelled_at: None,
                cancelled_by: None,
                stock_shortfall: false,
                created_at: ctx.now,
                updated_at: ctx.now,
            };
            let target = if requires_prescription {
                OrderStatus::AwaitingPrescription
            } else {
                OrderStatus::Approved
            };
            order.transition_to(target, ctx.now)?;
            if target == OrderStatus::Approved {
                order.approved_at = Some(ctx.now);
            }
            tx.insert_order(&order, &items)?;

            let line_payloads: Vec<Value> = items
                .iter()
                .map(|i| {
                    json!({
                        "product_id": i.product_id,
                        "quantity": i.quantity,
                        "unit_price": i.unit_price.to_string(),
                    })
                })
                .collect();
            tx.append_event(&OutboxEvent::new(
                "Order",
                order.id,
                "OrderPlaced",
                json!({
                    "order_id": order.id,
                    "code": order.code,
                    "client_id": order.client_id,
                    "vendor_id": order.vendor_id,
                    "status": order.status.as_str(),
                    "total": order.total.to_string(),
                    "lines": line_payloads,
                }),
            ))?;
            tx.append_event(&OutboxEvent::order_status_changed(
                order.id,
                OrderStatus::Cart,
                order.status,
                ctx.actor.id,
            ))?;
            log::info!("Order {} ({}) placed in status {}", order.code, order.id, order.status);
            Ok(OrderView { order, items })
        })
    }

    pub fn get_order(&self, ctx: &RequestContext, order_id: Uuid) -> Result<OrderView, DomainError> {
        self.uow.transaction(|tx| {
            let order = tx.find_order(order_id)?.ok_or(DomainError::NotFound("order"))?;
            authorize_view(ctx, &order)?;
            let items = tx.order_items(order_id)?;
            Ok(OrderView { order, items })
        })
    }

    pub fn order_payments(&self, ctx: &RequestContext, order_id: Uuid) -> Result<Vec<Payment>, DomainError> {
        self.uow.transaction(|tx| {
            let order = tx.find_order(order_id)?.ok_or(DomainError::NotFound("order"))?;
            authorize_view(ctx, &order)?;
            tx.order_payments(order_id)
        })
    }

    // ── Prescription gate ────────────────────────────────────────────────────

    pub fn submit_prescription(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        upload: PrescriptionUpload,
    ) -> Result<Prescription, DomainError> {
        self.uow.transaction(|tx| {
            let mut order = lock(tx, order_id)?;
            authorize(ctx, &order, OrderStatus::AwaitingApproval)?;
            if order.status != OrderStatus::AwaitingPrescription {
                return Err(DomainError::transition("order", order.status, OrderStatus::AwaitingApproval));
            }
            let prescription = self.gate.submit(tx, ctx, &order, upload)?;
            order.prescription_id = Some(prescription.id);
            self.transition(tx, ctx, &mut order, OrderStatus::AwaitingApproval)?;
            Ok(prescription)
        })
    }

    /// Approves the document and, with it, the order. A second approval is
    /// reported as a no-op.
    pub fn approve_prescription(
        &self,
        ctx: &RequestContext,
        prescription_id: Uuid,
    ) -> Result<Outcome<Order>, DomainError> {
        self.uow.transaction(|tx| {
            let prescription = tx
                .find_prescription(prescription_id)?
                .ok_or(DomainError::NotFound("prescription"))?;
            let mut order = lock(tx, prescription.order_id)?;
            if order.prescription_id != Some(prescription.id) {
                return Err(DomainError::Conflict(format!(
                    "prescription {} has been superseded",
                    prescription.id
                )));
            }
            match self.gate.approve(tx, ctx, prescription_id)? {
                Outcome::NoOp(_) => Ok(Outcome::NoOp(order)),
                Outcome::Applied(_) => {
                    self.approve_order_in(tx, ctx, &mut order)?;
                    Ok(Outcome::Applied(order))
                }
            }
        })
    }

    /// `awaiting_approval -> approved`, guarded by the current prescription.
    pub fn approve_order(&self, ctx: &RequestContext, order_id: Uuid) -> Result<Order, DomainError> {
        self.uow.transaction(|tx| {
            let mut order = lock(tx, order_id)?;
            self.approve_order_in(tx, ctx, &mut order)?;
            Ok(order)
        })
    }

    pub fn reject_prescription(
        &self,
        ctx: &RequestContext,
        prescription_id: Uuid,
        reason: &str,
    ) -> Result<Order, DomainError> {
        self.uow.transaction(|tx| {
            let prescription = tx
                .find_prescription(prescription_id)?
                .ok_or(DomainError::NotFound("prescription"))?;
            let mut order = lock(tx, prescription.order_id)?;
            let rejected = self.gate.reject(tx, ctx, prescription_id, reason)?;
            if order.status == OrderStatus::AwaitingApproval && order.prescription_id == Some(rejected.id) {
                self.transition(tx, ctx, &mut order, OrderStatus::AwaitingPrescription)?;
            }
            tx.append_event(&OutboxEvent::new(
                "Order",
                order.id,
                "PrescriptionRejected",
                json!({
                    "order_id": order.id,
                    "prescription_id": rejected.id,
                    "reason": rejected.rejection_reason,
                }),
            ))?;
            Ok(order)
        })
    }

    // ── Payment ──────────────────────────────────────────────────────────────

    /// `approved -> awaiting_payment`.
    pub fn request_payment(&self, ctx: &RequestContext, order_id: Uuid) -> Result<Order, DomainError> {
        self.advance(ctx, order_id, OrderStatus::AwaitingPayment)
    }

    /// Registers a charge created at the gateway as a pending payment.
    pub fn register_payment(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        attempt: PaymentAttempt,
    ) -> Result<Payment, DomainError> {
        self.uow.transaction(|tx| {
            let order = lock(tx, order_id)?;
            match ctx.role() {
                Role::Admin | Role::System => {}
                Role::Client if order.client_id == ctx.actor.id => {}
                _ => {
                    return Err(DomainError::UnauthorizedAction(
                        "only the ordering client can pay for an order".to_string(),
                    ))
                }
            }
            if order.status != OrderStatus::AwaitingPayment {
                return Err(DomainError::InvalidInput(format!(
                    "order {} is not awaiting payment (status: {})",
                    order.id, order.status
                )));
            }
            self.reconciler.register(tx, ctx, &order, attempt)
        })
    }

    /// Applies a gateway notification. Idempotent by external transaction id:
    /// a repeated status writes nothing and fires nothing.
    pub fn apply_gateway_event(&self, event: GatewayEvent) -> Result<ReconcileOutcome, DomainError> {
        let ctx = RequestContext::system();
        self.uow.transaction(|tx| {
            let (payment, to) = match self.reconciler.evaluate(tx, &event)? {
                Reconciliation::Unchanged(payment) => {
                    log::debug!("Duplicate {} event for {}", payment.status, payment.external_transaction_id);
                    return Ok(ReconcileOutcome::NoOp {
                        payment_id: payment.id,
                        status: payment.status,
                    });
                }
                Reconciliation::Stale { payment, incoming } => {
                    log::info!(
                        "Ignoring stale {} event for {} (stored: {})",
                        incoming,
                        payment.external_transaction_id,
                        payment.status
                    );
                    return Ok(ReconcileOutcome::NoOp {
                        payment_id: payment.id,
                        status: payment.status,
                    });
                }
                Reconciliation::Advance { payment, to } => (payment, to),
            };
            let raw = Some(event.raw_payload.clone());

            if to != PaymentStatus::Paid {
                let payment = self.reconciler.record(tx, payment, to, raw, ctx.now)?;
                log::info!("Payment {} is now {}", payment.external_transaction_id, payment.status);
                return Ok(ReconcileOutcome::Updated {
                    payment_id: payment.id,
                    status: payment.status,
                });
            }

            let mut order = lock(tx, payment.order_id)?;
            let already_paid = tx
                .find_order_payment_with_status(order.id, PaymentStatus::Paid)?
                .is_some_and(|p| p.id != payment.id);
            if order.status != OrderStatus::AwaitingPayment || already_paid {
                let payment = self
                    .reconciler
                    .record(tx, payment, PaymentStatus::RefundPending, raw, ctx.now)?;
                log::warn!(
                    "Payment {} arrived for order {} in status {}{}; refund requested",
                    payment.external_transaction_id,
                    order.id,
                    order.status,
                    if already_paid { " (already paid)" } else { "" }
                );
                append_refund_requested(tx, &payment)?;
                return Ok(ReconcileOutcome::RefundRequested {
                    payment_id: payment.id,
                    order_id: order.id,
                });
            }

            let payment = self.reconciler.record(tx, payment, PaymentStatus::Paid, raw, ctx.now)?;
            match self.enter_paid(tx, &ctx, &mut order) {
                Ok(()) => Ok(ReconcileOutcome::OrderPaid {
                    payment_id: payment.id,
                    order_id: order.id,
                }),
                Err(DomainError::InsufficientStock {
                    product_id,
                    requested,
                    available,
                }) => {
                    self.flag_shortfall(tx, &mut order, product_id, requested, available)?;
                    Ok(ReconcileOutcome::StockShortfall {
                        payment_id: payment.id,
                        order_id: order.id,
                        product_id,
                    })
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Re-runs `awaiting_payment -> paid` from the payment of record after a
    /// stock shortfall was resolved.
    pub fn retry_payment_confirmation(&self, ctx: &RequestContext, order_id: Uuid) -> Result<Order, DomainError> {
        ctx.require_admin("payment confirmation retry")?;
        self.uow.transaction(|tx| {
            let mut order = lock(tx, order_id)?;
            if order.status != OrderStatus::AwaitingPayment {
                return Err(DomainError::transition("order", order.status, OrderStatus::Paid));
            }
            if tx
                .find_order_payment_with_status(order.id, PaymentStatus::Paid)?
                .is_none()
            {
                return Err(DomainError::InvalidInput(format!(
                    "order {} has no paid payment of record",
                    order.id
                )));
            }
            self.enter_paid(tx, ctx, &mut order)?;
            Ok(order)
        })
    }

    // ── Fulfillment ──────────────────────────────────────────────────────────

    /// `paid -> preparing_shipment`.
    pub fn start_preparation(&self, ctx: &RequestContext, order_id: Uuid) -> Result<Order, DomainError> {
        self.advance(ctx, order_id, OrderStatus::PreparingShipment)
    }

    /// `preparing_shipment -> shipped`; creates the order's commission in the
    /// same transaction.
    pub fn ship(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        shipment: ShipmentDetails,
    ) -> Result<(Order, Commission), DomainError> {
        let tracking_code = shipment.tracking_code.trim().to_string();
        let carrier = shipment.carrier.trim().to_string();
        if tracking_code.is_empty() || carrier.is_empty() {
            return Err(DomainError::InvalidInput(
                "tracking code and carrier are required to ship".to_string(),
            ));
        }
        self.uow.transaction(|tx| {
            let mut order = lock(tx, order_id)?;
            order.tracking_code = Some(tracking_code.clone());
            order.carrier = Some(carrier.clone());
            self.transition(tx, ctx, &mut order, OrderStatus::Shipped)?;
            let commission = self.commissions.calculate(tx, ctx, &order)?;
            tx.append_event(&OutboxEvent::new(
                "Commission",
                commission.id,
                "CommissionCreated",
                json!({
                    "commission_id": commission.id,
                    "order_id": order.id,
                    "vendor_id": commission.vendor_id,
                    "doctor_id": commission.doctor_id,
                    "amount": commission.amount.to_string(),
                    "available_at": commission.available_at,
                }),
            ))?;
            Ok((order, commission))
        })
    }

    /// `shipped -> delivered`.
    pub fn deliver(&self, ctx: &RequestContext, order_id: Uuid) -> Result<Order, DomainError> {
        self.advance(ctx, order_id, OrderStatus::Delivered)
    }

    /// Cancels a non-terminal order. Stock taken at payment is put back
    /// (unless the goods already left), a paid payment is flagged for refund
    /// and a still-pending commission is voided.
    pub fn cancel(&self, ctx: &RequestContext, order_id: Uuid, reason: Option<String>) -> Result<Order, DomainError> {
        self.uow.transaction(|tx| {
            let mut order = lock(tx, order_id)?;
            let from = order.status;
            order.cancellation_reason = Some(
                reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("cancelled by {}", ctx.role())),
            );
            order.cancelled_at = Some(ctx.now);
            order.cancelled_by = Some(ctx.actor.id);
            self.transition(tx, ctx, &mut order, OrderStatus::Cancelled)?;

            if from.has_committed_stock() && from != OrderStatus::Shipped {
                self.ledger.restore_order(tx, ctx, order.id)?;
            }
            if let Some(payment) = self.reconciler.request_refund(tx, order.id, ctx.now)? {
                append_refund_requested(tx, &payment)?;
            }
            if let Some(voided) = self.commissions.void_for_order(tx, order.id)? {
                log::info!("Commission {} voided with order {}", voided.id, order.id);
            }
            Ok(order)
        })
    }

    // ── Inventory ────────────────────────────────────────────────────────────

    pub fn adjust_stock(
        &self,
        ctx: &RequestContext,
        product_id: Uuid,
        new_qty: i32,
        reason: &str,
    ) -> Result<StockMovement, DomainError> {
        self.uow
            .transaction(|tx| self.ledger.adjust(tx, ctx, product_id, new_qty, reason))
    }

    pub fn stock_movements(&self, ctx: &RequestContext, product_id: Uuid) -> Result<Vec<StockMovement>, DomainError> {
        self.uow.transaction(|tx| {
            let product = tx.find_product(product_id)?.ok_or(DomainError::NotFound("product"))?;
            match ctx.role() {
                Role::Admin | Role::System => {}
                Role::Vendor if product.vendor_id == ctx.actor.id => {}
                _ => {
                    return Err(DomainError::UnauthorizedAction(
                        "stock history is restricted to the product's vendor".to_string(),
                    ))
                }
            }
            tx.product_movements(product_id)
        })
    }

    // ── Settlement ───────────────────────────────────────────────────────────

    /// Maturation sweep. Uses the configured maturity unless overridden.
    pub fn release_matured_commissions(
        &self,
        ctx: &RequestContext,
        maturity_days: Option<i64>,
    ) -> Result<ReleaseReport, DomainError> {
        ctx.require_admin_or_system("commission release")?;
        let days = maturity_days.unwrap_or(self.commissions.maturity_days());
        let report = self
            .uow
            .transaction(|tx| self.commissions.release_pending(tx, ctx, days))?;
        if report.released > 0 || report.voided > 0 {
            log::info!(
                "Maturation sweep released {} and voided {} commissions",
                report.released,
                report.voided
            );
        }
        Ok(report)
    }

    pub fn commission_for_order(&self, ctx: &RequestContext, order_id: Uuid) -> Result<Option<Commission>, DomainError> {
        self.uow.transaction(|tx| {
            let order = tx.find_order(order_id)?.ok_or(DomainError::NotFound("order"))?;
            match ctx.role() {
                Role::Admin | Role::System => {}
                Role::Vendor if order.vendor_id == ctx.actor.id => {}
                _ => return Err(DomainError::UnauthorizedAction("commission is vendor-only".to_string())),
            }
            tx.find_commission_by_order(order_id)
        })
    }

    pub fn request_withdrawal(
        &self,
        ctx: &RequestContext,
        selection: CommissionSelection,
        bank_details: Value,
    ) -> Result<(Withdrawal, Vec<WithdrawalItem>), DomainError> {
        if ctx.role() != Role::Vendor {
            return Err(DomainError::UnauthorizedAction("only vendors can request withdrawals".to_string()));
        }
        self.uow.transaction(|tx| {
            let (withdrawal, items) = self
                .withdrawals
                .request(tx, ctx, ctx.actor.id, selection, bank_details)?;
            tx.append_event(&OutboxEvent::new(
                "Withdrawal",
                withdrawal.id,
                "WithdrawalRequested",
                json!({
                    "withdrawal_id": withdrawal.id,
                    "vendor_id": withdrawal.vendor_id,
                    "gross_amount": withdrawal.gross_amount.to_string(),
                    "fee": withdrawal.fee.to_string(),
                    "net_amount": withdrawal.net_amount.to_string(),
                    "commission_ids": items.iter().map(|i| i.commission_id).collect::<Vec<_>>(),
                }),
            ))?;
            Ok((withdrawal, items))
        })
    }

    pub fn process_withdrawal(
        &self,
        ctx: &RequestContext,
        withdrawal_id: Uuid,
        decision: WithdrawalDecision,
    ) -> Result<Withdrawal, DomainError> {
        self.uow.transaction(|tx| {
            let withdrawal = self
                .withdrawals
                .process(tx, ctx, &self.commissions, withdrawal_id, decision)?;
            tx.append_event(&OutboxEvent::new(
                "Withdrawal",
                withdrawal.id,
                "WithdrawalProcessed",
                json!({
                    "withdrawal_id": withdrawal.id,
                    "vendor_id": withdrawal.vendor_id,
                    "status": withdrawal.status.as_str(),
                    "net_amount": withdrawal.net_amount.to_string(),
                    "rejection_reason": withdrawal.rejection_reason,
                }),
            ))?;
            Ok(withdrawal)
        })
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn advance(&self, ctx: &RequestContext, order_id: Uuid, to: OrderStatus) -> Result<Order, DomainError> {
        self.uow.transaction(|tx| {
            let mut order = lock(tx, order_id)?;
            self.transition(tx, ctx, &mut order, to)?;
            Ok(order)
        })
    }

    /// Guarded status write plus its outbox event.
    fn transition(
        &self,
        tx: &mut dyn Store,
        ctx: &RequestContext,
        order: &mut Order,
        to: OrderStatus,
    ) -> Result<OrderStatus, DomainError> {
        authorize(ctx, order, to)?;
        self.write_transition(tx, ctx, order, to)
    }

    fn write_transition(
        &self,
        tx: &mut dyn Store,
        ctx: &RequestContext,
        order: &mut Order,
        to: OrderStatus,
    ) -> Result<OrderStatus, DomainError> {
        let from = order.transition_to(to, ctx.now)?;
        tx.update_order(order)?;
        tx.append_event(&OutboxEvent::order_status_changed(order.id, from, to, ctx.actor.id))?;
        log::info!("Order {} moved {} -> {} by {} {}", order.id, from, to, ctx.role(), ctx.actor.id);
        Ok(from)
    }

    fn approve_order_in(&self, tx: &mut dyn Store, ctx: &RequestContext, order: &mut Order) -> Result<(), DomainError> {
        authorize(ctx, order, OrderStatus::Approved)?;
        if order.status != OrderStatus::AwaitingApproval {
            return Err(DomainError::transition("order", order.status, OrderStatus::Approved));
        }
        if !self.gate.is_approved(tx, order)? {
            return Err(DomainError::PrescriptionNotApproved(order.id));
        }
        order.approved_at = Some(ctx.now);
        order.approved_by = Some(ctx.actor.id);
        self.write_transition(tx, ctx, order, OrderStatus::Approved)?;
        Ok(())
    }

    /// Stock commit and status write for `awaiting_payment -> paid`. Checks
    /// every line under lock before touching any, so a shortfall leaves the
    /// transaction clean.
    fn enter_paid(&self, tx: &mut dyn Store, ctx: &RequestContext, order: &mut Order) -> Result<(), DomainError> {
        if order.status != OrderStatus::AwaitingPayment {
            return Err(DomainError::transition("order", order.status, OrderStatus::Paid));
        }
        let items = tx.order_items(order.id)?;
        self.ledger.ensure_committable(tx, &items)?;
        self.ledger
            .commit_order(tx, ctx, order.id, &items)
            .map_err(|e| match e {
                // Lines were checked under lock; abort instead of flagging.
                DomainError::InsufficientStock { .. } => {
                    DomainError::Internal(format!("stock changed under lock: {}", e))
                }
                other => other,
            })?;
        order.stock_shortfall = false;
        self.write_transition(tx, ctx, order, OrderStatus::Paid)?;
        Ok(())
    }

    fn flag_shortfall(
        &self,
        tx: &mut dyn Store,
        order: &mut Order,
        product_id: Uuid,
        requested: i32,
        available: i32,
    ) -> Result<(), DomainError> {
        log::warn!(
            "Order {} paid but product {} is short ({} requested, {} available); flagged for manual resolution",
            order.id,
            product_id,
            requested,
            available
        );
        order.stock_shortfall = true;
        tx.update_order(order)?;
        tx.append_event(&OutboxEvent::new(
            "Order",
            order.id,
            "StockShortfall",
            json!({
                "order_id": order.id,
                "product_id": product_id,
                "requested": requested,
                "available": available,
            }),
        ))
    }
}

fn lock(tx: &mut dyn Store, order_id: Uuid) -> Result<Order, DomainError> {
    tx.lock_order(order_id)?.ok_or(DomainError::NotFound("order"))
}

fn append_refund_requested(tx: &mut dyn Store, payment: &Payment) -> Result<(), DomainError> {
    tx.append_event(&OutboxEvent::new(
        "Payment",
        payment.id,
        "RefundRequested",
        json!({
            "payment_id": payment.id,
            "order_id": payment.order_id,
            "gateway": payment.gateway.as_str(),
            "external_transaction_id": payment.external_transaction_id,
            "amount": payment.amount.to_string(),
        }),
    ))
}

/// Role guard for a status change requested by `ctx`.
fn authorize(ctx: &RequestContext, order: &Order, to: OrderStatus) -> Result<(), DomainError> {
    use OrderStatus::*;
    if to == Paid {
        return Err(DomainError::UnauthorizedAction(
            "orders become paid only through a confirmed payment".to_string(),
        ));
    }
    let actor = ctx.actor;
    let permitted = match actor.role {
        Role::Admin => true,
        Role::Client => {
            order.client_id == actor.id
                && match to {
                    Cancelled => order.status.is_client_cancellable(),
                    AwaitingApproval => order.status == AwaitingPrescription,
                    _ => false,
                }
        }
        Role::Vendor => {
            order.vendor_id == actor.id
                && match to {
                    Cancelled => order.status.is_vendor_cancellable(),
                    AwaitingPayment | PreparingShipment | Shipped | Delivered => true,
                    _ => false,
                }
        }
        Role::Doctor | Role::System => false,
    };
    if permitted {
        Ok(())
    } else {
        Err(DomainError::UnauthorizedAction(format!(
            "{} {} may not move order {} from {} to {}",
            actor.role, actor.id, order.id, order.status, to
        )))
    }
}

fn authorize_view(ctx: &RequestContext, order: &Order) -> Result<(), DomainError> {
    let actor = ctx.actor;
    let permitted = match actor.role {
        Role::Admin | Role::System => true,
        Role::Client => order.client_id == actor.id,
        Role::Vendor => order.vendor_id == actor.id,
        Role::Doctor => order.doctor_id == Some(actor.id),
    };
    if permitted {
        Ok(())
    } else {
        Err(DomainError::UnauthorizedAction(format!("order {} is not visible to {}", order.id, actor.role)))
    }
}
