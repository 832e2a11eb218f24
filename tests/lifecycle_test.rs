mod common;

use chrono::Duration;
use serde_json::json;

use common::{attempt, dec, event, order_awaiting_payment, policy, upload, Marketplace};
use rx_fulfillment::application::prescription_gate::PrescriptionGate;
use rx_fulfillment::application::{OrderLifecycle, ReconcileOutcome, SettlementPolicy, ShipmentDetails};
use rx_fulfillment::domain::commission::CommissionStatus;
use rx_fulfillment::domain::context::RequestContext;
use rx_fulfillment::domain::errors::DomainError;
use rx_fulfillment::domain::inventory::MovementType;
use rx_fulfillment::domain::order::{CheckoutLine, OrderStatus};
use rx_fulfillment::domain::payment::PaymentStatus;
use rx_fulfillment::domain::prescription::PrescriptionStatus;
use rx_fulfillment::domain::ports::UnitOfWork;
use rx_fulfillment::domain::withdrawal::{CommissionSelection, WithdrawalDecision, WithdrawalStatus};
use rx_fulfillment::infrastructure::InMemoryUnitOfWork;

fn shipment() -> ShipmentDetails {
    ShipmentDetails {
        tracking_code: "BR123456789SP".to_string(),
        carrier: "Correios".to_string(),
    }
}

#[test]
fn prescription_order_runs_from_checkout_to_payout() {
    let (m, state) = Marketplace::new();
    let svc = Marketplace::lifecycle(state);

    let view = svc.checkout(&m.client, m.cart(m.rx_product, 1)).unwrap();
    let order_id = view.order.id;
    assert_eq!(view.order.status, OrderStatus::AwaitingPrescription);
    assert_eq!(view.order.total, dec("100.00"));
    assert!(view.order.code.starts_with("RX-"));

    let prescription = svc.submit_prescription(&m.client, order_id, upload()).unwrap();
    assert_eq!(prescription.status, PrescriptionStatus::Pending);
    let approved = svc.approve_prescription(&m.admin, prescription.id).unwrap();
    assert_eq!(approved.into_inner().status, OrderStatus::Approved);

    svc.request_payment(&m.vendor, order_id).unwrap();
    svc.register_payment(&m.client, order_id, attempt("mp-1001")).unwrap();
    let outcome = svc.apply_gateway_event(event("mp-1001", "approved")).unwrap();
    assert!(matches!(outcome, ReconcileOutcome::OrderPaid { .. }));

    let snapshot = svc.unit_of_work().snapshot().unwrap();
    assert_eq!(snapshot.product(m.rx_product).unwrap().stock_quantity, 9);

    svc.start_preparation(&m.vendor, order_id).unwrap();
    let (shipped, commission) = svc.ship(&m.vendor, order_id, shipment()).unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert_eq!(shipped.tracking_code.as_deref(), Some("BR123456789SP"));
    assert_eq!(commission.amount, dec("10.00"));
    assert_eq!(commission.status, CommissionStatus::Pending);
    assert_eq!(commission.doctor_id, Some(m.doctor_id));
    assert_eq!(commission.available_at - commission.created_at, Duration::days(30));

    svc.deliver(&m.vendor, order_id).unwrap();

    let early = RequestContext::system().at(commission.created_at + Duration::days(29));
    assert_eq!(svc.release_matured_commissions(&early, None).unwrap().released, 0);
    let mature = RequestContext::system().at(commission.created_at + Duration::days(31));
    assert_eq!(svc.release_matured_commissions(&mature, None).unwrap().released, 1);

    let (withdrawal, items) = svc
        .request_withdrawal(&m.vendor, CommissionSelection::AllAvailable, json!({"pix_key": "vendor@example.com"}))
        .unwrap();
    assert_eq!(withdrawal.gross_amount, dec("10.00"));
    assert_eq!(withdrawal.fee, dec("5.00"));
    assert_eq!(withdrawal.net_amount, dec("5.00"));
    assert_eq!(items.len(), 1);

    let processed = svc
        .process_withdrawal(&m.admin, withdrawal.id, WithdrawalDecision::Processed)
        .unwrap();
    assert_eq!(processed.status, WithdrawalStatus::Processed);
    let commission = svc.commission_for_order(&m.vendor, order_id).unwrap().unwrap();
    assert_eq!(commission.status, CommissionStatus::Paid);
    assert!(commission.paid_at.is_some());
}

#[test]
fn over_the_counter_order_skips_the_prescription_gate() {
    let (m, state) = Marketplace::new();
    let svc = Marketplace::lifecycle(state);

    let view = svc.checkout(&m.client, m.cart(m.otc_product, 2)).unwrap();
    assert_eq!(view.order.status, OrderStatus::Approved);
    assert_eq!(view.order.total, dec("50.00"));
    assert!(view.order.approved_at.is_some());

    let err = svc.submit_prescription(&m.client, view.order.id, upload()).unwrap_err();
    assert!(matches!(err, DomainError::UnauthorizedAction(_)));
    let err = svc.submit_prescription(&m.admin, view.order.id, upload()).unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
}

#[test]
fn redelivered_paid_webhook_commits_stock_once() {
    let (m, state) = Marketplace::new();
    let svc = Marketplace::lifecycle(state);
    let order_id = order_awaiting_payment(&svc, &m, m.rx_product, 3, "mp-2001");

    let first = svc.apply_gateway_event(event("mp-2001", "approved")).unwrap();
    assert!(matches!(first, ReconcileOutcome::OrderPaid { .. }));
    let events_after_first = svc.unit_of_work().snapshot().unwrap().outbox().len();

    let second = svc.apply_gateway_event(event("mp-2001", "approved")).unwrap();
    assert!(second.is_noop());

    let snapshot = svc.unit_of_work().snapshot().unwrap();
    assert_eq!(snapshot.product(m.rx_product).unwrap().stock_quantity, 7);
    let commits: Vec<_> = snapshot
        .movements()
        .iter()
        .filter(|mv| mv.order_id == Some(order_id) && mv.movement_type == MovementType::Commit)
        .collect();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].delta, -3);
    assert_eq!(snapshot.outbox().len(), events_after_first);
}

#[test]
fn late_pending_notification_does_not_undo_payment() {
    let (m, state) = Marketplace::new();
    let svc = Marketplace::lifecycle(state);
    let order_id = order_awaiting_payment(&svc, &m, m.otc_product, 1, "mp-2101");

    let authorized = svc.apply_gateway_event(event("mp-2101", "authorized")).unwrap();
    assert!(matches!(authorized, ReconcileOutcome::Updated { status: PaymentStatus::Authorized, .. }));
    let stale = svc.apply_gateway_event(event("mp-2101", "in_process")).unwrap();
    assert!(stale.is_noop());

    svc.apply_gateway_event(event("mp-2101", "approved")).unwrap();
    let err = svc.apply_gateway_event(event("mp-2101", "rejected")).unwrap_err();
    assert!(matches!(err, DomainError::PaymentStatusRegression { .. }));

    let order = svc.get_order(&m.client, order_id).unwrap().order;
    assert_eq!(order.status, OrderStatus::Paid);
    let payments = svc.order_payments(&m.client, order_id).unwrap();
    assert_eq!(payments[0].status, PaymentStatus::Paid);
}

#[test]
fn unknown_transaction_is_reported() {
    let (_m, state) = Marketplace::new();
    let svc = Marketplace::lifecycle(state);
    let err = svc.apply_gateway_event(event("mp-missing", "approved")).unwrap_err();
    assert!(matches!(err, DomainError::UnknownTransaction(_)));
}

#[test]
fn cancelling_a_paid_order_restores_stock_and_requests_refund() {
    let (m, state) = Marketplace::new();
    let svc = Marketplace::lifecycle(state);
    let order_id = order_awaiting_payment(&svc, &m, m.rx_product, 2, "mp-3001");
    svc.apply_gateway_event(event("mp-3001", "approved")).unwrap();

    let err = svc.cancel(&m.client, order_id, None).unwrap_err();
    assert!(matches!(err, DomainError::UnauthorizedAction(_)));

    let cancelled = svc
        .cancel(&m.admin, order_id, Some("customer changed their mind".to_string()))
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by, Some(m.admin.actor.id));

    let snapshot = svc.unit_of_work().snapshot().unwrap();
    assert_eq!(snapshot.product(m.rx_product).unwrap().stock_quantity, 10);
    assert_eq!(snapshot.payments()[0].status, PaymentStatus::RefundPending);
    assert!(snapshot.outbox().iter().any(|e| e.event_type == "RefundRequested"));

    let err = svc.cancel(&m.admin, order_id, None).unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
}

#[test]
fn payment_for_a_cancelled_order_is_sent_back() {
    let (m, state) = Marketplace::new();
    let svc = Marketplace::lifecycle(state);
    let order_id = order_awaiting_payment(&svc, &m, m.otc_product, 1, "mp-3101");
    svc.cancel(&m.vendor, order_id, None).unwrap();

    let outcome = svc.apply_gateway_event(event("mp-3101", "approved")).unwrap();
    assert!(matches!(outcome, ReconcileOutcome::RefundRequested { .. }));

    let snapshot = svc.unit_of_work().snapshot().unwrap();
    assert_eq!(snapshot.payments()[0].status, PaymentStatus::RefundPending);
    assert_eq!(snapshot.product(m.otc_product).unwrap().stock_quantity, 10);
}

#[test]
fn stock_shortfall_is_flagged_and_retried_after_restock() {
    let (m, state) = Marketplace::with_stock(10, 1);
    let svc = Marketplace::lifecycle(state);
    let first = order_awaiting_payment(&svc, &m, m.otc_product, 1, "mp-4001");
    let second = order_awaiting_payment(&svc, &m, m.otc_product, 1, "mp-4002");

    svc.apply_gateway_event(event("mp-4001", "approved")).unwrap();
    let outcome = svc.apply_gateway_event(event("mp-4002", "approved")).unwrap();
    assert!(matches!(outcome, ReconcileOutcome::StockShortfall { .. }));

    let order = svc.get_order(&m.admin, second).unwrap().order;
    assert_eq!(order.status, OrderStatus::AwaitingPayment);
    assert!(order.stock_shortfall);
    let err = svc.retry_payment_confirmation(&m.admin, second).unwrap_err();
    assert!(matches!(err, DomainError::InsufficientStock { .. }));

    svc.adjust_stock(&m.admin, m.otc_product, 1, "supplier delivery").unwrap();
    let paid = svc.retry_payment_confirmation(&m.admin, second).unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert!(!paid.stock_shortfall);

    let snapshot = svc.unit_of_work().snapshot().unwrap();
    assert_eq!(snapshot.product(m.otc_product).unwrap().stock_quantity, 0);
    assert_eq!(svc.get_order(&m.admin, first).unwrap().order.status, OrderStatus::Paid);
}

#[test]
fn rejected_prescription_sends_order_back_for_a_new_document() {
    let (m, state) = Marketplace::new();
    let svc = Marketplace::lifecycle(state);
    let order_id = svc.checkout(&m.client, m.cart(m.rx_product, 1)).unwrap().order.id;
    let first = svc.submit_prescription(&m.client, order_id, upload()).unwrap();

    let err = svc.approve_prescription(&m.client, first.id).unwrap_err();
    assert!(matches!(err, DomainError::UnauthorizedAction(_)));
    let err = svc.request_payment(&m.vendor, order_id).unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

    let order = svc.reject_prescription(&m.admin, first.id, "expired prescription").unwrap();
    assert_eq!(order.status, OrderStatus::AwaitingPrescription);

    let second = svc.submit_prescription(&m.client, order_id, upload()).unwrap();
    let err = svc.approve_prescription(&m.admin, first.id).unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    assert!(!svc.approve_prescription(&m.admin, second.id).unwrap().is_noop());
    assert!(svc.approve_prescription(&m.admin, second.id).unwrap().is_noop());
    assert_eq!(svc.get_order(&m.client, order_id).unwrap().order.status, OrderStatus::Approved);
}

#[test]
fn checkout_refuses_more_than_is_in_stock() {
    let (m, state) = Marketplace::with_stock(2, 2);
    let svc = Marketplace::lifecycle(state);
    let err = svc.checkout(&m.client, m.cart(m.rx_product, 3)).unwrap_err();
    assert!(matches!(
        err,
        DomainError::InsufficientStock { requested: 3, available: 2, .. }
    ));
    let err = svc.checkout(&m.vendor, m.cart(m.rx_product, 1)).unwrap_err();
    assert!(matches!(err, DomainError::UnauthorizedAction(_)));
}

#[test]
fn cancelling_a_shipped_order_voids_its_pending_commission() {
    let (m, state) = Marketplace::new();
    let svc = Marketplace::lifecycle(state);
    let order_id = order_awaiting_payment(&svc, &m, m.rx_product, 1, "mp-5001");
    svc.apply_gateway_event(event("mp-5001", "approved")).unwrap();
    svc.start_preparation(&m.vendor, order_id).unwrap();
    let (_, commission) = svc.ship(&m.vendor, order_id, shipment()).unwrap();

    let err = svc.cancel(&m.vendor, order_id, None).unwrap_err();
    assert!(matches!(err, DomainError::UnauthorizedAction(_)));
    svc.cancel(&m.admin, order_id, Some("lost in transit".to_string())).unwrap();

    let voided = svc.commission_for_order(&m.admin, order_id).unwrap().unwrap();
    assert_eq!(voided.id, commission.id);
    assert_eq!(voided.status, CommissionStatus::Voided);

    let later = RequestContext::system().at(commission.created_at + Duration::days(60));
    let report = svc.release_matured_commissions(&later, None).unwrap();
    assert_eq!(report.released, 0);

    let snapshot = svc.unit_of_work().snapshot().unwrap();
    assert_eq!(snapshot.product(m.rx_product).unwrap().stock_quantity, 9);

    let err = svc
        .request_withdrawal(&m.vendor, CommissionSelection::AllAvailable, json!({}))
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidInput(_)));
}

#[test]
fn rejected_withdrawal_frees_commissions_for_a_new_request() {
    let (m, state) = Marketplace::new();
    let svc = Marketplace::lifecycle(state);
    let order_id = order_awaiting_payment(&svc, &m, m.rx_product, 2, "mp-6001");
    svc.apply_gateway_event(event("mp-6001", "approved")).unwrap();
    svc.start_preparation(&m.vendor, order_id).unwrap();
    let (_, commission) = svc.ship(&m.vendor, order_id, shipment()).unwrap();
    assert_eq!(commission.amount, dec("20.00"));

    let mature = RequestContext::system().at(commission.created_at + Duration::days(30));
    svc.release_matured_commissions(&mature, None).unwrap();

    let selection = CommissionSelection::Ids(vec![commission.id]);
    let (withdrawal, _) = svc.request_withdrawal(&m.vendor, selection.clone(), json!({})).unwrap();
    let err = svc.request_withdrawal(&m.vendor, selection.clone(), json!({})).unwrap_err();
    assert!(matches!(err, DomainError::InvalidCommissionState { .. }));

    let rejected = svc
        .process_withdrawal(
            &m.admin,
            withdrawal.id,
            WithdrawalDecision::Rejected {
                reason: "invalid bank details".to_string(),
            },
        )
        .unwrap();
    assert_eq!(rejected.status, WithdrawalStatus::Rejected);

    let (again, _) = svc.request_withdrawal(&m.vendor, selection, json!({})).unwrap();
    assert_eq!(again.net_amount, dec("15.00"));
}

#[test]
fn order_approval_waits_for_an_approved_prescription() {
    let (m, state) = Marketplace::new();
    let svc = Marketplace::lifecycle(state);
    let order_id = svc.checkout(&m.client, m.cart(m.rx_product, 1)).unwrap().order.id;
    let prescription = svc.submit_prescription(&m.client, order_id, upload()).unwrap();

    let err = svc.approve_order(&m.admin, order_id).unwrap_err();
    assert!(matches!(err, DomainError::PrescriptionNotApproved(id) if id == order_id));
    let err = svc.approve_order(&m.client, order_id).unwrap_err();
    assert!(matches!(err, DomainError::UnauthorizedAction(_)));
    let view = svc.get_order(&m.admin, order_id).unwrap();
    assert_eq!(view.order.status, OrderStatus::AwaitingApproval);
    assert_eq!(view.order.approved_at, None);

    // Document approved on its own, order left behind.
    svc.unit_of_work()
        .transaction(|tx| PrescriptionGate::new().approve(tx, &m.admin, prescription.id))
        .unwrap();
    let approved = svc.approve_order(&m.admin, order_id).unwrap();
    assert_eq!(approved.status, OrderStatus::Approved);
    assert_eq!(approved.approved_by, Some(m.admin.actor.id));

    let err = svc.approve_order(&m.admin, order_id).unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
}

#[test]
fn out_of_range_release_window_is_refused_and_the_store_stays_usable() {
    let (m, state) = Marketplace::new();
    let svc = Marketplace::lifecycle(state);

    for days in [-1, 3651, 1_000_000_000_000_000, i64::MAX] {
        let err = svc.release_matured_commissions(&m.admin, Some(days)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)), "{} days: {:?}", days, err);
    }

    let view = svc.checkout(&m.client, m.cart(m.otc_product, 1)).unwrap();
    assert_eq!(view.order.status, OrderStatus::Approved);
    assert_eq!(svc.release_matured_commissions(&m.admin, Some(0)).unwrap().released, 0);
}

#[test]
fn shipping_with_an_unrepresentable_maturity_fails_without_side_effects() {
    let (m, state) = Marketplace::new();
    let svc = OrderLifecycle::new(
        InMemoryUnitOfWork::with_state(state),
        SettlementPolicy {
            maturity_days: 1_000_000_000_000_000,
            ..policy()
        },
    );
    let order_id = order_awaiting_payment(&svc, &m, m.otc_product, 1, "mp-9001");
    svc.apply_gateway_event(event("mp-9001", "approved")).unwrap();
    svc.start_preparation(&m.vendor, order_id).unwrap();

    let err = svc.ship(&m.vendor, order_id, shipment()).unwrap_err();
    assert!(matches!(err, DomainError::InvalidInput(_)));

    let view = svc.get_order(&m.vendor, order_id).unwrap();
    assert_eq!(view.order.status, OrderStatus::PreparingShipment);
    assert_eq!(svc.commission_for_order(&m.vendor, order_id).unwrap(), None);
}

#[test]
fn repeated_checkout_lines_merge_without_overflowing() {
    let (m, state) = Marketplace::with_stock(10, 10);
    let svc = Marketplace::lifecycle(state);

    let mut cart = m.cart(m.otc_product, i32::MAX);
    cart.lines.push(CheckoutLine {
        product_id: m.otc_product,
        quantity: 2,
    });
    let err = svc.checkout(&m.client, cart).unwrap_err();
    assert!(matches!(err, DomainError::InvalidInput(_)));

    let mut cart = m.cart(m.otc_product, 3);
    cart.lines.push(CheckoutLine {
        product_id: m.otc_product,
        quantity: 2,
    });
    let view = svc.checkout(&m.client, cart).unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 5);
    assert_eq!(view.order.total, dec("125.00"));
}
