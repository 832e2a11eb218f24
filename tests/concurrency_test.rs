mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Duration;
use serde_json::json;

use common::{event, order_awaiting_payment, Marketplace};
use rx_fulfillment::application::inventory_ledger::InventoryLedger;
use rx_fulfillment::application::{ReconcileOutcome, ShipmentDetails};
use rx_fulfillment::domain::ports::UnitOfWork;
use rx_fulfillment::InMemoryUnitOfWork;
use rx_fulfillment::domain::context::RequestContext;
use rx_fulfillment::domain::errors::DomainError;
use rx_fulfillment::domain::withdrawal::CommissionSelection;

/// Runs `f(i)` on `n` threads released at the same moment.
fn race<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let barrier = Arc::new(Barrier::new(n));
    let handles: Vec<_> = (0..n)
        .map(|i| {
            let f = Arc::clone(&f);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                f(i)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn two_commits_of_the_last_unit_leave_stock_at_zero() {
    let (m, state) = Marketplace::with_stock(1, 1);
    let uow = Arc::new(InMemoryUnitOfWork::with_state(state));
    let product_id = m.rx_product;

    let shared = Arc::clone(&uow);
    let results = race(2, move |_| {
        let ledger = InventoryLedger::new();
        let ctx = RequestContext::system();
        shared.transaction(|tx| ledger.commit(tx, &ctx, product_id, 1, None, "race"))
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(err, DomainError::InsufficientStock { available: 0, .. }));
    assert_eq!(uow.snapshot().unwrap().product(product_id).unwrap().stock_quantity, 0);
}

#[test]
fn last_unit_goes_to_exactly_one_paid_order() {
    let (m, state) = Marketplace::with_stock(10, 1);
    let svc = Arc::new(Marketplace::lifecycle(state));
    let buyers = 8;
    for i in 0..buyers {
        order_awaiting_payment(&svc, &m, m.otc_product, 1, &format!("mp-race-{}", i));
    }

    let shared = Arc::clone(&svc);
    let outcomes = race(buyers, move |i| {
        shared
            .apply_gateway_event(event(&format!("mp-race-{}", i), "approved"))
            .unwrap()
    });

    let paid = outcomes
        .iter()
        .filter(|o| matches!(o, ReconcileOutcome::OrderPaid { .. }))
        .count();
    let short = outcomes
        .iter()
        .filter(|o| matches!(o, ReconcileOutcome::StockShortfall { .. }))
        .count();
    assert_eq!(paid, 1);
    assert_eq!(short, buyers - 1);

    let snapshot = svc.unit_of_work().snapshot().unwrap();
    assert_eq!(snapshot.product(m.otc_product).unwrap().stock_quantity, 0);
    assert_eq!(snapshot.movements().len(), 1);
}

#[test]
fn simultaneous_redeliveries_apply_once() {
    let (m, state) = Marketplace::new();
    let svc = Arc::new(Marketplace::lifecycle(state));
    order_awaiting_payment(&svc, &m, m.rx_product, 4, "mp-dup-1");

    let shared = Arc::clone(&svc);
    let outcomes = race(6, move |_| shared.apply_gateway_event(event("mp-dup-1", "approved")).unwrap());

    assert_eq!(outcomes.iter().filter(|o| !o.is_noop()).count(), 1);
    let snapshot = svc.unit_of_work().snapshot().unwrap();
    assert_eq!(snapshot.product(m.rx_product).unwrap().stock_quantity, 6);
}

#[test]
fn concurrent_shipments_create_a_single_commission() {
    let (m, state) = Marketplace::new();
    let svc = Arc::new(Marketplace::lifecycle(state));
    let order_id = order_awaiting_payment(&svc, &m, m.otc_product, 2, "mp-ship-1");
    svc.apply_gateway_event(event("mp-ship-1", "approved")).unwrap();
    svc.start_preparation(&m.vendor, order_id).unwrap();

    let shared = Arc::clone(&svc);
    let vendor = m.vendor;
    let results = race(4, move |i| {
        shared.ship(
            &vendor,
            order_id,
            ShipmentDetails {
                tracking_code: format!("BR00000000{}SP", i),
                carrier: "Correios".to_string(),
            },
        )
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }), "{:?}", err);
    }
    assert_eq!(svc.unit_of_work().snapshot().unwrap().commissions().len(), 1);
}

#[test]
fn a_commission_joins_only_one_withdrawal() {
    let (m, state) = Marketplace::new();
    let svc = Arc::new(Marketplace::lifecycle(state));
    let order_id = order_awaiting_payment(&svc, &m, m.rx_product, 1, "mp-wd-1");
    svc.apply_gateway_event(event("mp-wd-1", "approved")).unwrap();
    svc.start_preparation(&m.vendor, order_id).unwrap();
    let (_, commission) = svc
        .ship(
            &m.vendor,
            order_id,
            ShipmentDetails {
                tracking_code: "BR999999999SP".to_string(),
                carrier: "Correios".to_string(),
            },
        )
        .unwrap();
    let sweep = RequestContext::system().at(commission.created_at + Duration::days(31));
    svc.release_matured_commissions(&sweep, None).unwrap();

    let shared = Arc::clone(&svc);
    let vendor = m.vendor;
    let commission_id = commission.id;
    let results = race(5, move |i| {
        let selection = if i % 2 == 0 {
            CommissionSelection::AllAvailable
        } else {
            CommissionSelection::Ids(vec![commission_id])
        };
        shared.request_withdrawal(&vendor, selection, json!({}))
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let snapshot = svc.unit_of_work().snapshot().unwrap();
    assert_eq!(snapshot.withdrawal_item_rows().len(), 1);
    assert_eq!(snapshot.withdrawal_item_rows()[0].commission_id, commission_id);
}
