pub mod commission_engine;
pub mod inventory_ledger;
pub mod order_lifecycle;
pub mod payment_reconciler;
pub mod prescription_gate;
pub mod withdrawal_consolidator;

pub use order_lifecycle::{OrderLifecycle, ReconcileOutcome, SettlementPolicy, ShipmentDetails};
