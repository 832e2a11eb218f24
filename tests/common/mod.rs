#![allow(dead_code)]

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use rx_fulfillment::application::{OrderLifecycle, SettlementPolicy};
use rx_fulfillment::domain::commission::{DoctorProfile, VendorProfile};
use rx_fulfillment::domain::context::{Actor, RequestContext, Role};
use rx_fulfillment::domain::inventory::Product;
use rx_fulfillment::domain::order::{CheckoutLine, CheckoutRequest, ShippingAddress};
use rx_fulfillment::domain::payment::{Gateway, GatewayEvent, PaymentAttempt};
use rx_fulfillment::domain::prescription::{PrescriberIdentity, PrescriptionUpload};
use rx_fulfillment::domain::withdrawal::FeePolicy;
use rx_fulfillment::infrastructure::{InMemoryUnitOfWork, MemoryState};

pub fn dec(s: &str) -> BigDecimal {
    s.parse().unwrap()
}

pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub fn policy() -> SettlementPolicy {
    SettlementPolicy {
        maturity_days: 30,
        fee_policy: FeePolicy {
            fixed_fee: dec("5.00"),
            fee_rate: dec("0.02"),
        },
    }
}

/// A vendor with a 10% commission, one prescription product and one
/// over-the-counter product, a registered doctor, plus the actors that use
/// them.
pub struct Marketplace {
    pub vendor_id: Uuid,
    pub rx_product: Uuid,
    pub otc_product: Uuid,
    pub doctor_id: Uuid,
    pub client: RequestContext,
    pub vendor: RequestContext,
    pub admin: RequestContext,
}

impl Marketplace {
    pub fn new() -> (Self, MemoryState) {
        Self::with_stock(10, 10)
    }

    pub fn with_stock(rx_stock: i32, otc_stock: i32) -> (Self, MemoryState) {
        let vendor_id = Uuid::new_v4();
        let doctor_id = Uuid::new_v4();
        let rx_product = Uuid::new_v4();
        let otc_product = Uuid::new_v4();

        let mut state = MemoryState::default();
        state.add_vendor(VendorProfile {
            vendor_id,
            commission_percent: dec("10"),
            active: true,
        });
        state.add_doctor(DoctorProfile {
            doctor_id,
            name: "Dra. Helena Costa".to_string(),
            registration: "CRM 123456".to_string(),
            jurisdiction: "SP".to_string(),
            platform_registered: true,
            approved: true,
        });
        state.add_product(Product {
            id: rx_product,
            vendor_id,
            name: "Canabidiol 200mg/ml 30ml".to_string(),
            price: dec("100.00"),
            requires_prescription: true,
            stock_quantity: rx_stock,
        });
        state.add_product(Product {
            id: otc_product,
            vendor_id,
            name: "Óleo de semente de cânhamo".to_string(),
            price: dec("25.00"),
            requires_prescription: false,
            stock_quantity: otc_stock,
        });

        let market = Self {
            vendor_id,
            rx_product,
            otc_product,
            doctor_id,
            client: RequestContext::new(Actor::new(Uuid::new_v4(), Role::Client)),
            vendor: RequestContext::new(Actor::new(vendor_id, Role::Vendor)),
            admin: RequestContext::new(Actor::new(Uuid::new_v4(), Role::Admin)),
        };
        (market, state)
    }

    pub fn lifecycle(state: MemoryState) -> OrderLifecycle<InMemoryUnitOfWork> {
        OrderLifecycle::new(InMemoryUnitOfWork::with_state(state), policy())
    }

    pub fn cart(&self, product_id: Uuid, quantity: i32) -> CheckoutRequest {
        CheckoutRequest {
            doctor_id: Some(self.doctor_id),
            lines: vec![CheckoutLine { product_id, quantity }],
            discount: BigDecimal::from(0),
            payment_method: "pix".to_string(),
            shipping_address: address(),
        }
    }
}

pub fn address() -> ShippingAddress {
    ShippingAddress {
        recipient: "Ana Souza".to_string(),
        street: "Rua Augusta".to_string(),
        number: "1500".to_string(),
        complement: Some("apto 42".to_string()),
        district: "Consolação".to_string(),
        city: "São Paulo".to_string(),
        state: "SP".to_string(),
        postal_code: "01304-001".to_string(),
        country: "BR".to_string(),
    }
}

pub fn upload() -> PrescriptionUpload {
    PrescriptionUpload {
        file_reference: "s3://prescriptions/rx-0001.pdf".to_string(),
        prescriber: PrescriberIdentity {
            name: "Dra. Helena Costa".to_string(),
            registration: "CRM 123456".to_string(),
            jurisdiction: "SP".to_string(),
        },
    }
}

pub fn attempt(tx_id: &str) -> PaymentAttempt {
    PaymentAttempt {
        gateway: Gateway::MercadoPago,
        method: "pix".to_string(),
        external_transaction_id: tx_id.to_string(),
        raw_payload: json!({ "id": tx_id }),
    }
}

pub fn event(tx_id: &str, status: &str) -> GatewayEvent {
    GatewayEvent {
        gateway: Gateway::MercadoPago,
        external_transaction_id: tx_id.to_string(),
        gateway_status: status.to_string(),
        raw_payload: json!({ "id": tx_id, "status": status }),
    }
}

/// Drives a prescription order from checkout to `awaiting_payment` with a
/// pending payment registered under `tx_id`.
pub fn order_awaiting_payment(
    svc: &OrderLifecycle<InMemoryUnitOfWork>,
    m: &Marketplace,
    product_id: Uuid,
    quantity: i32,
    tx_id: &str,
) -> Uuid {
    let view = svc.checkout(&m.client, m.cart(product_id, quantity)).unwrap();
    let order_id = view.order.id;
    if view.order.prescription_id.is_none() && product_id == m.rx_product {
        let prescription = svc.submit_prescription(&m.client, order_id, upload()).unwrap();
        svc.approve_prescription(&m.admin, prescription.id).unwrap();
    }
    svc.request_payment(&m.vendor, order_id).unwrap();
    svc.register_payment(&m.client, order_id, attempt(tx_id)).unwrap();
    order_id
}
