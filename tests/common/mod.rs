#![allow(dead_code)]

use {
    axum::http::HeaderMap,
    chrono::Utc,
    hmac::{Hmac, Mac},
    pay_ledger::config::EngineConfig,
    pay_ledger::domain::event::Gateway,
    pay_ledger::domain::ids::OrderId,
    pay_ledger::domain::money::{Currency, Money, MoneyAmount},
    pay_ledger::domain::payment::{Payment, PaymentMethod},
    pay_ledger::infra::memory::MemoryStore,
    pay_ledger::services::engine::{
        CreatePayment, NotificationSink, OrderCollaborator, PaymentEngine,
    },
    sha2::Sha256,
    std::sync::{Arc, Mutex},
};

pub const STRIPE_SECRET: &str = "whsec_test";
pub const RAZORPAY_SECRET: &str = "rzp_test";
pub const PAYPAL_SECRET: &str = "pp_test";
pub const PAYPAL_WEBHOOK_ID: &str = "wh_test";

/// Order collaborator that records every call for assertions.
#[derive(Default)]
pub struct RecordingOrders {
    pub paid: Mutex<Vec<String>>,
    pub failed: Mutex<Vec<(String, String)>>,
}

#[async_trait::async_trait]
impl OrderCollaborator for RecordingOrders {
    async fn mark_paid(&self, order_id: &OrderId) -> Result<(), String> {
        self.paid.lock().unwrap().push(order_id.as_str().to_string());
        Ok(())
    }

    async fn mark_payment_failed(&self, order_id: &OrderId, reason: &str) -> Result<(), String> {
        self.failed
            .lock()
            .unwrap()
            .push((order_id.as_str().to_string(), reason.to_string()));
        Ok(())
    }
}

pub struct SilentSink;

#[async_trait::async_trait]
impl NotificationSink for SilentSink {
    async fn notify(&self, _payment: &Payment, _event: &str) {}
}

pub struct TestHarness {
    pub engine: Arc<PaymentEngine>,
    pub store: Arc<MemoryStore>,
    pub orders: Arc<RecordingOrders>,
}

pub fn harness() -> TestHarness {
    harness_with(EngineConfig::default())
}

pub fn harness_with(config: EngineConfig) -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let orders = Arc::new(RecordingOrders::default());
    let engine = Arc::new(PaymentEngine::new(
        store.clone(),
        orders.clone(),
        Arc::new(SilentSink),
        config,
    ));
    TestHarness {
        engine,
        store,
        orders,
    }
}

/// Engine whose PENDING payments are already past their TTL.
pub fn expired_harness() -> TestHarness {
    let mut config = EngineConfig::default();
    config.policy.pending_ttl_secs = 0;
    harness_with(config)
}

pub fn usd(cents: i64) -> Money {
    Money::new(MoneyAmount::new(cents).unwrap(), Currency::Usd)
}

pub fn create_request(order_id: &str, cents: i64, gateway: Gateway, key: &str) -> CreatePayment {
    CreatePayment {
        order_id: OrderId::new(order_id).unwrap(),
        money: usd(cents),
        gateway,
        method: PaymentMethod::Card,
        gateway_payment_id: Some(key.to_string()),
        provider_txn_id: None,
        actor: "test".into(),
    }
}

pub async fn create_payment(
    harness: &TestHarness,
    order_id: &str,
    cents: i64,
    gateway: Gateway,
    key: &str,
) -> Payment {
    harness
        .engine
        .create_payment(create_request(order_id, cents, gateway, key))
        .await
        .unwrap()
}

// ── webhook signing helpers ────────────────────────────────────────────

fn hmac_hex(secret: &str, message: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("any key length works");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn stripe_headers(body: &str) -> HeaderMap {
    let ts = Utc::now().timestamp();
    let sig = hmac_hex(STRIPE_SECRET, &format!("{ts}.{body}"));
    let mut headers = HeaderMap::new();
    headers.insert(
        "Stripe-Signature",
        format!("t={ts},v1={sig}").parse().unwrap(),
    );
    headers
}

pub fn stripe_pi_body(event_id: &str, event_type: &str, pi: &str, amount: i64) -> String {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": { "object": {
            "object": "payment_intent",
            "id": pi,
            "amount": amount,
            "currency": "usd",
        }}
    })
    .to_string()
}

pub fn stripe_refund_body(
    event_id: &str,
    event_type: &str,
    refund_id: &str,
    pi: &str,
    amount: i64,
) -> String {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": { "object": {
            "object": "refund",
            "id": refund_id,
            "payment_intent": pi,
            "amount": amount,
            "currency": "usd",
            "reason": "requested_by_customer",
        }}
    })
    .to_string()
}

pub fn stripe_dispute_body(
    event_id: &str,
    dispute_id: &str,
    pi: &str,
    amount: i64,
) -> String {
    serde_json::json!({
        "id": event_id,
        "type": "charge.dispute.created",
        "data": { "object": {
            "object": "dispute",
            "id": dispute_id,
            "payment_intent": pi,
            "amount": amount,
            "currency": "usd",
            "reason": "fraudulent",
        }}
    })
    .to_string()
}

pub fn razorpay_headers(body: &str, event_id: &str) -> HeaderMap {
    let sig = hmac_hex(RAZORPAY_SECRET, body);
    let mut headers = HeaderMap::new();
    headers.insert("X-Razorpay-Signature", sig.parse().unwrap());
    headers.insert("X-Razorpay-Event-Id", event_id.parse().unwrap());
    headers
}

pub fn razorpay_payment_body(event: &str, payment_id: &str, amount: i64) -> String {
    serde_json::json!({
        "event": event,
        "payload": { "payment": { "entity": {
            "id": payment_id,
            "amount": amount,
            "currency": "INR",
        }}}
    })
    .to_string()
}

pub fn paypal_headers(body: &str) -> HeaderMap {
    let transmission_id = "tx-1";
    let transmission_time = "2026-01-01T00:00:00Z";
    let sig = hmac_hex(
        PAYPAL_SECRET,
        &format!("{transmission_id}|{transmission_time}|{PAYPAL_WEBHOOK_ID}|{body}"),
    );
    let mut headers = HeaderMap::new();
    headers.insert("Paypal-Transmission-Id", transmission_id.parse().unwrap());
    headers.insert(
        "Paypal-Transmission-Time",
        transmission_time.parse().unwrap(),
    );
    headers.insert("Paypal-Transmission-Sig", sig.parse().unwrap());
    headers
}

pub fn paypal_capture_body(event_id: &str, event_type: &str, order_id: &str, value: &str) -> String {
    serde_json::json!({
        "id": event_id,
        "event_type": event_type,
        "resource": {
            "id": "cap-1",
            "amount": { "value": value, "currency_code": "USD" },
            "supplementary_data": { "related_ids": { "order_id": order_id } },
        }
    })
    .to_string()
}

pub fn paypal_refund_body(event_id: &str, order_id: &str, refund_id: &str, value: &str) -> String {
    serde_json::json!({
        "id": event_id,
        "event_type": "PAYMENT.CAPTURE.REFUNDED",
        "resource": {
            "id": refund_id,
            "amount": { "value": value, "currency_code": "USD" },
            "supplementary_data": { "related_ids": { "order_id": order_id } },
        }
    })
    .to_string()
}
