mod common;

use {
    common::*,
    pay_ledger::domain::error::EngineError,
    pay_ledger::domain::event::Gateway,
    pay_ledger::domain::payment::PaymentStatus,
    pay_ledger::domain::refund::RefundStatus,
    pay_ledger::gateways::{GatewayAdapter, PaypalAdapter, RazorpayAdapter, StripeAdapter},
    pay_ledger::services::ingest::{IngestOutcome, ingest_webhook},
};

fn stripe() -> StripeAdapter {
    StripeAdapter::new(STRIPE_SECRET)
}

fn razorpay() -> RazorpayAdapter {
    RazorpayAdapter::new(RAZORPAY_SECRET)
}

fn paypal() -> PaypalAdapter {
    PaypalAdapter::new(PAYPAL_SECRET, PAYPAL_WEBHOOK_ID)
}

// ── 1. stripe_capture_webhook_completes_payment ────────────────────────

#[tokio::test]
async fn stripe_capture_webhook_completes_payment() {
    let h = harness();
    let p = create_payment(&h, "ord-w1", 10_000, Gateway::Stripe, "pi_w1").await;

    let body = stripe_pi_body("evt_w1", "payment_intent.succeeded", "pi_w1", 10_000);
    let outcome = ingest_webhook(&h.engine, &stripe(), &stripe_headers(&body), &body)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Applied(_)));

    let p = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p.status(), PaymentStatus::Completed);
    assert_eq!(p.refundable_amount().cents(), 10_000);
}

// ── 2. tampered_signature_rejected ─────────────────────────────────────

#[tokio::test]
async fn tampered_signature_rejected() {
    let h = harness();
    create_payment(&h, "ord-w2", 10_000, Gateway::Stripe, "pi_w2").await;

    let body = stripe_pi_body("evt_w2", "payment_intent.succeeded", "pi_w2", 10_000);
    let mut headers = stripe_headers(&body);
    headers.insert(
        "Stripe-Signature",
        "t=1,v1=deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef"
            .parse()
            .unwrap(),
    );

    let err = ingest_webhook(&h.engine, &stripe(), &headers, &body)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SignatureInvalid(_)));

    // Nothing was processed.
    let p = h
        .engine
        .find_by_provider_key(Gateway::Stripe, "pi_w2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(p.status(), PaymentStatus::Pending);
}

// ── 3. missing_signature_header_rejected ───────────────────────────────

#[tokio::test]
async fn missing_signature_header_rejected() {
    let h = harness();
    let body = stripe_pi_body("evt_w3", "payment_intent.succeeded", "pi_w3", 10_000);
    let err = ingest_webhook(&h.engine, &stripe(), &axum::http::HeaderMap::new(), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SignatureInvalid(_)));
}

// ── 4. duplicate_event_id_skipped ──────────────────────────────────────

#[tokio::test]
async fn duplicate_event_id_skipped() {
    let h = harness();
    let p = create_payment(&h, "ord-w4", 10_000, Gateway::Stripe, "pi_w4").await;

    let body = stripe_pi_body("evt_w4", "payment_intent.succeeded", "pi_w4", 10_000);
    let headers = stripe_headers(&body);

    let first = ingest_webhook(&h.engine, &stripe(), &headers, &body).await.unwrap();
    assert!(matches!(first, IngestOutcome::Applied(_)));

    let second = ingest_webhook(&h.engine, &stripe(), &headers, &body).await.unwrap();
    assert!(matches!(second, IngestOutcome::Duplicate));

    let p = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p.status(), PaymentStatus::Completed);
}

// ── 5. unknown_payment_acknowledged ────────────────────────────────────

#[tokio::test]
async fn unknown_payment_acknowledged() {
    let h = harness();
    let body = stripe_pi_body("evt_w5", "payment_intent.succeeded", "pi_nobody", 10_000);
    let outcome = ingest_webhook(&h.engine, &stripe(), &stripe_headers(&body), &body)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::UnknownPayment));
}

// ── 6. unmapped_event_acknowledged ─────────────────────────────────────

#[tokio::test]
async fn unmapped_event_acknowledged() {
    let h = harness();
    create_payment(&h, "ord-w6", 10_000, Gateway::Stripe, "pi_w6").await;

    let body = serde_json::json!({
        "id": "evt_w6",
        "type": "charge.updated",
        "data": { "object": {
            "object": "charge",
            "id": "ch_w6",
            "payment_intent": "pi_w6",
            "amount": 10_000,
            "currency": "usd",
        }}
    })
    .to_string();

    let outcome = ingest_webhook(&h.engine, &stripe(), &stripe_headers(&body), &body)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Ignored));
}

// ── 7. out_of_order_failure_after_capture_rejected ─────────────────────
// Gateways guarantee no ordering; the transition table arbitrates.

#[tokio::test]
async fn out_of_order_failure_after_capture_rejected() {
    let h = harness();
    let p = create_payment(&h, "ord-w7", 10_000, Gateway::Stripe, "pi_w7").await;

    let capture = stripe_pi_body("evt_w7a", "payment_intent.succeeded", "pi_w7", 10_000);
    ingest_webhook(&h.engine, &stripe(), &stripe_headers(&capture), &capture)
        .await
        .unwrap();

    let failure = stripe_pi_body("evt_w7b", "payment_intent.payment_failed", "pi_w7", 10_000);
    let outcome = ingest_webhook(&h.engine, &stripe(), &stripe_headers(&failure), &failure)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Rejected(_)));

    let p = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p.status(), PaymentStatus::Completed, "state not corrupted");
    let last = p.timeline().last().unwrap();
    assert_eq!(last.extra["rejected"], true);
}

// ── 8. authorize_then_capture_via_webhooks ─────────────────────────────

#[tokio::test]
async fn authorize_then_capture_via_webhooks() {
    let h = harness();
    let p = create_payment(&h, "ord-w8", 10_000, Gateway::Stripe, "pi_w8").await;

    let auth = stripe_pi_body(
        "evt_w8a",
        "payment_intent.amount_capturable_updated",
        "pi_w8",
        10_000,
    );
    ingest_webhook(&h.engine, &stripe(), &stripe_headers(&auth), &auth)
        .await
        .unwrap();
    let mid = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(mid.status(), PaymentStatus::Authorized);

    let capture = stripe_pi_body("evt_w8b", "payment_intent.succeeded", "pi_w8", 10_000);
    ingest_webhook(&h.engine, &stripe(), &stripe_headers(&capture), &capture)
        .await
        .unwrap();
    let done = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(done.status(), PaymentStatus::Completed);
}

// ── 9. stripe_refund_webhooks_settle_the_ledger ────────────────────────
// REFUND_CREATED then REFUND_SETTLED; re-delivery with a fresh event id
// still must not double-count.

#[tokio::test]
async fn stripe_refund_webhooks_settle_the_ledger() {
    let h = harness();
    let p = create_payment(&h, "ord-w9", 10_000, Gateway::Stripe, "pi_w9").await;
    let capture = stripe_pi_body("evt_w9a", "payment_intent.succeeded", "pi_w9", 10_000);
    ingest_webhook(&h.engine, &stripe(), &stripe_headers(&capture), &capture)
        .await
        .unwrap();

    let created = stripe_refund_body("evt_w9b", "refund.created", "re_w9", "pi_w9", 4_000);
    ingest_webhook(&h.engine, &stripe(), &stripe_headers(&created), &created)
        .await
        .unwrap();
    let mid = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(mid.refunds().len(), 1);
    assert_eq!(mid.refunds()[0].status(), RefundStatus::Pending);
    assert_eq!(mid.status(), PaymentStatus::Completed);

    let settled = stripe_refund_body("evt_w9c", "charge.refund.updated", "re_w9", "pi_w9", 4_000);
    let outcome = ingest_webhook(&h.engine, &stripe(), &stripe_headers(&settled), &settled)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Applied(_)));

    let done = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(done.status(), PaymentStatus::PartiallyRefunded);
    assert_eq!(done.total_refunded().cents(), 4_000);
    assert_eq!(done.refundable_amount().cents(), 6_000);

    // Gateway re-sends the settlement under a new event id: the ledger
    // recognizes the refund as already completed.
    let resent = stripe_refund_body("evt_w9d", "charge.refund.updated", "re_w9", "pi_w9", 4_000);
    let outcome = ingest_webhook(&h.engine, &stripe(), &stripe_headers(&resent), &resent)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::NoOp(_)));

    let after = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(after.total_refunded().cents(), 4_000, "not 8_000");
}

// ── 10. gateway_refund_exceeding_refundable_rejected ───────────────────

#[tokio::test]
async fn gateway_refund_exceeding_refundable_rejected() {
    let h = harness();
    let p = create_payment(&h, "ord-w10", 10_000, Gateway::Stripe, "pi_w10").await;
    let capture = stripe_pi_body("evt_w10a", "payment_intent.succeeded", "pi_w10", 10_000);
    ingest_webhook(&h.engine, &stripe(), &stripe_headers(&capture), &capture)
        .await
        .unwrap();

    let created = stripe_refund_body("evt_w10b", "refund.created", "re_w10", "pi_w10", 20_000);
    let outcome = ingest_webhook(&h.engine, &stripe(), &stripe_headers(&created), &created)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Rejected(_)));

    let p = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert!(p.refunds().is_empty());
    assert_eq!(p.timeline().last().unwrap().extra["rejected"], true);
}

// ── 11. stripe_dispute_webhook_opens_dispute ───────────────────────────

#[tokio::test]
async fn stripe_dispute_webhook_opens_dispute() {
    let h = harness();
    let p = create_payment(&h, "ord-w11", 10_000, Gateway::Stripe, "pi_w11").await;
    let capture = stripe_pi_body("evt_w11a", "payment_intent.succeeded", "pi_w11", 10_000);
    ingest_webhook(&h.engine, &stripe(), &stripe_headers(&capture), &capture)
        .await
        .unwrap();

    let dispute = stripe_dispute_body("evt_w11b", "dp_w11", "pi_w11", 10_000);
    ingest_webhook(&h.engine, &stripe(), &stripe_headers(&dispute), &dispute)
        .await
        .unwrap();

    let p = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p.disputes().len(), 1);
    assert_eq!(p.disputes()[0].provider_dispute_id(), Some("dp_w11"));
    assert_eq!(p.status(), PaymentStatus::Completed);

    // Same dispute re-announced under a new event id.
    let dup = stripe_dispute_body("evt_w11c", "dp_w11", "pi_w11", 10_000);
    let outcome = ingest_webhook(&h.engine, &stripe(), &stripe_headers(&dup), &dup)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::NoOp(_)));
    let p = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p.disputes().len(), 1);
}

// ── 12. razorpay_capture_webhook ───────────────────────────────────────

#[tokio::test]
async fn razorpay_capture_webhook() {
    let h = harness();
    let p = create_payment(&h, "ord-w12", 50_000, Gateway::Razorpay, "pay_w12").await;

    let body = razorpay_payment_body("payment.captured", "pay_w12", 50_000);
    let outcome = ingest_webhook(
        &h.engine,
        &razorpay(),
        &razorpay_headers(&body, "evt_rzp_w12"),
        &body,
    )
    .await
    .unwrap();
    assert!(matches!(outcome, IngestOutcome::Applied(_)));

    let p = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p.status(), PaymentStatus::Completed);
}

// ── 13. razorpay_bad_signature_rejected ────────────────────────────────

#[tokio::test]
async fn razorpay_bad_signature_rejected() {
    let h = harness();
    create_payment(&h, "ord-w13", 50_000, Gateway::Razorpay, "pay_w13").await;

    let body = razorpay_payment_body("payment.captured", "pay_w13", 50_000);
    let mut headers = razorpay_headers(&body, "evt_rzp_w13");
    headers.insert("X-Razorpay-Signature", "00ff00ff".parse().unwrap());

    let err = ingest_webhook(&h.engine, &razorpay(), &headers, &body)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SignatureInvalid(_)));
}

// ── 14. paypal_capture_and_one_step_refund ─────────────────────────────
// PayPal settles refunds in a single event; the refund ledger entry is
// created and completed from that one delivery.

#[tokio::test]
async fn paypal_capture_and_one_step_refund() {
    let h = harness();
    let p = create_payment(&h, "ord-w14", 2_500, Gateway::Paypal, "pp_ord_w14").await;

    let capture = paypal_capture_body("WH-w14a", "PAYMENT.CAPTURE.COMPLETED", "pp_ord_w14", "25.00");
    ingest_webhook(&h.engine, &paypal(), &paypal_headers(&capture), &capture)
        .await
        .unwrap();
    let mid = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(mid.status(), PaymentStatus::Completed);

    let refund = paypal_refund_body("WH-w14b", "pp_ord_w14", "pp_re_w14", "25.00");
    let outcome = ingest_webhook(&h.engine, &paypal(), &paypal_headers(&refund), &refund)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Applied(_)));

    let done = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(done.status(), PaymentStatus::Refunded);
    assert_eq!(done.total_refunded().cents(), 2_500);
    assert_eq!(done.refunds().len(), 1);
    assert_eq!(done.refunds()[0].status(), RefundStatus::Completed);
    assert_eq!(done.refunds()[0].gateway_refund_id(), Some("pp_re_w14"));
}

// ── 15. malformed_but_authenticated_body_acknowledged ──────────────────

#[tokio::test]
async fn malformed_but_authenticated_body_acknowledged() {
    let h = harness();
    let body = r#"{"this": "is not a stripe event"}"#;
    let outcome = ingest_webhook(&h.engine, &stripe(), &stripe_headers(body), body)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Ignored));
}

// ── 16. capture_failure_increments_attempts ────────────────────────────

#[tokio::test]
async fn capture_failure_increments_attempts() {
    let h = harness();
    let p = create_payment(&h, "ord-w16", 10_000, Gateway::Stripe, "pi_w16").await;

    let failure = stripe_pi_body("evt_w16", "payment_intent.payment_failed", "pi_w16", 10_000);
    ingest_webhook(&h.engine, &stripe(), &stripe_headers(&failure), &failure)
        .await
        .unwrap();

    let p = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p.status(), PaymentStatus::Failed);
    assert_eq!(p.attempts(), 1);
    assert!(p.last_retry_at().is_some());

    // Re-delivered failure under a new event id: untouched.
    let again = stripe_pi_body("evt_w16b", "payment_intent.payment_failed", "pi_w16", 10_000);
    let outcome = ingest_webhook(&h.engine, &stripe(), &stripe_headers(&again), &again)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::NoOp(_)));
    let p = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p.attempts(), 1);
}
