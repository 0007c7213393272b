mod common;

use {
    common::*,
    pay_ledger::domain::dispute::{DisputeOutcome, DisputeStatus},
    pay_ledger::domain::error::EngineError,
    pay_ledger::domain::event::Gateway,
    pay_ledger::domain::ids::PaymentId,
    pay_ledger::domain::money::MoneyAmount,
    pay_ledger::domain::payment::{Payment, PaymentStatus},
    pay_ledger::domain::refund::{RefundReason, RefundStatus},
};

async fn completed_payment(h: &TestHarness, order: &str, cents: i64, key: &str) -> Payment {
    let p = create_payment(h, order, cents, Gateway::Stripe, key).await;
    h.engine
        .capture(p.payment_id(), "test")
        .await
        .unwrap()
        .into_payment()
}

fn assert_refund_invariants(p: &Payment) {
    assert!(p.total_refunded().cents() >= 0);
    assert!(p.total_refunded() <= p.money().amount());
    assert_eq!(
        p.refundable_amount().cents(),
        p.money().amount().cents() - p.total_refunded().cents()
    );
    let completed_sum: i64 = p
        .refunds()
        .iter()
        .filter(|r| r.status() == RefundStatus::Completed)
        .map(|r| r.amount().cents())
        .sum();
    assert_eq!(completed_sum, p.total_refunded().cents());
}

// ── 1. partial_refund_lifecycle ────────────────────────────────────────
// 100 USD completed payment, 40 refunded: PARTIALLY_REFUNDED, 60 left.

#[tokio::test]
async fn partial_refund_lifecycle() {
    let h = harness();
    let p = completed_payment(&h, "ord-r1", 10_000, "pi_r1").await;

    let refund = h
        .engine
        .add_refund(
            p.payment_id(),
            MoneyAmount::new(4_000).unwrap(),
            RefundReason::CustomerRequest,
            "test",
        )
        .await
        .unwrap();
    assert_eq!(refund.status(), RefundStatus::Pending);

    // Pending refund does not change the payment yet.
    let mid = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(mid.status(), PaymentStatus::Completed);
    assert_eq!(mid.total_refunded().cents(), 0);

    let done = h
        .engine
        .update_refund_status(
            p.payment_id(),
            refund.refund_id(),
            RefundStatus::Completed,
            Some("re_r1".into()),
            "test",
        )
        .await
        .unwrap();

    assert_eq!(done.status(), PaymentStatus::PartiallyRefunded);
    assert_eq!(done.total_refunded().cents(), 4_000);
    assert_eq!(done.refundable_amount().cents(), 6_000);
    assert_refund_invariants(&done);
}

// ── 2. duplicate_refund_completion_is_noop ─────────────────────────────
// Re-delivering the completion must not double-count.

#[tokio::test]
async fn duplicate_refund_completion_is_noop() {
    let h = harness();
    let p = completed_payment(&h, "ord-r2", 10_000, "pi_r2").await;
    let refund = h
        .engine
        .add_refund(
            p.payment_id(),
            MoneyAmount::new(4_000).unwrap(),
            RefundReason::CustomerRequest,
            "test",
        )
        .await
        .unwrap();

    for _ in 0..2 {
        h.engine
            .update_refund_status(
                p.payment_id(),
                refund.refund_id(),
                RefundStatus::Completed,
                None,
                "test",
            )
            .await
            .unwrap();
    }

    let p = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p.total_refunded().cents(), 4_000, "not 8_000");
    assert_eq!(p.refundable_amount().cents(), 6_000);
    assert_refund_invariants(&p);
}

// ── 3. over_refund_rejected ────────────────────────────────────────────
// 60 refundable, 70 requested.

#[tokio::test]
async fn over_refund_rejected() {
    let h = harness();
    let p = completed_payment(&h, "ord-r3", 10_000, "pi_r3").await;
    let refund = h
        .engine
        .add_refund(
            p.payment_id(),
            MoneyAmount::new(4_000).unwrap(),
            RefundReason::CustomerRequest,
            "test",
        )
        .await
        .unwrap();
    h.engine
        .update_refund_status(
            p.payment_id(),
            refund.refund_id(),
            RefundStatus::Completed,
            None,
            "test",
        )
        .await
        .unwrap();

    let err = h
        .engine
        .add_refund(
            p.payment_id(),
            MoneyAmount::new(7_000).unwrap(),
            RefundReason::CustomerRequest,
            "test",
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientRefundableAmount {
            requested: 7_000,
            refundable: 6_000,
        }
    ));

    // Rejected, and recorded as an audit fact.
    let p = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p.refunds().len(), 1);
    let last = p.timeline().last().unwrap();
    assert_eq!(last.extra["rejected"], true);
}

// ── 4. full_refund_marks_payment_refunded ──────────────────────────────

#[tokio::test]
async fn full_refund_marks_payment_refunded() {
    let h = harness();
    let p = completed_payment(&h, "ord-r4", 10_000, "pi_r4").await;

    let r1 = h
        .engine
        .add_refund(
            p.payment_id(),
            MoneyAmount::new(4_000).unwrap(),
            RefundReason::CustomerRequest,
            "test",
        )
        .await
        .unwrap();
    h.engine
        .update_refund_status(p.payment_id(), r1.refund_id(), RefundStatus::Completed, None, "test")
        .await
        .unwrap();

    let r2 = h
        .engine
        .add_refund(
            p.payment_id(),
            MoneyAmount::new(6_000).unwrap(),
            RefundReason::OrderCancelled,
            "test",
        )
        .await
        .unwrap();
    let p = h
        .engine
        .update_refund_status(p.payment_id(), r2.refund_id(), RefundStatus::Completed, None, "test")
        .await
        .unwrap();

    assert_eq!(p.status(), PaymentStatus::Refunded);
    assert_eq!(p.refundable_amount().cents(), 0);
    assert_refund_invariants(&p);
}

// ── 5. refund_failure_is_terminal_for_that_refund_only ─────────────────

#[tokio::test]
async fn refund_failure_is_terminal_for_that_refund_only() {
    let h = harness();
    let p = completed_payment(&h, "ord-r5", 10_000, "pi_r5").await;

    let r1 = h
        .engine
        .add_refund(
            p.payment_id(),
            MoneyAmount::new(4_000).unwrap(),
            RefundReason::CustomerRequest,
            "test",
        )
        .await
        .unwrap();
    let p1 = h
        .engine
        .update_refund_status(p.payment_id(), r1.refund_id(), RefundStatus::Failed, None, "test")
        .await
        .unwrap();

    // Payment status untouched; amount still fully refundable.
    assert_eq!(p1.status(), PaymentStatus::Completed);
    assert_eq!(p1.refundable_amount().cents(), 10_000);

    // A failed refund cannot be revived.
    let err = h
        .engine
        .update_refund_status(
            p.payment_id(),
            r1.refund_id(),
            RefundStatus::Completed,
            None,
            "test",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // A fresh attempt is allowed.
    let r2 = h
        .engine
        .add_refund(
            p.payment_id(),
            MoneyAmount::new(4_000).unwrap(),
            RefundReason::CustomerRequest,
            "test",
        )
        .await
        .unwrap();
    let p2 = h
        .engine
        .update_refund_status(p.payment_id(), r2.refund_id(), RefundStatus::Completed, None, "test")
        .await
        .unwrap();
    assert_eq!(p2.status(), PaymentStatus::PartiallyRefunded);
    assert_refund_invariants(&p2);
}

// ── 6. refund_requires_completed_payment ───────────────────────────────

#[tokio::test]
async fn refund_requires_completed_payment() {
    let h = harness();
    let p = create_payment(&h, "ord-r6", 10_000, Gateway::Stripe, "pi_r6").await;

    let err = h
        .engine
        .add_refund(
            p.payment_id(),
            MoneyAmount::new(1_000).unwrap(),
            RefundReason::CustomerRequest,
            "test",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

// ── 7. refund_can_move_through_processing ──────────────────────────────

#[tokio::test]
async fn refund_can_move_through_processing() {
    let h = harness();
    let p = completed_payment(&h, "ord-r7", 10_000, "pi_r7").await;
    let r = h
        .engine
        .add_refund(
            p.payment_id(),
            MoneyAmount::new(2_500).unwrap(),
            RefundReason::Duplicate,
            "test",
        )
        .await
        .unwrap();

    h.engine
        .update_refund_status(p.payment_id(), r.refund_id(), RefundStatus::Processing, None, "test")
        .await
        .unwrap();
    let p1 = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p1.refunds()[0].status(), RefundStatus::Processing);
    assert_eq!(p1.status(), PaymentStatus::Completed);

    let p2 = h
        .engine
        .update_refund_status(p.payment_id(), r.refund_id(), RefundStatus::Completed, None, "test")
        .await
        .unwrap();
    assert_eq!(p2.refunds()[0].status(), RefundStatus::Completed);
    assert!(p2.refunds()[0].processed_at().is_some());
    assert_eq!(p2.status(), PaymentStatus::PartiallyRefunded);
}

// ── 8. missing_refund_reports_not_found ────────────────────────────────

#[tokio::test]
async fn missing_refund_reports_not_found() {
    let h = harness();
    let p = completed_payment(&h, "ord-r8", 10_000, "pi_r8").await;

    let err = h
        .engine
        .update_refund_status(
            p.payment_id(),
            pay_ledger::domain::ids::RefundId::generate(),
            RefundStatus::Completed,
            None,
            "test",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

// ── 9. unknown_payment_reports_not_found ───────────────────────────────

#[tokio::test]
async fn unknown_payment_reports_not_found() {
    let h = harness();
    let err = h.engine.get_payment(PaymentId::generate()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

// ── 10. dispute_lifecycle_leaves_payment_status_alone ──────────────────

#[tokio::test]
async fn dispute_lifecycle_leaves_payment_status_alone() {
    let h = harness();
    let p = completed_payment(&h, "ord-d1", 10_000, "pi_d1").await;

    let dispute = h
        .engine
        .add_dispute(
            p.payment_id(),
            MoneyAmount::new(10_000).unwrap(),
            "product not received".into(),
            Some("dp_1".into()),
            "test",
        )
        .await
        .unwrap();
    assert_eq!(dispute.status(), DisputeStatus::Open);

    let p1 = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p1.status(), PaymentStatus::Completed, "dispute does not move status");

    let p2 = h
        .engine
        .resolve_dispute(
            p.payment_id(),
            dispute.dispute_id(),
            DisputeOutcome::Lost,
            Some("issuer sided with cardholder".into()),
            "test",
        )
        .await
        .unwrap();
    assert_eq!(p2.disputes()[0].status(), DisputeStatus::Lost);
    assert!(p2.disputes()[0].resolved_at().is_some());
    assert_eq!(p2.status(), PaymentStatus::Completed);
    // Fund movement for a lost dispute is a business decision modeled as
    // a later refund; the ledger still has the full amount refundable.
    assert_eq!(p2.refundable_amount().cents(), 10_000);
}

// ── 11. dispute_dedup_by_provider_id ───────────────────────────────────

#[tokio::test]
async fn dispute_dedup_by_provider_id() {
    let h = harness();
    let p = completed_payment(&h, "ord-d2", 10_000, "pi_d2").await;

    let d1 = h
        .engine
        .add_dispute(
            p.payment_id(),
            MoneyAmount::new(5_000).unwrap(),
            "fraud".into(),
            Some("dp_2".into()),
            "test",
        )
        .await
        .unwrap();
    let d2 = h
        .engine
        .add_dispute(
            p.payment_id(),
            MoneyAmount::new(5_000).unwrap(),
            "fraud".into(),
            Some("dp_2".into()),
            "test",
        )
        .await
        .unwrap();

    assert_eq!(d1.dispute_id(), d2.dispute_id());
    let p = h.engine.get_payment(p.payment_id()).await.unwrap();
    assert_eq!(p.disputes().len(), 1);
}

// ── 12. dispute_amount_bounded_by_payment_amount ───────────────────────

#[tokio::test]
async fn dispute_amount_bounded_by_payment_amount() {
    let h = harness();
    let p = completed_payment(&h, "ord-d3", 10_000, "pi_d3").await;

    let err = h
        .engine
        .add_dispute(
            p.payment_id(),
            MoneyAmount::new(20_000).unwrap(),
            "fraud".into(),
            None,
            "test",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

// ── 13. resolving_twice_with_same_outcome_is_noop ──────────────────────

#[tokio::test]
async fn resolving_twice_with_same_outcome_is_noop() {
    let h = harness();
    let p = completed_payment(&h, "ord-d4", 10_000, "pi_d4").await;
    let d = h
        .engine
        .add_dispute(
            p.payment_id(),
            MoneyAmount::new(1_000).unwrap(),
            "fraud".into(),
            None,
            "test",
        )
        .await
        .unwrap();

    let p1 = h
        .engine
        .resolve_dispute(p.payment_id(), d.dispute_id(), DisputeOutcome::Won, None, "test")
        .await
        .unwrap();
    let p2 = h
        .engine
        .resolve_dispute(p.payment_id(), d.dispute_id(), DisputeOutcome::Won, None, "test")
        .await
        .unwrap();
    assert_eq!(p1.version(), p2.version());

    // Flipping the outcome afterwards is rejected.
    let err = h
        .engine
        .resolve_dispute(p.payment_id(), d.dispute_id(), DisputeOutcome::Lost, None, "test")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
