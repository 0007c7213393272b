use {
    crate::config::EngineConfig,
    crate::domain::dispute::{Dispute, DisputeOutcome},
    crate::domain::error::EngineError,
    crate::domain::event::{CanonicalEvent, Gateway},
    crate::domain::ids::{DisputeId, OrderId, PaymentId, RefundId},
    crate::domain::money::{Money, MoneyAmount},
    crate::domain::payment::{
        NewPaymentParams, Payment, PaymentMethod, PaymentStatus, RefundSelector,
        RefundUpdateOutcome, TransitionOutcome,
    },
    crate::domain::refund::{Refund, RefundReason, RefundStatus},
    crate::gateways::RawGatewayEvent,
    crate::infra::store::{OutboxEntry, OutboxKind, PaymentStore, PaymentSummary},
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    std::sync::Arc,
    std::time::Duration,
};

/// External Order aggregate boundary. Best-effort: failures are retried
/// through the outbox and never roll back payment state.
#[async_trait]
pub trait OrderCollaborator: Send + Sync {
    async fn mark_paid(&self, order_id: &OrderId) -> Result<(), String>;
    async fn mark_payment_failed(&self, order_id: &OrderId, reason: &str) -> Result<(), String>;
}

/// Fire-and-forget; failures never block payment state changes.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, payment: &Payment, event: &str);
}

/// Boundary stub used until a real Order service client is wired in.
pub struct LoggingOrderCollaborator;

#[async_trait]
impl OrderCollaborator for LoggingOrderCollaborator {
    async fn mark_paid(&self, order_id: &OrderId) -> Result<(), String> {
        tracing::info!(order_id = %order_id, "order marked paid");
        Ok(())
    }

    async fn mark_payment_failed(&self, order_id: &OrderId, reason: &str) -> Result<(), String> {
        tracing::info!(order_id = %order_id, reason, "order payment failed");
        Ok(())
    }
}

pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify(&self, payment: &Payment, event: &str) {
        tracing::debug!(payment_id = %payment.payment_id(), event, "notification dispatched");
    }
}

#[derive(Debug)]
pub enum ApplyOutcome {
    Applied(Payment),
    /// Duplicate or same-target delivery; the record was not touched.
    NoOp(Payment),
}

impl ApplyOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            Self::Applied(p) | Self::NoOp(p) => p,
        }
    }

    pub fn into_payment(self) -> Payment {
        match self {
            Self::Applied(p) | Self::NoOp(p) => p,
        }
    }
}

pub struct CreatePayment {
    pub order_id: OrderId,
    pub money: Money,
    pub gateway: Gateway,
    pub method: PaymentMethod,
    pub gateway_payment_id: Option<String>,
    pub provider_txn_id: Option<String>,
    pub actor: String,
}

#[derive(Debug, serde::Serialize)]
pub struct BulkItemOutcome {
    pub payment_id: PaymentId,
    pub outcome: &'static str,
}

/// Owns every mutation of the Payment aggregate. All writes go through
/// the store's conditional update; a loser of a concurrent race is
/// resolved as a no-op (same target) or a logged conflict (different
/// target), never re-planned against the new state, never lost.
pub struct PaymentEngine {
    store: Arc<dyn PaymentStore>,
    orders: Arc<dyn OrderCollaborator>,
    notifications: Arc<dyn NotificationSink>,
    config: EngineConfig,
}

impl PaymentEngine {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        orders: Arc<dyn OrderCollaborator>,
        notifications: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            orders,
            notifications,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── queries ────────────────────────────────────────────────────────

    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment, EngineError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("payment {id} not found")))
    }

    pub async fn find_by_order(&self, order_id: &str) -> Result<Vec<Payment>, EngineError> {
        self.store.find_by_order(order_id).await
    }

    pub async fn find_by_provider_key(
        &self,
        gateway: Gateway,
        key: &str,
    ) -> Result<Option<Payment>, EngineError> {
        self.store.find_by_provider_key(gateway, key).await
    }

    pub async fn mark_event_processed(
        &self,
        gateway: Gateway,
        event_id: &str,
    ) -> Result<bool, EngineError> {
        self.store.mark_event_processed(gateway, event_id).await
    }

    pub async fn summary(&self) -> Result<PaymentSummary, EngineError> {
        self.store.summary().await
    }

    /// Current score for reporting, recomputed from live attributes.
    pub async fn risk_score(&self, id: PaymentId) -> Result<u8, EngineError> {
        let mut payment = self.get_payment(id).await?;
        payment.refresh_risk(&self.config.policy.risk);
        Ok(payment.risk_score())
    }

    // ── lifecycle ──────────────────────────────────────────────────────

    pub async fn create_payment(&self, req: CreatePayment) -> Result<Payment, EngineError> {
        if req.money.amount().is_zero() {
            return Err(EngineError::Validation(
                "payment amount must be positive".into(),
            ));
        }
        let payment = Payment::create(
            NewPaymentParams {
                order_id: req.order_id,
                money: req.money,
                gateway: req.gateway,
                gateway_payment_id: req.gateway_payment_id,
                provider_txn_id: req.provider_txn_id,
                method: req.method,
                actor: req.actor,
            },
            &self.config.policy,
            Utc::now(),
        );
        self.store.insert(&payment).await?;
        tracing::info!(
            payment_id = %payment.payment_id(),
            order_id = %payment.order_id(),
            gateway = %payment.gateway(),
            "payment created"
        );
        Ok(payment)
    }

    /// Direct status command. The target must be directly reachable in
    /// the transition table; refund-settlement targets are rejected.
    pub async fn apply_status(
        &self,
        id: PaymentId,
        target: PaymentStatus,
        actor: &str,
        note: Option<String>,
    ) -> Result<ApplyOutcome, EngineError> {
        self.apply_transition(id, target, actor, note, false).await
    }

    /// Capture command: the canonical CAPTURED semantics, including the
    /// PENDING → PROCESSING hop for gateways that skip intermediates.
    pub async fn capture(&self, id: PaymentId, actor: &str) -> Result<ApplyOutcome, EngineError> {
        self.apply_transition(
            id,
            PaymentStatus::Completed,
            actor,
            Some("capture".into()),
            true,
        )
        .await
    }

    async fn apply_transition(
        &self,
        id: PaymentId,
        target: PaymentStatus,
        actor: &str,
        note: Option<String>,
        routed: bool,
    ) -> Result<ApplyOutcome, EngineError> {
        let now = Utc::now();
        let mut payment = self.get_payment(id).await?;
        self.lazy_expire(&mut payment, now).await?;

        let current = payment.status();
        if current == target {
            return Ok(ApplyOutcome::NoOp(payment));
        }

        let hops = match self.route(current, target, routed) {
            Some(hops) => hops,
            None => {
                let err = EngineError::InvalidTransition {
                    from: current,
                    to: target,
                };
                self.persist_rejection(
                    &mut payment,
                    target.as_str(),
                    &format!("transition {current} -> {target} rejected"),
                    actor,
                    now,
                )
                .await;
                tracing::warn!(
                    payment_id = %id,
                    from = %current,
                    to = %target,
                    "invalid status transition rejected"
                );
                return Err(err);
            }
        };

        let expected = payment.version();
        for hop in &hops {
            let hop_note = if *hop == target { note.clone() } else { None };
            payment.apply_status(*hop, actor, hop_note, now)?;
        }
        if matches!(target, PaymentStatus::Completed | PaymentStatus::Failed) {
            payment.refresh_risk(&self.config.policy.risk);
        }

        if self.store.update(&payment, expected).await? {
            self.dispatch_side_effects(&payment).await;
            return Ok(ApplyOutcome::Applied(payment));
        }

        // Lost the conditional write. Same target now in place: idempotent
        // no-op. Anything else is a conflict, recorded for investigation.
        let mut latest = self.get_payment(id).await?;
        if latest.status() == target {
            return Ok(ApplyOutcome::NoOp(latest));
        }
        self.persist_rejection(
            &mut latest,
            target.as_str(),
            &format!("transition to {target} lost a concurrent update"),
            actor,
            now,
        )
        .await;
        tracing::warn!(
            payment_id = %id,
            from = %latest.status(),
            to = %target,
            "transition lost concurrent update, rejected"
        );
        Err(EngineError::Conflict(format!(
            "payment {id} was updated concurrently; transition to {target} abandoned"
        )))
    }

    fn route(
        &self,
        current: PaymentStatus,
        target: PaymentStatus,
        routed: bool,
    ) -> Option<Vec<PaymentStatus>> {
        if target.is_refund_settlement_only() {
            return None;
        }
        if current.can_transition_to(&target) {
            return Some(vec![target]);
        }
        // Gateways routinely skip intermediate notifications; a capture
        // arriving on a PENDING payment still traverses PROCESSING.
        if routed
            && current == PaymentStatus::Pending
            && matches!(
                target,
                PaymentStatus::Authorized | PaymentStatus::Completed
            )
        {
            return Some(vec![PaymentStatus::Processing, target]);
        }
        None
    }

    // ── canonical webhook events ───────────────────────────────────────

    pub async fn apply_canonical(
        &self,
        id: PaymentId,
        event: CanonicalEvent,
        raw: &RawGatewayEvent,
        actor: &str,
    ) -> Result<ApplyOutcome, EngineError> {
        let note = Some(format!("gateway event {}", raw.event_name));
        match event {
            CanonicalEvent::Authorized => {
                self.apply_transition(id, PaymentStatus::Authorized, actor, note, true)
                    .await
            }
            CanonicalEvent::Captured => {
                self.apply_transition(id, PaymentStatus::Completed, actor, note, true)
                    .await
            }
            CanonicalEvent::Failed => self.gateway_failure(id, actor, note).await,
            CanonicalEvent::RefundCreated => {
                let result = self.gateway_refund_created(id, raw, actor).await;
                self.record_business_rejection(result, id, event, actor).await
            }
            CanonicalEvent::RefundSettled => {
                let result = self.gateway_refund_settled(id, raw, actor).await;
                self.record_business_rejection(result, id, event, actor).await
            }
            CanonicalEvent::RefundFailed => self.gateway_refund_failed(id, raw, actor).await,
            CanonicalEvent::DisputeOpened => {
                let result = self.gateway_dispute_opened(id, raw, actor).await;
                self.record_business_rejection(result, id, event, actor).await
            }
        }
    }

    /// Business-rule rejections of sub-ledger webhook events still leave
    /// an audit fact behind before the error is reported.
    async fn record_business_rejection(
        &self,
        result: Result<ApplyOutcome, EngineError>,
        id: PaymentId,
        event: CanonicalEvent,
        actor: &str,
    ) -> Result<ApplyOutcome, EngineError> {
        if let Err(err) = &result {
            if matches!(
                err,
                EngineError::Validation(_) | EngineError::InsufficientRefundableAmount { .. }
            ) {
                if let Ok(mut latest) = self.get_payment(id).await {
                    self.persist_rejection(
                        &mut latest,
                        event.as_str(),
                        &err.to_string(),
                        actor,
                        Utc::now(),
                    )
                    .await;
                }
            }
        }
        result
    }

    async fn gateway_failure(
        &self,
        id: PaymentId,
        actor: &str,
        note: Option<String>,
    ) -> Result<ApplyOutcome, EngineError> {
        let now = Utc::now();
        let mut payment = self.get_payment(id).await?;
        self.lazy_expire(&mut payment, now).await?;

        let expected = payment.version();
        match payment.record_gateway_failure(actor, note, now) {
            Ok(TransitionOutcome::NoOp) => return Ok(ApplyOutcome::NoOp(payment)),
            Ok(TransitionOutcome::Applied) => {}
            Err(err @ EngineError::InvalidTransition { from, to }) => {
                let mut latest = self.get_payment(id).await?;
                self.persist_rejection(
                    &mut latest,
                    to.as_str(),
                    &format!("transition {from} -> {to} rejected"),
                    actor,
                    now,
                )
                .await;
                tracing::warn!(payment_id = %id, from = %from, to = %to, "failure event rejected");
                return Err(err);
            }
            Err(e) => return Err(e),
        }
        payment.refresh_risk(&self.config.policy.risk);

        if self.store.update(&payment, expected).await? {
            self.dispatch_side_effects(&payment).await;
            return Ok(ApplyOutcome::Applied(payment));
        }
        let latest = self.get_payment(id).await?;
        if latest.status() == PaymentStatus::Failed {
            return Ok(ApplyOutcome::NoOp(latest));
        }
        Err(EngineError::Conflict(format!(
            "payment {id} was updated concurrently; failure event abandoned"
        )))
    }

    async fn gateway_refund_created(
        &self,
        id: PaymentId,
        raw: &RawGatewayEvent,
        actor: &str,
    ) -> Result<ApplyOutcome, EngineError> {
        let key = raw.gateway_refund_id.clone().ok_or_else(|| {
            EngineError::Validation("refund event missing gateway refund id".into())
        })?;
        let amount = MoneyAmount::new(raw.amount_cents.ok_or_else(|| {
            EngineError::Validation("refund event missing amount".into())
        })?)?;
        let reason = map_gateway_refund_reason(raw.reason.as_deref());

        self.mutate(id, actor, move |payment, actor, now| {
            let outcome = payment.add_refund(amount, reason, Some(key.clone()), actor, now)?;
            Ok(if outcome.created {
                MutationOutcome::Changed
            } else {
                MutationOutcome::NoOp
            })
        })
        .await
    }

    async fn gateway_refund_settled(
        &self,
        id: PaymentId,
        raw: &RawGatewayEvent,
        actor: &str,
    ) -> Result<ApplyOutcome, EngineError> {
        let key = raw.gateway_refund_id.clone().ok_or_else(|| {
            EngineError::Validation("refund event missing gateway refund id".into())
        })?;
        let amount_cents = raw.amount_cents;

        self.mutate(id, actor, move |payment, actor, now| {
            let known = payment
                .refunds()
                .iter()
                .any(|r| r.gateway_refund_id() == Some(key.as_str()));
            if !known {
                // One-step settlement (no prior REFUND_CREATED): create
                // the ledger entry from the event itself.
                let amount = MoneyAmount::new(amount_cents.ok_or_else(|| {
                    EngineError::Validation("refund event missing amount".into())
                })?)?;
                payment.add_refund(
                    amount,
                    RefundReason::Other,
                    Some(key.clone()),
                    actor,
                    now,
                )?;
            }
            match payment.update_refund_status(
                RefundSelector::ByGatewayKey(&key),
                RefundStatus::Completed,
                None,
                actor,
                now,
            )? {
                RefundUpdateOutcome::NoOp => Ok(MutationOutcome::NoOp),
                RefundUpdateOutcome::Applied { .. } => Ok(MutationOutcome::Changed),
            }
        })
        .await
    }

    async fn gateway_refund_failed(
        &self,
        id: PaymentId,
        raw: &RawGatewayEvent,
        actor: &str,
    ) -> Result<ApplyOutcome, EngineError> {
        let key = raw.gateway_refund_id.clone().ok_or_else(|| {
            EngineError::Validation("refund event missing gateway refund id".into())
        })?;

        self.mutate(id, actor, move |payment, actor, now| {
            match payment.update_refund_status(
                RefundSelector::ByGatewayKey(&key),
                RefundStatus::Failed,
                None,
                actor,
                now,
            )? {
                RefundUpdateOutcome::NoOp => Ok(MutationOutcome::NoOp),
                RefundUpdateOutcome::Applied { .. } => Ok(MutationOutcome::Changed),
            }
        })
        .await
    }

    async fn gateway_dispute_opened(
        &self,
        id: PaymentId,
        raw: &RawGatewayEvent,
        actor: &str,
    ) -> Result<ApplyOutcome, EngineError> {
        let provider_dispute_id = raw
            .provider_dispute_id
            .clone()
            .unwrap_or_else(|| raw.event_id.clone());
        let amount_cents = raw.amount_cents;
        let reason = raw.reason.clone().unwrap_or_else(|| "chargeback".into());

        self.mutate(id, actor, move |payment, actor, now| {
            let amount = match amount_cents {
                Some(cents) => MoneyAmount::new(cents)?,
                None => payment.money().amount(),
            };
            let outcome = payment.add_dispute(
                amount,
                reason.clone(),
                Some(provider_dispute_id.clone()),
                actor,
                now,
            )?;
            Ok(if outcome.created {
                MutationOutcome::Changed
            } else {
                MutationOutcome::NoOp
            })
        })
        .await
    }

    // ── refund ledger (direct API) ─────────────────────────────────────

    pub async fn add_refund(
        &self,
        id: PaymentId,
        amount: MoneyAmount,
        reason: RefundReason,
        actor: &str,
    ) -> Result<Refund, EngineError> {
        let mut refund_id = None;
        let outcome = self
            .mutate(id, actor, |payment, actor, now| {
                let out = payment.add_refund(amount, reason, None, actor, now)?;
                refund_id = Some(out.refund_id);
                Ok(MutationOutcome::Changed)
            })
            .await;

        match outcome {
            Ok(outcome) => {
                let refund_id = refund_id.expect("refund id set on success");
                let refund = outcome
                    .payment()
                    .refunds()
                    .iter()
                    .find(|r| r.refund_id() == refund_id)
                    .cloned()
                    .ok_or_else(|| EngineError::Store("refund vanished after write".into()))?;
                Ok(refund)
            }
            Err(err @ EngineError::InsufficientRefundableAmount { .. }) => {
                let mut latest = self.get_payment(id).await?;
                self.persist_rejection(&mut latest, "refund", &err.to_string(), actor, Utc::now())
                    .await;
                Err(err)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn update_refund_status(
        &self,
        id: PaymentId,
        refund_id: RefundId,
        new_status: RefundStatus,
        gateway_refund_id: Option<String>,
        actor: &str,
    ) -> Result<Payment, EngineError> {
        let outcome = self
            .mutate(id, actor, move |payment, actor, now| {
                match payment.update_refund_status(
                    RefundSelector::ById(refund_id),
                    new_status,
                    gateway_refund_id.clone(),
                    actor,
                    now,
                )? {
                    RefundUpdateOutcome::NoOp => Ok(MutationOutcome::NoOp),
                    RefundUpdateOutcome::Applied { .. } => Ok(MutationOutcome::Changed),
                }
            })
            .await?;
        Ok(outcome.into_payment())
    }

    // ── dispute ledger ─────────────────────────────────────────────────

    pub async fn add_dispute(
        &self,
        id: PaymentId,
        amount: MoneyAmount,
        reason: String,
        provider_dispute_id: Option<String>,
        actor: &str,
    ) -> Result<Dispute, EngineError> {
        let mut dispute_id = None;
        let outcome = self
            .mutate(id, actor, |payment, actor, now| {
                let out = payment.add_dispute(
                    amount,
                    reason.clone(),
                    provider_dispute_id.clone(),
                    actor,
                    now,
                )?;
                dispute_id = Some(out.dispute_id);
                Ok(if out.created {
                    MutationOutcome::Changed
                } else {
                    MutationOutcome::NoOp
                })
            })
            .await?;

        let dispute_id = dispute_id.expect("dispute id set on success");
        outcome
            .payment()
            .disputes()
            .iter()
            .find(|d| d.dispute_id() == dispute_id)
            .cloned()
            .ok_or_else(|| EngineError::Store("dispute vanished after write".into()))
    }

    pub async fn resolve_dispute(
        &self,
        id: PaymentId,
        dispute_id: DisputeId,
        outcome: DisputeOutcome,
        note: Option<String>,
        actor: &str,
    ) -> Result<Payment, EngineError> {
        let result = self
            .mutate(id, actor, move |payment, actor, now| {
                if payment.resolve_dispute(dispute_id, outcome, note.clone(), actor, now)? {
                    Ok(MutationOutcome::Changed)
                } else {
                    Ok(MutationOutcome::NoOp)
                }
            })
            .await?;
        Ok(result.into_payment())
    }

    // ── retry / expiry ─────────────────────────────────────────────────

    pub async fn increment_attempts(
        &self,
        id: PaymentId,
        actor: &str,
    ) -> Result<Payment, EngineError> {
        let mut crossed_cap = false;
        let outcome = self
            .mutate(id, actor, |payment, actor, now| {
                let before = payment.status();
                payment.increment_attempts(actor, now)?;
                crossed_cap = before != PaymentStatus::Failed
                    && payment.status() == PaymentStatus::Failed;
                Ok(MutationOutcome::Changed)
            })
            .await?;
        if crossed_cap {
            if let ApplyOutcome::Applied(payment) = &outcome {
                self.dispatch_side_effects(payment).await;
            }
        }
        Ok(outcome.into_payment())
    }

    pub async fn retry_eligible(&self, id: PaymentId) -> Result<bool, EngineError> {
        let payment = self.get_payment(id).await?;
        Ok(payment.retry_eligible(Utc::now(), self.config.retry_cooldown_secs))
    }

    /// Sweep side of expiry. Lazy check-on-read covers command paths; this
    /// catches payments nobody touches. Losing a race against a concurrent
    /// capture is fine: the conditional write just fails.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64, EngineError> {
        let mut expired = 0;
        for id in self.store.list_expired_pending(now).await? {
            let mut payment = match self.store.get(id).await? {
                Some(p) => p,
                None => continue,
            };
            if !payment.is_pending_expired(now) {
                continue;
            }
            let expected = payment.version();
            if payment.expire("system:expiry", now).is_err() {
                continue;
            }
            match self.store.update(&payment, expected).await {
                Ok(true) => expired += 1,
                Ok(false) => {
                    tracing::debug!(payment_id = %id, "expiry lost race, skipped");
                }
                Err(e) => tracing::error!(payment_id = %id, error = %e, "expiry write failed"),
            }
        }
        Ok(expired)
    }

    // ── admin ──────────────────────────────────────────────────────────

    /// The only physical delete the model allows.
    pub async fn purge_pending(&self, id: PaymentId) -> Result<(), EngineError> {
        if self.store.delete_pending(id).await? {
            tracing::info!(payment_id = %id, "pending payment purged");
            return Ok(());
        }
        match self.store.get(id).await? {
            None => Err(EngineError::NotFound(format!("payment {id} not found"))),
            Some(p) => Err(EngineError::Conflict(format!(
                "only PENDING payments can be purged, status is {}",
                p.status()
            ))),
        }
    }

    pub async fn bulk_apply(
        &self,
        ids: &[PaymentId],
        target: PaymentStatus,
        actor: &str,
        note: Option<String>,
    ) -> Vec<BulkItemOutcome> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let outcome = match self.apply_status(id, target, actor, note.clone()).await {
                Ok(ApplyOutcome::Applied(_)) => "APPLIED",
                Ok(ApplyOutcome::NoOp(_)) => "NO_OP",
                Err(EngineError::InvalidTransition { .. }) => "REJECTED",
                Err(EngineError::NotFound(_)) => "NOT_FOUND",
                Err(EngineError::Conflict(_)) => "CONFLICT",
                Err(_) => "ERROR",
            };
            results.push(BulkItemOutcome {
                payment_id: id,
                outcome,
            });
        }
        results
    }

    pub async fn bulk_cancel(&self, ids: &[PaymentId], actor: &str) -> Vec<BulkItemOutcome> {
        self.bulk_apply(ids, PaymentStatus::Cancelled, actor, Some("bulk cancel".into()))
            .await
    }

    // ── internals ──────────────────────────────────────────────────────

    /// Conditional-write loop for sub-ledger mutations. These commute, so
    /// a lost race reloads and re-applies against the fresh aggregate;
    /// idempotency guards inside the aggregate absorb duplicates.
    async fn mutate<F>(
        &self,
        id: PaymentId,
        actor: &str,
        mut op: F,
    ) -> Result<ApplyOutcome, EngineError>
    where
        F: FnMut(&mut Payment, &str, DateTime<Utc>) -> Result<MutationOutcome, EngineError>,
    {
        for _ in 0..=self.config.cas_retries {
            let now = Utc::now();
            let mut payment = self.get_payment(id).await?;
            let expected = payment.version();
            match op(&mut payment, actor, now)? {
                MutationOutcome::NoOp => return Ok(ApplyOutcome::NoOp(payment)),
                MutationOutcome::Changed => {
                    if self.store.update(&payment, expected).await? {
                        return Ok(ApplyOutcome::Applied(payment));
                    }
                }
            }
        }
        Err(EngineError::Conflict(format!(
            "payment {id} kept changing concurrently, mutation abandoned"
        )))
    }

    async fn lazy_expire(
        &self,
        payment: &mut Payment,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if !payment.is_pending_expired(now) {
            return Ok(());
        }
        let expected = payment.version();
        let mut expired = payment.clone();
        if expired.expire("system:expiry", now).is_err() {
            return Ok(());
        }
        if self.store.update(&expired, expected).await? {
            *payment = expired;
        } else {
            *payment = self.get_payment(payment.payment_id()).await?;
        }
        Ok(())
    }

    /// Best-effort append of the rejected attempt to the timeline; the
    /// rejection itself is already returned to the caller.
    async fn persist_rejection(
        &self,
        payment: &mut Payment,
        attempted: &str,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) {
        for _ in 0..=self.config.cas_retries {
            let expected = payment.version();
            let mut updated = payment.clone();
            updated.record_rejected(attempted, reason, actor, now);
            match self.store.update(&updated, expected).await {
                Ok(true) => return,
                Ok(false) => match self.store.get(payment.payment_id()).await {
                    Ok(Some(latest)) => *payment = latest,
                    _ => break,
                },
                Err(e) => {
                    tracing::error!(
                        payment_id = %payment.payment_id(),
                        error = %e,
                        "failed to record rejected transition"
                    );
                    return;
                }
            }
        }
        tracing::warn!(
            payment_id = %payment.payment_id(),
            "gave up recording rejected transition"
        );
    }

    /// Synchronous notify with a bounded timeout; failures fall back to
    /// the durable outbox so the webhook response path stays fast.
    async fn dispatch_side_effects(&self, payment: &Payment) {
        let kind = match payment.status() {
            PaymentStatus::Completed => Some(OutboxKind::OrderPaid {
                order_id: payment.order_id().as_str().to_string(),
            }),
            PaymentStatus::Failed => Some(OutboxKind::OrderPaymentFailed {
                order_id: payment.order_id().as_str().to_string(),
                reason: "payment failed".into(),
            }),
            _ => None,
        };

        if let Some(kind) = kind {
            let deadline = Duration::from_millis(self.config.notify_timeout_ms);
            let call = async {
                match &kind {
                    OutboxKind::OrderPaid { order_id } => {
                        self.orders.mark_paid(&order_ref(order_id)).await
                    }
                    OutboxKind::OrderPaymentFailed { order_id, reason } => {
                        self.orders
                            .mark_payment_failed(&order_ref(order_id), reason)
                            .await
                    }
                }
            };
            let delivered = matches!(tokio::time::timeout(deadline, call).await, Ok(Ok(())));
            if !delivered {
                let entry = OutboxEntry::new(payment.payment_id(), kind, Utc::now());
                if let Err(e) = self.store.enqueue_outbox(&entry).await {
                    tracing::error!(
                        payment_id = %payment.payment_id(),
                        error = %e,
                        "order notification failed and could not be queued"
                    );
                } else {
                    tracing::warn!(
                        payment_id = %payment.payment_id(),
                        "order notification deferred to outbox"
                    );
                }
            }
        }

        let sink = Arc::clone(&self.notifications);
        let snapshot = payment.clone();
        tokio::spawn(async move {
            let event = snapshot.status().as_str();
            sink.notify(&snapshot, event).await;
        });
    }
}

enum MutationOutcome {
    Changed,
    NoOp,
}

fn order_ref(order_id: &str) -> OrderId {
    OrderId::new(order_id).unwrap_or_else(|_| {
        OrderId::new("unknown").expect("static order id is non-empty")
    })
}

fn map_gateway_refund_reason(reason: Option<&str>) -> RefundReason {
    match reason {
        Some("requested_by_customer") | Some("CUSTOMER_REQUEST") => RefundReason::CustomerRequest,
        Some("duplicate") | Some("DUPLICATE") => RefundReason::Duplicate,
        Some("fraudulent") | Some("fraud") | Some("FRAUDULENT") => RefundReason::Fraudulent,
        _ => RefundReason::Other,
    }
}
