use {
    super::dispute::{Dispute, DisputeOutcome},
    super::error::EngineError,
    super::event::Gateway,
    super::ids::{DisputeId, OrderId, PaymentId, RefundId},
    super::money::{FeeSchedule, Fees, Money, MoneyAmount},
    super::refund::{Refund, RefundReason, RefundStatus},
    super::risk::{RiskConfig, RiskInput, calculate_risk_score},
    chrono::{DateTime, Duration, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Authorized,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Authorized => "AUTHORIZED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Refunded => "REFUNDED",
            Self::PartiallyRefunded => "PARTIALLY_REFUNDED",
            Self::Expired => "EXPIRED",
        }
    }

    /// The transition table. Everything not listed here is rejected;
    /// `Completed`/`PartiallyRefunded` rows are reachable only through
    /// refund settlement, never through a status-level command.
    pub fn allowed_transitions(&self) -> &'static [PaymentStatus] {
        use PaymentStatus::*;
        match self {
            Pending => &[Processing, Failed, Cancelled, Expired],
            Processing => &[Authorized, Completed, Failed],
            Authorized => &[Completed, Failed, Cancelled],
            Completed => &[PartiallyRefunded, Refunded],
            PartiallyRefunded => &[Refunded],
            Failed | Cancelled | Refunded | Expired => &[],
        }
    }

    pub fn can_transition_to(&self, next: &PaymentStatus) -> bool {
        self.allowed_transitions().contains(next)
    }

    /// No further status-level transitions; refund/dispute sub-events may
    /// still occur on `Completed`/`PartiallyRefunded`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::Failed
                | Self::Cancelled
                | Self::Refunded
                | Self::Expired
        )
    }

    /// Targets only the refund ledger may move a payment into.
    pub fn is_refund_settlement_only(&self) -> bool {
        matches!(self, Self::Refunded | Self::PartiallyRefunded)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "AUTHORIZED" => Ok(Self::Authorized),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            "REFUNDED" => Ok(Self::Refunded),
            "PARTIALLY_REFUNDED" => Ok(Self::PartiallyRefunded),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(EngineError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Upi,
    Netbanking,
    Wallet,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "CARD",
            Self::Upi => "UPI",
            Self::Netbanking => "NETBANKING",
            Self::Wallet => "WALLET",
            Self::BankTransfer => "BANK_TRANSFER",
        }
    }
}

impl TryFrom<&str> for PaymentMethod {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "CARD" => Ok(Self::Card),
            "UPI" => Ok(Self::Upi),
            "NETBANKING" => Ok(Self::Netbanking),
            "WALLET" => Ok(Self::Wallet),
            "BANK_TRANSFER" => Ok(Self::BankTransfer),
            other => Err(EngineError::Validation(format!(
                "unknown payment method: {other}"
            ))),
        }
    }
}

/// Append-only audit fact. The only mechanism for reconstructing why a
/// payment reached its state; never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: PaymentStatus,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
    pub actor: String,
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Transition to the current status: guaranteed no-op, record
    /// unchanged. This is what makes duplicate webhook delivery safe.
    NoOp,
}

#[derive(Debug, Clone, Copy)]
pub struct AddRefundOutcome {
    pub refund_id: RefundId,
    /// `false` when the gateway refund key was already known (duplicate).
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundUpdateOutcome {
    Applied { payment_status_changed: bool },
    NoOp,
}

#[derive(Debug, Clone, Copy)]
pub struct AddDisputeOutcome {
    pub dispute_id: DisputeId,
    pub created: bool,
}

pub enum RefundSelector<'a> {
    ById(RefundId),
    ByGatewayKey(&'a str),
}

/// Creation-time knobs the engine passes in; never read from the
/// environment inside the aggregate.
#[derive(Debug, Clone, Copy)]
pub struct PaymentPolicy {
    pub fees: FeeSchedule,
    pub risk: RiskConfig,
    pub pending_ttl_secs: i64,
    pub max_attempts: u32,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            risk: RiskConfig::default(),
            pending_ttl_secs: 30 * 60,
            max_attempts: 3,
        }
    }
}

pub struct NewPaymentParams {
    pub order_id: OrderId,
    pub money: Money,
    pub gateway: Gateway,
    pub gateway_payment_id: Option<String>,
    pub provider_txn_id: Option<String>,
    pub method: PaymentMethod,
    pub actor: String,
}

/// Aggregate root. Mutated exclusively through the methods below (all
/// invoked by the State Transition Engine); every mutation bumps
/// `version` so the store's conditional write can detect lost races.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    payment_id: PaymentId,
    order_id: OrderId,
    money: Money,
    status: PaymentStatus,
    gateway: Gateway,
    gateway_payment_id: Option<String>,
    provider_txn_id: Option<String>,
    method: PaymentMethod,
    refunds: Vec<Refund>,
    disputes: Vec<Dispute>,
    total_refunded: MoneyAmount,
    refundable_amount: MoneyAmount,
    fees: Fees,
    attempts: u32,
    max_attempts: u32,
    last_retry_at: Option<DateTime<Utc>>,
    risk_score: u8,
    timeline: Vec<TimelineEntry>,
    expires_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl Payment {
    pub fn create(params: NewPaymentParams, policy: &PaymentPolicy, now: DateTime<Utc>) -> Self {
        let amount = params.money.amount();
        let mut payment = Self {
            payment_id: PaymentId::generate(),
            order_id: params.order_id,
            money: params.money,
            status: PaymentStatus::Pending,
            gateway: params.gateway,
            gateway_payment_id: params.gateway_payment_id,
            provider_txn_id: params.provider_txn_id,
            method: params.method,
            refunds: Vec::new(),
            disputes: Vec::new(),
            total_refunded: MoneyAmount::zero(),
            refundable_amount: amount,
            fees: policy.fees.compute(amount),
            attempts: 0,
            max_attempts: policy.max_attempts,
            last_retry_at: None,
            risk_score: 0,
            timeline: Vec::new(),
            expires_at: Some(now + Duration::seconds(policy.pending_ttl_secs)),
            completed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        payment.refresh_risk(&policy.risk);
        payment.push_event(
            PaymentStatus::Pending,
            Some("payment created".into()),
            &params.actor,
            serde_json::json!({}),
            now,
        );
        payment
    }

    // ── accessors ──────────────────────────────────────────────────────

    pub fn payment_id(&self) -> PaymentId {
        self.payment_id
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn money(&self) -> &Money {
        &self.money
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn gateway(&self) -> Gateway {
        self.gateway
    }

    pub fn gateway_payment_id(&self) -> Option<&str> {
        self.gateway_payment_id.as_deref()
    }

    pub fn provider_txn_id(&self) -> Option<&str> {
        self.provider_txn_id.as_deref()
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn refunds(&self) -> &[Refund] {
        &self.refunds
    }

    pub fn disputes(&self) -> &[Dispute] {
        &self.disputes
    }

    pub fn total_refunded(&self) -> MoneyAmount {
        self.total_refunded
    }

    pub fn refundable_amount(&self) -> MoneyAmount {
        self.refundable_amount
    }

    pub fn fees(&self) -> &Fees {
        &self.fees
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn last_retry_at(&self) -> Option<DateTime<Utc>> {
        self.last_retry_at
    }

    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Does `key` correlate a webhook to this payment?
    pub fn matches_provider_key(&self, key: &str) -> bool {
        self.gateway_payment_id.as_deref() == Some(key)
            || self.provider_txn_id.as_deref() == Some(key)
    }

    pub fn is_pending_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending
            && self.expires_at.is_some_and(|t| t <= now)
    }

    pub fn retry_eligible(&self, now: DateTime<Utc>, cooldown_secs: i64) -> bool {
        self.status == PaymentStatus::Failed
            && self.attempts < self.max_attempts
            && self
                .last_retry_at
                .is_none_or(|t| now - t > Duration::seconds(cooldown_secs))
    }

    // ── status machine ─────────────────────────────────────────────────

    /// Status-level transition entry point. Refund-settlement-only targets
    /// are rejected here; the refund ledger reaches them internally.
    pub fn apply_status(
        &mut self,
        target: PaymentStatus,
        actor: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, EngineError> {
        if target.is_refund_settlement_only() && self.status != target {
            return Err(EngineError::Validation(format!(
                "status {target} is only reachable through refund settlement"
            )));
        }
        self.transition(target, actor, note, serde_json::json!({}), now)
    }

    fn transition(
        &mut self,
        target: PaymentStatus,
        actor: &str,
        note: Option<String>,
        extra: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, EngineError> {
        if self.status == target {
            return Ok(TransitionOutcome::NoOp);
        }
        if !self.status.can_transition_to(&target) {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        match target {
            PaymentStatus::Completed => {
                self.completed_at = Some(now);
            }
            PaymentStatus::Failed => {
                self.last_retry_at = Some(now);
            }
            _ => {}
        }
        self.push_event(target, note, actor, extra, now);
        self.touch(now);
        Ok(TransitionOutcome::Applied)
    }

    /// Record an attempt that failed without necessarily moving the
    /// status; at the attempt cap the payment is forced to `FAILED`.
    pub fn increment_attempts(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.attempts += 1;
        self.last_retry_at = Some(now);
        self.push_event(
            self.status,
            Some("payment attempt failed".into()),
            actor,
            serde_json::json!({ "attempts": self.attempts, "max_attempts": self.max_attempts }),
            now,
        );
        if self.attempts >= self.max_attempts && !self.status.is_terminal() {
            self.transition(
                PaymentStatus::Failed,
                actor,
                Some("max attempts reached".into()),
                serde_json::json!({ "attempts": self.attempts }),
                now,
            )?;
        }
        self.touch(now);
        Ok(())
    }

    /// A gateway-reported failure: counts an attempt and moves the
    /// payment to `FAILED`. A repeat delivery on an already-failed
    /// payment leaves the record untouched.
    pub fn record_gateway_failure(
        &mut self,
        actor: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, EngineError> {
        if self.status == PaymentStatus::Failed {
            return Ok(TransitionOutcome::NoOp);
        }
        self.attempts += 1;
        self.transition(
            PaymentStatus::Failed,
            actor,
            note,
            serde_json::json!({ "attempts": self.attempts }),
            now,
        )
    }

    /// Append a rejected attempt as an audit fact; status unchanged.
    pub fn record_rejected(
        &mut self,
        attempted: &str,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) {
        self.push_event(
            self.status,
            Some(reason.to_string()),
            actor,
            serde_json::json!({ "rejected": true, "attempted": attempted }),
            now,
        );
        self.touch(now);
    }

    pub fn expire(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, EngineError> {
        self.transition(
            PaymentStatus::Expired,
            actor,
            Some("pending TTL elapsed".into()),
            serde_json::json!({ "expires_at": self.expires_at }),
            now,
        )
    }

    // ── refund ledger ──────────────────────────────────────────────────

    pub fn add_refund(
        &mut self,
        amount: MoneyAmount,
        reason: RefundReason,
        gateway_refund_id: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<AddRefundOutcome, EngineError> {
        if let Some(key) = gateway_refund_id.as_deref() {
            if let Some(existing) = self
                .refunds
                .iter()
                .find(|r| r.gateway_refund_id() == Some(key))
            {
                return Ok(AddRefundOutcome {
                    refund_id: existing.refund_id(),
                    created: false,
                });
            }
        }

        if !matches!(
            self.status,
            PaymentStatus::Completed | PaymentStatus::PartiallyRefunded
        ) {
            return Err(EngineError::Validation(format!(
                "refunds require a completed payment, status is {}",
                self.status
            )));
        }
        if amount.is_zero() {
            return Err(EngineError::Validation(
                "refund amount must be positive".into(),
            ));
        }
        if amount > self.refundable_amount {
            return Err(EngineError::InsufficientRefundableAmount {
                requested: amount.cents(),
                refundable: self.refundable_amount.cents(),
            });
        }

        let refund = Refund::new(amount, reason, gateway_refund_id, now);
        let refund_id = refund.refund_id();
        self.push_event(
            self.status,
            Some("refund requested".into()),
            actor,
            serde_json::json!({
                "refund_id": refund_id,
                "amount": amount.cents(),
                "reason": reason.as_str(),
            }),
            now,
        );
        self.refunds.push(refund);
        self.touch(now);
        Ok(AddRefundOutcome {
            refund_id,
            created: true,
        })
    }

    pub fn update_refund_status(
        &mut self,
        selector: RefundSelector<'_>,
        new_status: RefundStatus,
        gateway_refund_id: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundUpdateOutcome, EngineError> {
        let refund = match selector {
            RefundSelector::ById(id) => self.refunds.iter_mut().find(|r| r.refund_id() == id),
            RefundSelector::ByGatewayKey(key) => self
                .refunds
                .iter_mut()
                .find(|r| r.gateway_refund_id() == Some(key)),
        }
        .ok_or_else(|| EngineError::NotFound("refund not found".into()))?;

        let mut attached = false;
        if let Some(id) = gateway_refund_id {
            if refund.gateway_refund_id() != Some(id.as_str()) {
                refund.set_gateway_refund_id(id);
                attached = true;
            }
        }
        let refund_id = refund.refund_id();
        let refund_amount = refund.amount();
        let advanced = refund.advance(new_status, now)?;
        if !advanced {
            if attached {
                self.touch(now);
                return Ok(RefundUpdateOutcome::Applied {
                    payment_status_changed: false,
                });
            }
            return Ok(RefundUpdateOutcome::NoOp);
        }

        self.push_event(
            self.status,
            Some(format!("refund {}", new_status.as_str().to_lowercase())),
            actor,
            serde_json::json!({
                "refund_id": refund_id,
                "refund_status": new_status.as_str(),
                "amount": refund_amount.cents(),
            }),
            now,
        );

        let mut payment_status_changed = false;
        if new_status == RefundStatus::Completed {
            self.recompute_refund_totals()?;
            let target = if self.refundable_amount.is_zero() {
                PaymentStatus::Refunded
            } else {
                PaymentStatus::PartiallyRefunded
            };
            payment_status_changed = matches!(
                self.transition(
                    target,
                    actor,
                    Some(format!("total refunded {}", self.total_refunded)),
                    serde_json::json!({ "total_refunded": self.total_refunded.cents() }),
                    now,
                )?,
                TransitionOutcome::Applied
            );
        }
        self.touch(now);
        Ok(RefundUpdateOutcome::Applied {
            payment_status_changed,
        })
    }

    /// `total_refunded` = sum over COMPLETED refunds; `refundable_amount`
    /// = amount − total_refunded. Recomputed on every refund mutation.
    fn recompute_refund_totals(&mut self) -> Result<(), EngineError> {
        let mut total = MoneyAmount::zero();
        for refund in &self.refunds {
            if refund.status() == RefundStatus::Completed {
                total = total.checked_add(refund.amount()).ok_or_else(|| {
                    EngineError::Validation("refund total overflow".into())
                })?;
            }
        }
        let refundable = self.money.amount().checked_sub(total).ok_or_else(|| {
            EngineError::Validation("refund total exceeds payment amount".into())
        })?;
        self.total_refunded = total;
        self.refundable_amount = refundable;
        Ok(())
    }

    // ── dispute ledger ─────────────────────────────────────────────────

    pub fn add_dispute(
        &mut self,
        amount: MoneyAmount,
        reason: impl Into<String>,
        provider_dispute_id: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<AddDisputeOutcome, EngineError> {
        if let Some(key) = provider_dispute_id.as_deref() {
            if let Some(existing) = self
                .disputes
                .iter()
                .find(|d| d.provider_dispute_id() == Some(key))
            {
                return Ok(AddDisputeOutcome {
                    dispute_id: existing.dispute_id(),
                    created: false,
                });
            }
        }
        if amount.is_zero() {
            return Err(EngineError::Validation(
                "dispute amount must be positive".into(),
            ));
        }
        if amount > self.money.amount() {
            return Err(EngineError::Validation(
                "dispute amount exceeds payment amount".into(),
            ));
        }

        let reason = reason.into();
        let dispute = Dispute::new(amount, reason.clone(), provider_dispute_id, now);
        let dispute_id = dispute.dispute_id();
        self.push_event(
            self.status,
            Some("dispute opened".into()),
            actor,
            serde_json::json!({
                "dispute_id": dispute_id,
                "amount": amount.cents(),
                "reason": reason,
            }),
            now,
        );
        self.disputes.push(dispute);
        self.touch(now);
        Ok(AddDisputeOutcome {
            dispute_id,
            created: true,
        })
    }

    pub fn resolve_dispute(
        &mut self,
        dispute_id: DisputeId,
        outcome: DisputeOutcome,
        note: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let dispute = self
            .disputes
            .iter_mut()
            .find(|d| d.dispute_id() == dispute_id)
            .ok_or_else(|| EngineError::NotFound(format!("dispute {dispute_id} not found")))?;

        if !dispute.resolve(outcome, now)? {
            return Ok(false);
        }
        self.push_event(
            self.status,
            note.or_else(|| Some("dispute resolved".into())),
            actor,
            serde_json::json!({
                "dispute_id": dispute_id,
                "outcome": outcome.as_status().as_str(),
            }),
            now,
        );
        self.touch(now);
        Ok(true)
    }

    // ── risk ───────────────────────────────────────────────────────────

    pub fn refresh_risk(&mut self, cfg: &RiskConfig) {
        let completion_secs = self
            .completed_at
            .map(|done| (done - self.created_at).num_seconds());
        self.risk_score = calculate_risk_score(
            &RiskInput {
                amount_cents: self.money.amount().cents(),
                failed_attempts: self.attempts,
                method: self.method,
                completion_secs,
            },
            cfg,
        );
    }

    // ── internals ──────────────────────────────────────────────────────

    fn push_event(
        &mut self,
        status: PaymentStatus,
        note: Option<String>,
        actor: &str,
        extra: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        self.timeline.push(TimelineEntry {
            status,
            at: now,
            note,
            actor: actor.to_string(),
            extra,
        });
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}
