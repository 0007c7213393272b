use {
    crate::domain::error::EngineError,
    crate::domain::event::Gateway,
    crate::domain::ids::PaymentId,
    crate::domain::payment::Payment,
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
    uuid::Uuid,
};

/// Collaborator call awaiting delivery. Written in the same logical unit
/// as the payment mutation that produced it, drained by the relay loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxKind {
    OrderPaid {
        order_id: String,
    },
    OrderPaymentFailed {
        order_id: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub payment_id: PaymentId,
    pub kind: OutboxKind,
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxEntry {
    pub fn new(payment_id: PaymentId, kind: OutboxKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            payment_id,
            kind,
            attempts: 0,
            max_attempts: 8,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PaymentSummary {
    pub total_payments: u64,
    pub total_amount_cents: i64,
    pub total_refunded_cents: i64,
    pub by_status: BTreeMap<String, u64>,
}

/// Repository boundary injected into the engine. One durable record per
/// Payment (refunds/disputes/timeline embedded); conditional update is
/// the only write primitive for existing records, which keeps per-payment
/// mutations linearizable without external locking.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: &Payment) -> Result<(), EngineError>;

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>, EngineError>;

    async fn find_by_order(&self, order_id: &str) -> Result<Vec<Payment>, EngineError>;

    /// Correlation lookup for webhooks: matches either the gateway payment
    /// id or the provider transaction id.
    async fn find_by_provider_key(
        &self,
        gateway: Gateway,
        key: &str,
    ) -> Result<Option<Payment>, EngineError>;

    /// Persists `payment` only if the stored version still equals
    /// `expected_version`. `Ok(false)` means a concurrent writer won.
    async fn update(&self, payment: &Payment, expected_version: u64)
    -> Result<bool, EngineError>;

    /// Physical delete, permitted only for records still PENDING.
    async fn delete_pending(&self, id: PaymentId) -> Result<bool, EngineError>;

    /// Atomic check-and-mark of `(gateway, event_id)`.
    /// `Ok(false)` = this exact delivery was already recorded as processed.
    async fn mark_event_processed(
        &self,
        gateway: Gateway,
        event_id: &str,
    ) -> Result<bool, EngineError>;

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentId>, EngineError>;

    async fn enqueue_outbox(&self, entry: &OutboxEntry) -> Result<(), EngineError>;

    async fn claim_due_outbox(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, EngineError>;

    async fn complete_outbox(&self, id: Uuid) -> Result<(), EngineError>;

    async fn reschedule_outbox(
        &self,
        id: Uuid,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), EngineError>;

    /// Attempt cap reached; parked permanently for investigation.
    async fn fail_outbox(&self, id: Uuid, error: &str) -> Result<(), EngineError>;

    async fn summary(&self) -> Result<PaymentSummary, EngineError>;
}
