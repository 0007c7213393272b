use {
    super::store::{OutboxEntry, PaymentStore, PaymentSummary},
    crate::domain::error::EngineError,
    crate::domain::event::Gateway,
    crate::domain::ids::PaymentId,
    crate::domain::payment::{Payment, PaymentStatus},
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    std::collections::{HashMap, HashSet},
    tokio::sync::Mutex,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutboxState {
    Pending,
    Processing,
    Dead,
}

#[derive(Default)]
struct Inner {
    payments: HashMap<PaymentId, Payment>,
    processed_events: HashSet<(Gateway, String)>,
    outbox: HashMap<Uuid, (OutboxEntry, OutboxState)>,
}

/// Map-backed store with the same conditional-write semantics as the
/// Postgres implementation. All version checks happen under one lock, so
/// an `update` is atomic with respect to concurrent writers.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert(&self, payment: &Payment) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let id = payment.payment_id();
        if inner.payments.contains_key(&id) {
            return Err(EngineError::Conflict(format!("payment {id} already exists")));
        }
        inner.payments.insert(id, payment.clone());
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>, EngineError> {
        Ok(self.inner.lock().await.payments.get(&id).cloned())
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Vec<Payment>, EngineError> {
        let inner = self.inner.lock().await;
        let mut found: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| p.order_id().as_str() == order_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at());
        Ok(found)
    }

    async fn find_by_provider_key(
        &self,
        gateway: Gateway,
        key: &str,
    ) -> Result<Option<Payment>, EngineError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .payments
            .values()
            .find(|p| p.gateway() == gateway && p.matches_provider_key(key))
            .cloned())
    }

    async fn update(
        &self,
        payment: &Payment,
        expected_version: u64,
    ) -> Result<bool, EngineError> {
        let mut inner = self.inner.lock().await;
        let id = payment.payment_id();
        match inner.payments.get(&id) {
            None => Err(EngineError::NotFound(format!("payment {id} not found"))),
            Some(current) if current.version() != expected_version => Ok(false),
            Some(_) => {
                inner.payments.insert(id, payment.clone());
                Ok(true)
            }
        }
    }

    async fn delete_pending(&self, id: PaymentId) -> Result<bool, EngineError> {
        let mut inner = self.inner.lock().await;
        match inner.payments.get(&id) {
            Some(p) if p.status() == PaymentStatus::Pending => {
                inner.payments.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_event_processed(
        &self,
        gateway: Gateway,
        event_id: &str,
    ) -> Result<bool, EngineError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.processed_events.insert((gateway, event_id.to_string())))
    }

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentId>, EngineError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .payments
            .values()
            .filter(|p| p.is_pending_expired(now))
            .map(|p| p.payment_id())
            .collect())
    }

    async fn enqueue_outbox(&self, entry: &OutboxEntry) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        inner
            .outbox
            .insert(entry.id, (entry.clone(), OutboxState::Pending));
        Ok(())
    }

    async fn claim_due_outbox(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, EngineError> {
        let mut inner = self.inner.lock().await;
        let mut due: Vec<Uuid> = inner
            .outbox
            .values()
            .filter(|(e, state)| *state == OutboxState::Pending && e.next_attempt_at <= now)
            .map(|(e, _)| e.id)
            .collect();
        due.sort();
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some((entry, state)) = inner.outbox.get_mut(&id) {
                *state = OutboxState::Processing;
                claimed.push(entry.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete_outbox(&self, id: Uuid) -> Result<(), EngineError> {
        self.inner.lock().await.outbox.remove(&id);
        Ok(())
    }

    async fn reschedule_outbox(
        &self,
        id: Uuid,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        if let Some((entry, state)) = inner.outbox.get_mut(&id) {
            entry.attempts = attempts;
            entry.next_attempt_at = next_attempt_at;
            entry.last_error = Some(error.to_string());
            *state = OutboxState::Pending;
        }
        Ok(())
    }

    async fn fail_outbox(&self, id: Uuid, error: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        if let Some((entry, state)) = inner.outbox.get_mut(&id) {
            entry.last_error = Some(error.to_string());
            *state = OutboxState::Dead;
        }
        Ok(())
    }

    async fn summary(&self) -> Result<PaymentSummary, EngineError> {
        let inner = self.inner.lock().await;
        let mut summary = PaymentSummary::default();
        for p in inner.payments.values() {
            summary.total_payments += 1;
            summary.total_amount_cents += p.money().amount().cents();
            summary.total_refunded_cents += p.total_refunded().cents();
            *summary
                .by_status
                .entry(p.status().as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(summary)
    }
}
