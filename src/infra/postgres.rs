use {
    super::store::{OutboxEntry, OutboxKind, PaymentStore, PaymentSummary},
    crate::domain::error::EngineError,
    crate::domain::event::Gateway,
    crate::domain::ids::PaymentId,
    crate::domain::payment::Payment,
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{PgPool, Row},
    uuid::Uuid,
};

/// Postgres-backed store. The aggregate is persisted as one JSONB document
/// per payment, with the indexed columns shadowing the fields queries
/// filter on; the version column carries the conditional-write guard.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_payment(doc: serde_json::Value) -> Result<Payment, EngineError> {
    Ok(serde_json::from_value(doc)?)
}

fn encode_version(version: u64) -> Result<i64, EngineError> {
    i64::try_from(version)
        .map_err(|_| EngineError::Store("version exceeds storage capacity".into()))
}

fn outbox_from_row(row: &sqlx::postgres::PgRow) -> Result<OutboxEntry, EngineError> {
    let kind: serde_json::Value = row.get("kind");
    let attempts: i32 = row.get("attempts");
    let max_attempts: i32 = row.get("max_attempts");
    Ok(OutboxEntry {
        id: row.get("id"),
        payment_id: PaymentId::from_uuid(row.get("payment_id")),
        kind: serde_json::from_value::<OutboxKind>(kind)?,
        attempts: attempts.max(0) as u32,
        max_attempts: max_attempts.max(0) as u32,
        next_attempt_at: row.get("next_attempt_at"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn insert(&self, payment: &Payment) -> Result<(), EngineError> {
        let doc = serde_json::to_value(payment)?;
        sqlx::query(
            r#"
            INSERT INTO payments
                (id, order_id, gateway, gateway_payment_id, provider_txn_id,
                 status, amount_cents, currency, expires_at, version, doc,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(payment.payment_id().as_uuid())
        .bind(payment.order_id().as_str())
        .bind(payment.gateway().as_str())
        .bind(payment.gateway_payment_id())
        .bind(payment.provider_txn_id())
        .bind(payment.status().as_str())
        .bind(payment.money().amount().cents())
        .bind(payment.money().currency().as_str())
        .bind(payment.expires_at())
        .bind(encode_version(payment.version())?)
        .bind(doc)
        .bind(payment.created_at())
        .bind(payment.updated_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>, EngineError> {
        let row = sqlx::query("SELECT doc FROM payments WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode_payment(r.get("doc"))).transpose()
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Vec<Payment>, EngineError> {
        let rows =
            sqlx::query("SELECT doc FROM payments WHERE order_id = $1 ORDER BY created_at")
                .bind(order_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|r| decode_payment(r.get("doc")))
            .collect()
    }

    async fn find_by_provider_key(
        &self,
        gateway: Gateway,
        key: &str,
    ) -> Result<Option<Payment>, EngineError> {
        let row = sqlx::query(
            r#"
            SELECT doc FROM payments
            WHERE gateway = $1 AND (gateway_payment_id = $2 OR provider_txn_id = $2)
            LIMIT 1
            "#,
        )
        .bind(gateway.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| decode_payment(r.get("doc"))).transpose()
    }

    async fn update(
        &self,
        payment: &Payment,
        expected_version: u64,
    ) -> Result<bool, EngineError> {
        let doc = serde_json::to_value(payment)?;
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $1, gateway_payment_id = $2, provider_txn_id = $3,
                expires_at = $4, version = $5, doc = $6, updated_at = $7
            WHERE id = $8 AND version = $9
            "#,
        )
        .bind(payment.status().as_str())
        .bind(payment.gateway_payment_id())
        .bind(payment.provider_txn_id())
        .bind(payment.expires_at())
        .bind(encode_version(payment.version())?)
        .bind(doc)
        .bind(payment.updated_at())
        .bind(payment.payment_id().as_uuid())
        .bind(encode_version(expected_version)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_pending(&self, id: PaymentId) -> Result<bool, EngineError> {
        let result = sqlx::query("DELETE FROM payments WHERE id = $1 AND status = 'PENDING'")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_event_processed(
        &self,
        gateway: Gateway,
        event_id: &str,
    ) -> Result<bool, EngineError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (gateway, event_id)
            VALUES ($1, $2)
            ON CONFLICT (gateway, event_id) DO NOTHING
            "#,
        )
        .bind(gateway.as_str())
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentId>, EngineError> {
        let rows = sqlx::query(
            "SELECT id FROM payments WHERE status = 'PENDING' AND expires_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| PaymentId::from_uuid(r.get("id")))
            .collect())
    }

    async fn enqueue_outbox(&self, entry: &OutboxEntry) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO outbox
                (id, payment_id, kind, attempts, max_attempts, next_attempt_at,
                 last_error, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.payment_id.as_uuid())
        .bind(serde_json::to_value(&entry.kind)?)
        .bind(entry.attempts as i32)
        .bind(entry.max_attempts as i32)
        .bind(entry.next_attempt_at)
        .bind(entry.last_error.as_deref())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_due_outbox(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, EngineError> {
        let rows = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'processing'
            WHERE id IN (
                SELECT id FROM outbox
                WHERE status = 'pending' AND next_attempt_at <= $1
                ORDER BY next_attempt_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, payment_id, kind, attempts, max_attempts,
                      next_attempt_at, last_error, created_at
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(outbox_from_row).collect()
    }

    async fn complete_outbox(&self, id: Uuid) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM outbox WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reschedule_outbox(
        &self,
        id: Uuid,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'pending', attempts = $1, next_attempt_at = $2, last_error = $3
            WHERE id = $4
            "#,
        )
        .bind(attempts as i32)
        .bind(next_attempt_at)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_outbox(&self, id: Uuid, error: &str) -> Result<(), EngineError> {
        sqlx::query("UPDATE outbox SET status = 'dead', last_error = $1 WHERE id = $2")
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn summary(&self) -> Result<PaymentSummary, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT status,
                   COUNT(*) AS count,
                   COALESCE(SUM(amount_cents), 0)::bigint AS amount,
                   COALESCE(SUM((doc->>'total_refunded')::bigint), 0)::bigint AS refunded
            FROM payments
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summary = PaymentSummary::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            let amount: i64 = row.get("amount");
            let refunded: i64 = row.get("refunded");
            summary.total_payments += count.max(0) as u64;
            summary.total_amount_cents += amount;
            summary.total_refunded_cents += refunded;
            summary.by_status.insert(status, count.max(0) as u64);
        }
        Ok(summary)
    }
}
