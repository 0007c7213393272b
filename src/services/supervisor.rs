use {
    crate::infra::store::{OutboxKind, PaymentStore},
    crate::services::engine::{OrderCollaborator, PaymentEngine},
    chrono::{Duration as ChronoDuration, Utc},
    std::sync::Arc,
    std::time::Duration,
    tokio::sync::watch,
};

/// Sweep PENDING payments past their TTL into EXPIRED.
pub async fn run_expiry_sweep(
    engine: Arc<PaymentEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("expiry sweep started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("expiry sweep shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match engine.expire_due(Utc::now()).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "expired stale pending payments"),
            Err(e) => tracing::error!(error = %e, "expiry sweep error"),
        }
    }
}

/// Drain deferred Order-collaborator notifications. Exponential backoff
/// per entry; the attempt cap parks the entry as dead for investigation.
pub async fn run_outbox_relay(
    store: Arc<dyn PaymentStore>,
    orders: Arc<dyn OrderCollaborator>,
    call_timeout: Duration,
    batch: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("outbox relay started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("outbox relay shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }

        if let Err(e) = relay_once(&*store, &*orders, call_timeout, batch).await {
            tracing::error!(error = %e, "outbox relay error");
        }
    }
}

async fn relay_once(
    store: &dyn PaymentStore,
    orders: &dyn OrderCollaborator,
    call_timeout: Duration,
    batch: usize,
) -> Result<(), crate::domain::error::EngineError> {
    let now = Utc::now();
    let entries = store.claim_due_outbox(now, batch).await?;

    for entry in entries {
        let call = async {
            match &entry.kind {
                OutboxKind::OrderPaid { order_id } => {
                    let order_id = crate::domain::ids::OrderId::new(order_id.clone())
                        .map_err(|e| e.to_string())?;
                    orders.mark_paid(&order_id).await
                }
                OutboxKind::OrderPaymentFailed { order_id, reason } => {
                    let order_id = crate::domain::ids::OrderId::new(order_id.clone())
                        .map_err(|e| e.to_string())?;
                    orders.mark_payment_failed(&order_id, reason).await
                }
            }
        };

        let result = match tokio::time::timeout(call_timeout, call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(msg)) => Err(msg),
            Err(_) => Err("order collaborator timed out".to_string()),
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    outbox_id = %entry.id,
                    payment_id = %entry.payment_id,
                    "order notification delivered"
                );
                store.complete_outbox(entry.id).await?;
            }
            Err(msg) => {
                let attempts = entry.attempts + 1;
                if attempts >= entry.max_attempts {
                    tracing::error!(
                        outbox_id = %entry.id,
                        payment_id = %entry.payment_id,
                        error = %msg,
                        "order notification exhausted retries"
                    );
                    store.fail_outbox(entry.id, &msg).await?;
                } else {
                    let backoff = ChronoDuration::seconds(1i64 << attempts.min(10));
                    tracing::warn!(
                        outbox_id = %entry.id,
                        payment_id = %entry.payment_id,
                        attempts,
                        error = %msg,
                        "order notification failed, rescheduled"
                    );
                    store
                        .reschedule_outbox(entry.id, attempts, now + backoff, &msg)
                        .await?;
                }
            }
        }
    }

    Ok(())
}
