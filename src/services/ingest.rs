use {
    crate::domain::error::EngineError,
    crate::domain::ids::{EventId, PaymentId},
    crate::gateways::GatewayAdapter,
    crate::services::engine::{ApplyOutcome, PaymentEngine},
    axum::http::HeaderMap,
};

/// Terminal disposition of one webhook delivery. Everything except a
/// signature failure or a store outage acknowledges with success;
/// gateways retry on any non-2xx and none of these are their fault.
#[derive(Debug)]
pub enum IngestOutcome {
    Applied(PaymentId),
    /// Same-state or duplicate-at-the-ledger delivery; state unchanged.
    NoOp(PaymentId),
    /// Transition or sub-ledger rule rejected the event; logged as a
    /// conflict, acknowledged so the gateway stops redelivering.
    Rejected(PaymentId),
    /// Exact `(gateway, event_id)` already durably processed.
    Duplicate,
    /// Authenticated event for a payment we do not know.
    UnknownPayment,
    /// Authenticated but unmapped or unparseable event.
    Ignored,
}

impl IngestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::NoOp(_) => "no_op",
            Self::Rejected(_) => "rejected",
            Self::Duplicate => "duplicate",
            Self::UnknownPayment => "unknown_payment",
            Self::Ignored => "ignored",
        }
    }
}

/// Verify -> correlate -> normalize -> dedup -> apply. Arrival order is
/// untrusted; the transition table arbitrates whatever shows up.
pub async fn ingest_webhook(
    engine: &PaymentEngine,
    adapter: &dyn GatewayAdapter,
    headers: &HeaderMap,
    body: &str,
) -> Result<IngestOutcome, EngineError> {
    let gateway = adapter.gateway();

    // Authentication failures stop everything and are not business events.
    adapter.verify_signature(headers, body)?;

    let raw = match adapter.parse_event(headers, body) {
        Ok(raw) => raw,
        Err(EngineError::Validation(msg)) => {
            tracing::warn!(gateway = %gateway, "unparseable webhook payload: {msg}");
            return Ok(IngestOutcome::Ignored);
        }
        Err(EngineError::Serialization(e)) => {
            tracing::warn!(gateway = %gateway, error = %e, "webhook body is not valid JSON");
            return Ok(IngestOutcome::Ignored);
        }
        Err(e) => return Err(e),
    };

    let Some(key) = raw.provider_txn_id.as_deref() else {
        tracing::warn!(
            gateway = %gateway,
            event_id = %raw.event_id,
            event_type = %raw.event_name,
            "webhook carries no correlation key, acknowledged"
        );
        return Ok(IngestOutcome::UnknownPayment);
    };

    // A missing local record is not the gateway's fault; ack and log.
    let Some(payment) = engine.find_by_provider_key(gateway, key).await? else {
        tracing::warn!(
            gateway = %gateway,
            event_id = %raw.event_id,
            correlation_key = key,
            "webhook for unknown payment, acknowledged"
        );
        return Ok(IngestOutcome::UnknownPayment);
    };

    let Some(canonical) = adapter.canonical_event(&raw.event_name) else {
        tracing::info!(
            gateway = %gateway,
            event_id = %raw.event_id,
            event_type = %raw.event_name,
            "unmapped gateway event, acknowledged"
        );
        return Ok(IngestOutcome::Ignored);
    };

    let event_id = match EventId::new(raw.event_id.clone()) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(gateway = %gateway, error = %e, "garbage event id, acknowledged");
            return Ok(IngestOutcome::Ignored);
        }
    };

    if !engine.mark_event_processed(gateway, event_id.as_str()).await? {
        tracing::info!(
            gateway = %gateway,
            event_id = %raw.event_id,
            "duplicate delivery, already processed"
        );
        return Ok(IngestOutcome::Duplicate);
    }

    let payment_id = payment.payment_id();
    let actor = format!("webhook:{}", gateway.as_path());
    match engine
        .apply_canonical(payment_id, canonical, &raw, &actor)
        .await
    {
        Ok(ApplyOutcome::Applied(p)) => {
            tracing::info!(
                payment_id = %payment_id,
                event = %canonical,
                status = %p.status(),
                "canonical event applied"
            );
            Ok(IngestOutcome::Applied(payment_id))
        }
        Ok(ApplyOutcome::NoOp(_)) => {
            tracing::info!(payment_id = %payment_id, event = %canonical, "event was a no-op");
            Ok(IngestOutcome::NoOp(payment_id))
        }
        Err(
            EngineError::InvalidTransition { .. }
            | EngineError::Conflict(_)
            | EngineError::InsufficientRefundableAmount { .. }
            | EngineError::Validation(_),
        ) => {
            tracing::warn!(
                payment_id = %payment_id,
                event = %canonical,
                "canonical event rejected, logged as conflict"
            );
            Ok(IngestOutcome::Rejected(payment_id))
        }
        Err(EngineError::NotFound(msg)) => {
            tracing::warn!(payment_id = %payment_id, event = %canonical, "{msg}, acknowledged");
            Ok(IngestOutcome::Ignored)
        }
        Err(e) => Err(e),
    }
}
