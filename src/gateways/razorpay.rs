use {
    super::{GatewayAdapter, RawGatewayEvent, header_str, verify_hmac_sha256_hex},
    crate::domain::error::EngineError,
    crate::domain::event::{CanonicalEvent, Gateway},
    axum::http::HeaderMap,
};

/// `X-Razorpay-Signature` is HMAC-SHA256 hex over the raw body; the event
/// id travels in `X-Razorpay-Event-Id`.
pub struct RazorpayAdapter {
    webhook_secret: String,
}

impl RazorpayAdapter {
    pub fn new(webhook_secret: &str) -> Self {
        Self {
            webhook_secret: webhook_secret.to_string(),
        }
    }
}

impl GatewayAdapter for RazorpayAdapter {
    fn gateway(&self) -> Gateway {
        Gateway::Razorpay
    }

    fn verify_signature(&self, headers: &HeaderMap, body: &str) -> Result<(), EngineError> {
        let signature = header_str(headers, "X-Razorpay-Signature")?;
        verify_hmac_sha256_hex(&self.webhook_secret, body, signature)
    }

    fn parse_event(
        &self,
        headers: &HeaderMap,
        body: &str,
    ) -> Result<RawGatewayEvent, EngineError> {
        let event_id = headers
            .get("X-Razorpay-Event-Id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| EngineError::Validation("missing X-Razorpay-Event-Id".into()))?
            .to_string();

        let v: serde_json::Value = serde_json::from_str(body)?;
        let event_name = v
            .get("event")
            .and_then(|x| x.as_str())
            .ok_or_else(|| EngineError::Validation("razorpay event missing event".into()))?
            .to_string();

        let payment = v.pointer("/payload/payment/entity");
        let refund = v.pointer("/payload/refund/entity");
        let dispute = v.pointer("/payload/dispute/entity");

        let entity = refund.or(dispute).or(payment);
        let provider_txn_id = match (refund.or(dispute), payment) {
            // Refund/dispute entities point at their parent payment.
            (Some(sub), _) => sub.get("payment_id").and_then(|x| x.as_str()),
            (None, Some(p)) => p.get("id").and_then(|x| x.as_str()),
            (None, None) => None,
        }
        .map(String::from);

        Ok(RawGatewayEvent {
            event_id,
            event_name,
            provider_txn_id,
            amount_cents: entity.and_then(|e| e.get("amount")).and_then(|x| x.as_i64()),
            currency: entity
                .and_then(|e| e.get("currency"))
                .and_then(|x| x.as_str())
                .map(|c| c.to_ascii_uppercase()),
            gateway_refund_id: refund
                .and_then(|r| r.get("id"))
                .and_then(|x| x.as_str())
                .map(String::from),
            provider_dispute_id: dispute
                .and_then(|d| d.get("id"))
                .and_then(|x| x.as_str())
                .map(String::from),
            reason: entity
                .and_then(|e| e.get("reason_code").or_else(|| e.get("error_reason")))
                .and_then(|x| x.as_str())
                .map(String::from),
        })
    }

    fn canonical_event(&self, event_name: &str) -> Option<CanonicalEvent> {
        match event_name {
            "payment.authorized" => Some(CanonicalEvent::Authorized),
            "payment.captured" => Some(CanonicalEvent::Captured),
            "payment.failed" => Some(CanonicalEvent::Failed),
            "refund.created" => Some(CanonicalEvent::RefundCreated),
            "refund.processed" => Some(CanonicalEvent::RefundSettled),
            "refund.failed" => Some(CanonicalEvent::RefundFailed),
            "payment.dispute.created" => Some(CanonicalEvent::DisputeOpened),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_lifecycle_events() {
        let adapter = RazorpayAdapter::new("secret");
        assert_eq!(
            adapter.canonical_event("payment.captured"),
            Some(CanonicalEvent::Captured)
        );
        assert_eq!(
            adapter.canonical_event("refund.processed"),
            Some(CanonicalEvent::RefundSettled)
        );
        assert_eq!(adapter.canonical_event("order.paid"), None);
    }

    #[test]
    fn refund_payload_correlates_through_payment_id() {
        let adapter = RazorpayAdapter::new("secret");
        let mut headers = HeaderMap::new();
        headers.insert("X-Razorpay-Event-Id", "evt_rzp_1".parse().unwrap());
        let body = serde_json::json!({
            "event": "refund.processed",
            "payload": { "refund": { "entity": {
                "id": "rfnd_1",
                "payment_id": "pay_1",
                "amount": 2500,
                "currency": "inr",
            }}}
        })
        .to_string();

        let raw = adapter.parse_event(&headers, &body).unwrap();
        assert_eq!(raw.event_id, "evt_rzp_1");
        assert_eq!(raw.provider_txn_id.as_deref(), Some("pay_1"));
        assert_eq!(raw.gateway_refund_id.as_deref(), Some("rfnd_1"));
    }
}
