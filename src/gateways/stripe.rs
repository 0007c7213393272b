use {
    super::{GatewayAdapter, RawGatewayEvent, header_str, verify_hmac_sha256_hex},
    crate::domain::error::EngineError,
    crate::domain::event::{CanonicalEvent, Gateway},
    axum::http::HeaderMap,
    chrono::Utc,
};

/// `Stripe-Signature: t=<unix>,v1=<hex>`: HMAC-SHA256 over "{t}.{body}",
/// with a replay-protection tolerance on the timestamp.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub struct StripeAdapter {
    webhook_secret: String,
}

impl StripeAdapter {
    pub fn new(webhook_secret: &str) -> Self {
        Self {
            webhook_secret: webhook_secret.to_string(),
        }
    }
}

impl GatewayAdapter for StripeAdapter {
    fn gateway(&self) -> Gateway {
        Gateway::Stripe
    }

    fn verify_signature(&self, headers: &HeaderMap, body: &str) -> Result<(), EngineError> {
        let header = header_str(headers, "Stripe-Signature")?;

        let mut timestamp = None;
        let mut signature = None;
        for part in header.split(',') {
            let mut kv = part.splitn(2, '=');
            match (kv.next(), kv.next()) {
                (Some("t"), Some(v)) => timestamp = Some(v),
                (Some("v1"), Some(v)) => signature = Some(v),
                _ => {}
            }
        }
        let timestamp = timestamp
            .ok_or_else(|| EngineError::SignatureInvalid("missing timestamp".into()))?;
        let signature = signature
            .ok_or_else(|| EngineError::SignatureInvalid("missing v1 signature".into()))?;

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| EngineError::SignatureInvalid("invalid timestamp".into()))?;
        if (Utc::now().timestamp() - ts).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(EngineError::SignatureInvalid(
                "timestamp outside tolerance".into(),
            ));
        }

        let signed_payload = format!("{timestamp}.{body}");
        verify_hmac_sha256_hex(&self.webhook_secret, &signed_payload, signature)
    }

    fn parse_event(
        &self,
        _headers: &HeaderMap,
        body: &str,
    ) -> Result<RawGatewayEvent, EngineError> {
        let v: serde_json::Value = serde_json::from_str(body)?;

        let event_id = v
            .get("id")
            .and_then(|x| x.as_str())
            .ok_or_else(|| EngineError::Validation("stripe event missing id".into()))?
            .to_string();
        let event_name = v
            .get("type")
            .and_then(|x| x.as_str())
            .ok_or_else(|| EngineError::Validation("stripe event missing type".into()))?
            .to_string();

        let object = v
            .pointer("/data/object")
            .ok_or_else(|| EngineError::Validation("stripe event missing data.object".into()))?;
        let object_kind = object.get("object").and_then(|x| x.as_str()).unwrap_or("");
        let object_id = object.get("id").and_then(|x| x.as_str());
        let payment_intent = object.get("payment_intent").and_then(|x| x.as_str());

        let (provider_txn_id, gateway_refund_id, provider_dispute_id) = match object_kind {
            "payment_intent" => (object_id.map(String::from), None, None),
            "refund" => (
                payment_intent.map(String::from),
                object_id.map(String::from),
                None,
            ),
            "dispute" => (
                payment_intent.map(String::from),
                None,
                object_id.map(String::from),
            ),
            _ => (
                payment_intent.or(object_id).map(String::from),
                None,
                None,
            ),
        };

        Ok(RawGatewayEvent {
            event_id,
            event_name,
            provider_txn_id,
            amount_cents: object.get("amount").and_then(|x| x.as_i64()),
            currency: object
                .get("currency")
                .and_then(|x| x.as_str())
                .map(|c| c.to_ascii_uppercase()),
            gateway_refund_id,
            provider_dispute_id,
            reason: object
                .get("reason")
                .and_then(|x| x.as_str())
                .map(String::from),
        })
    }

    fn canonical_event(&self, event_name: &str) -> Option<CanonicalEvent> {
        match event_name {
            "payment_intent.amount_capturable_updated" => Some(CanonicalEvent::Authorized),
            "payment_intent.succeeded" => Some(CanonicalEvent::Captured),
            "payment_intent.payment_failed" | "payment_intent.canceled" => {
                Some(CanonicalEvent::Failed)
            }
            "refund.created" => Some(CanonicalEvent::RefundCreated),
            "charge.refund.updated" => Some(CanonicalEvent::RefundSettled),
            "refund.failed" => Some(CanonicalEvent::RefundFailed),
            "charge.dispute.created" => Some(CanonicalEvent::DisputeOpened),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_capture_and_failure_events() {
        let adapter = StripeAdapter::new("whsec_test");
        assert_eq!(
            adapter.canonical_event("payment_intent.succeeded"),
            Some(CanonicalEvent::Captured)
        );
        assert_eq!(
            adapter.canonical_event("payment_intent.payment_failed"),
            Some(CanonicalEvent::Failed)
        );
        assert_eq!(adapter.canonical_event("charge.updated"), None);
    }

    #[test]
    fn refund_event_links_back_to_payment_intent() {
        let adapter = StripeAdapter::new("whsec_test");
        let body = serde_json::json!({
            "id": "evt_1",
            "type": "refund.created",
            "data": { "object": {
                "object": "refund",
                "id": "re_1",
                "payment_intent": "pi_1",
                "amount": 4000,
                "currency": "usd",
                "reason": "requested_by_customer",
            }}
        })
        .to_string();

        let raw = adapter.parse_event(&HeaderMap::new(), &body).unwrap();
        assert_eq!(raw.provider_txn_id.as_deref(), Some("pi_1"));
        assert_eq!(raw.gateway_refund_id.as_deref(), Some("re_1"));
        assert_eq!(raw.amount_cents, Some(4000));
        assert_eq!(raw.currency.as_deref(), Some("USD"));
    }
}
