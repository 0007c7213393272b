use {
    super::{GatewayAdapter, RawGatewayEvent, header_str, verify_hmac_sha256_hex},
    crate::domain::error::EngineError,
    crate::domain::event::{CanonicalEvent, Gateway},
    axum::http::HeaderMap,
};

/// Shared-secret variant of PayPal's transmission signature: HMAC-SHA256
/// over `"{transmission_id}|{transmission_time}|{webhook_id}|{body}"`.
/// The cert-chain verification flow stays outside this crate's scope.
pub struct PaypalAdapter {
    webhook_secret: String,
    webhook_id: String,
}

impl PaypalAdapter {
    pub fn new(webhook_secret: &str, webhook_id: &str) -> Self {
        Self {
            webhook_secret: webhook_secret.to_string(),
            webhook_id: webhook_id.to_string(),
        }
    }
}

impl GatewayAdapter for PaypalAdapter {
    fn gateway(&self) -> Gateway {
        Gateway::Paypal
    }

    fn verify_signature(&self, headers: &HeaderMap, body: &str) -> Result<(), EngineError> {
        let transmission_id = header_str(headers, "Paypal-Transmission-Id")?;
        let transmission_time = header_str(headers, "Paypal-Transmission-Time")?;
        let signature = header_str(headers, "Paypal-Transmission-Sig")?;

        let message = format!(
            "{transmission_id}|{transmission_time}|{}|{body}",
            self.webhook_id
        );
        verify_hmac_sha256_hex(&self.webhook_secret, &message, signature)
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
            .ok_or_else(|| EngineError::Validation("paypal event missing id".into()))?
            .to_string();
        let event_name = v
            .get("event_type")
            .and_then(|x| x.as_str())
            .ok_or_else(|| EngineError::Validation("paypal event missing event_type".into()))?
            .to_string();

        let resource = v
            .get("resource")
            .ok_or_else(|| EngineError::Validation("paypal event missing resource".into()))?;
        let resource_id = resource.get("id").and_then(|x| x.as_str());
        let related_order = resource
            .pointer("/supplementary_data/related_ids/order_id")
            .and_then(|x| x.as_str());

        let is_refund = event_name == "PAYMENT.CAPTURE.REFUNDED";
        let is_dispute = event_name.starts_with("CUSTOMER.DISPUTE");

        let provider_txn_id = if is_dispute {
            resource
                .pointer("/disputed_transactions/0/seller_transaction_id")
                .and_then(|x| x.as_str())
        } else {
            related_order.or(resource_id)
        }
        .map(String::from);

        let amount_cents = resource
            .pointer("/amount/value")
            .or_else(|| resource.pointer("/dispute_amount/value"))
            .and_then(|x| x.as_str())
            .and_then(parse_decimal_cents);
        let currency = resource
            .pointer("/amount/currency_code")
            .or_else(|| resource.pointer("/dispute_amount/currency_code"))
            .and_then(|x| x.as_str())
            .map(String::from);

        Ok(RawGatewayEvent {
            event_id,
            event_name,
            provider_txn_id,
            amount_cents,
            currency,
            gateway_refund_id: if is_refund {
                resource_id.map(String::from)
            } else {
                None
            },
            provider_dispute_id: if is_dispute {
                resource
                    .get("dispute_id")
                    .and_then(|x| x.as_str())
                    .or(resource_id)
                    .map(String::from)
            } else {
                None
            },
            reason: resource
                .get("reason")
                .and_then(|x| x.as_str())
                .map(String::from),
        })
    }

    fn canonical_event(&self, event_name: &str) -> Option<CanonicalEvent> {
        match event_name {
            "PAYMENT.AUTHORIZATION.CREATED" => Some(CanonicalEvent::Authorized),
            "PAYMENT.CAPTURE.COMPLETED" => Some(CanonicalEvent::Captured),
            "PAYMENT.CAPTURE.DENIED" => Some(CanonicalEvent::Failed),
            // PayPal settles refunds in a single event; the engine creates
            // the refund entry on the fly when none exists yet.
            "PAYMENT.CAPTURE.REFUNDED" => Some(CanonicalEvent::RefundSettled),
            "CUSTOMER.DISPUTE.CREATED" => Some(CanonicalEvent::DisputeOpened),
            _ => None,
        }
    }
}

/// `"10.00"` -> `1000`. Rejects malformed or over-precise values.
fn parse_decimal_cents(s: &str) -> Option<i64> {
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if frac.len() > 2 {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<2}");
        padded.parse().ok()?
    };
    if whole < 0 {
        return None;
    }
    whole.checked_mul(100)?.checked_add(frac)
}
