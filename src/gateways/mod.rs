use {
    crate::config::WebhookSecrets,
    crate::domain::error::EngineError,
    crate::domain::event::{CanonicalEvent, Gateway},
    axum::http::HeaderMap,
    hmac::{Hmac, Mac},
    sha2::Sha256,
};

pub mod paypal;
pub mod razorpay;
pub mod stripe;

pub use {paypal::PaypalAdapter, razorpay::RazorpayAdapter, stripe::StripeAdapter};

type HmacSha256 = Hmac<Sha256>;

/// Minimal normalized shape of one inbound gateway event: just enough to
/// authenticate, correlate and classify it. Full wire formats stay at the
/// adapter boundary.
#[derive(Debug, Clone)]
pub struct RawGatewayEvent {
    pub event_id: String,
    pub event_name: String,
    /// Correlation key routing this event to a local Payment.
    pub provider_txn_id: Option<String>,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub gateway_refund_id: Option<String>,
    pub provider_dispute_id: Option<String>,
    pub reason: Option<String>,
}

pub trait GatewayAdapter: Send + Sync {
    fn gateway(&self) -> Gateway;

    /// Cryptographic authenticity check against the gateway-specific
    /// secret. Failure means the request is not processed at all.
    fn verify_signature(&self, headers: &HeaderMap, body: &str) -> Result<(), EngineError>;

    fn parse_event(&self, headers: &HeaderMap, body: &str)
    -> Result<RawGatewayEvent, EngineError>;

    /// Native event name -> canonical vocabulary. `None` means the event
    /// is acknowledged but intentionally ignored.
    fn canonical_event(&self, event_name: &str) -> Option<CanonicalEvent>;
}

/// One adapter per supported gateway, built once from configuration.
pub struct GatewayAdapters {
    stripe: StripeAdapter,
    razorpay: RazorpayAdapter,
    paypal: PaypalAdapter,
}

impl GatewayAdapters {
    pub fn new(secrets: &WebhookSecrets) -> Self {
        Self {
            stripe: StripeAdapter::new(&secrets.stripe),
            razorpay: RazorpayAdapter::new(&secrets.razorpay),
            paypal: PaypalAdapter::new(&secrets.paypal, &secrets.paypal_webhook_id),
        }
    }

    pub fn adapter_for(&self, gateway: Gateway) -> &dyn GatewayAdapter {
        match gateway {
            Gateway::Stripe => &self.stripe,
            Gateway::Razorpay => &self.razorpay,
            Gateway::Paypal => &self.paypal,
        }
    }
}

/// Constant-time comparison against a hex-encoded expected signature.
pub(crate) fn verify_hmac_sha256_hex(
    secret: &str,
    message: &str,
    expected_hex: &str,
) -> Result<(), EngineError> {
    let expected = hex::decode(expected_hex)
        .map_err(|_| EngineError::SignatureInvalid("signature is not valid hex".into()))?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| EngineError::SignatureInvalid("signature mismatch".into()))
}

pub(crate) fn header_str<'a>(
    headers: &'a HeaderMap,
    name: &str,
) -> Result<&'a str, EngineError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| EngineError::SignatureInvalid(format!("missing {name} header")))
}
