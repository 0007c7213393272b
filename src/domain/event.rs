use {
    super::error::EngineError,
    super::payment::PaymentStatus,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// External provider that issued/owns a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gateway {
    Stripe,
    Razorpay,
    Paypal,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "STRIPE",
            Self::Razorpay => "RAZORPAY",
            Self::Paypal => "PAYPAL",
        }
    }

    /// Lowercase form used in webhook route paths and actor labels.
    pub fn as_path(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Razorpay => "razorpay",
            Self::Paypal => "paypal",
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Gateway {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_uppercase().as_str() {
            "STRIPE" => Ok(Self::Stripe),
            "RAZORPAY" => Ok(Self::Razorpay),
            "PAYPAL" => Ok(Self::Paypal),
            other => Err(EngineError::Validation(format!(
                "unknown gateway: {other}"
            ))),
        }
    }
}

/// The normalized, gateway-agnostic vocabulary of payment lifecycle facts.
/// Each gateway's native event names map into this enum through its
/// adapter's lookup table; the state machine only ever sees these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalEvent {
    Authorized,
    Captured,
    Failed,
    RefundCreated,
    RefundSettled,
    RefundFailed,
    DisputeOpened,
}

impl CanonicalEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorized => "AUTHORIZED",
            Self::Captured => "CAPTURED",
            Self::Failed => "FAILED",
            Self::RefundCreated => "REFUND_CREATED",
            Self::RefundSettled => "REFUND_SETTLED",
            Self::RefundFailed => "REFUND_FAILED",
            Self::DisputeOpened => "DISPUTE_OPENED",
        }
    }

    /// Status-level target for lifecycle events; refund/dispute events
    /// act on sub-ledgers instead.
    pub fn target_status(&self) -> Option<PaymentStatus> {
        match self {
            Self::Authorized => Some(PaymentStatus::Authorized),
            Self::Captured => Some(PaymentStatus::Completed),
            Self::Failed => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for CanonicalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
