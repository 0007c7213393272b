use {
    super::error::EngineError,
    super::ids::RefundId,
    super::money::MoneyAmount,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundReason {
    CustomerRequest,
    Duplicate,
    Fraudulent,
    OrderCancelled,
    Other,
}

impl RefundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerRequest => "CUSTOMER_REQUEST",
            Self::Duplicate => "DUPLICATE",
            Self::Fraudulent => "FRAUDULENT",
            Self::OrderCancelled => "ORDER_CANCELLED",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for RefundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RefundReason {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "CUSTOMER_REQUEST" => Ok(Self::CustomerRequest),
            "DUPLICATE" => Ok(Self::Duplicate),
            "FRAUDULENT" => Ok(Self::Fraudulent),
            "ORDER_CANCELLED" => Ok(Self::OrderCancelled),
            "OTHER" => Ok(Self::Other),
            other => Err(EngineError::Validation(format!(
                "unknown refund reason: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Gateways that settle in one step may skip `Processing`;
    /// a refund never regresses.
    pub fn can_transition_to(&self, next: &RefundStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RefundStatus {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(EngineError::Validation(format!(
                "unknown refund status: {other}"
            ))),
        }
    }
}

/// Sub-aggregate nested in a Payment. Created `PENDING`; the parent's
/// status only moves once the gateway confirms settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    refund_id: RefundId,
    /// External correlation key, absent until the gateway acknowledges.
    gateway_refund_id: Option<String>,
    amount: MoneyAmount,
    reason: RefundReason,
    status: RefundStatus,
    initiated_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl Refund {
    pub fn new(
        amount: MoneyAmount,
        reason: RefundReason,
        gateway_refund_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            refund_id: RefundId::generate(),
            gateway_refund_id,
            amount,
            reason,
            status: RefundStatus::Pending,
            initiated_at: now,
            processed_at: None,
        }
    }

    pub fn refund_id(&self) -> RefundId {
        self.refund_id
    }

    pub fn gateway_refund_id(&self) -> Option<&str> {
        self.gateway_refund_id.as_deref()
    }

    pub fn amount(&self) -> MoneyAmount {
        self.amount
    }

    pub fn reason(&self) -> RefundReason {
        self.reason
    }

    pub fn status(&self) -> RefundStatus {
        self.status
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub(crate) fn set_gateway_refund_id(&mut self, id: String) {
        self.gateway_refund_id = Some(id);
    }

    /// Advance this refund's own machine. Re-delivering the current
    /// status is a no-op (`Ok(false)`).
    pub(crate) fn advance(
        &mut self,
        next: RefundStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        if self.status == next {
            return Ok(false);
        }
        if !self.status.can_transition_to(&next) {
            return Err(EngineError::Validation(format!(
                "invalid refund transition: {} -> {}",
                self.status, next
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.processed_at = Some(now);
        }
        Ok(true)
    }
}
