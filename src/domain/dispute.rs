use {
    super::error::EngineError,
    super::ids::DisputeId,
    super::money::MoneyAmount,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    Won,
    Lost,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Won => "WON",
            Self::Lost => "LOST",
        }
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeOutcome {
    Won,
    Lost,
}

impl DisputeOutcome {
    pub fn as_status(&self) -> DisputeStatus {
        match self {
            Self::Won => DisputeStatus::Won,
            Self::Lost => DisputeStatus::Lost,
        }
    }
}

impl TryFrom<&str> for DisputeOutcome {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "WON" => Ok(Self::Won),
            "LOST" => Ok(Self::Lost),
            other => Err(EngineError::Validation(format!(
                "unknown dispute outcome: {other}"
            ))),
        }
    }
}

/// Chargeback claim against a payment. Independent of the payment's own
/// status machine; resolution never forces a payment status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    dispute_id: DisputeId,
    amount: MoneyAmount,
    reason: String,
    provider_dispute_id: Option<String>,
    status: DisputeStatus,
    opened_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn new(
        amount: MoneyAmount,
        reason: impl Into<String>,
        provider_dispute_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            dispute_id: DisputeId::generate(),
            amount,
            reason: reason.into(),
            provider_dispute_id,
            status: DisputeStatus::Open,
            opened_at: now,
            resolved_at: None,
        }
    }

    pub fn dispute_id(&self) -> DisputeId {
        self.dispute_id
    }

    pub fn amount(&self) -> MoneyAmount {
        self.amount
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn provider_dispute_id(&self) -> Option<&str> {
        self.provider_dispute_id.as_deref()
    }

    pub fn status(&self) -> DisputeStatus {
        self.status
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    /// Resolving an already-resolved dispute with the same outcome is a
    /// no-op (`Ok(false)`); a different outcome is rejected.
    pub(crate) fn resolve(
        &mut self,
        outcome: DisputeOutcome,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let target = outcome.as_status();
        if self.status == target {
            return Ok(false);
        }
        if self.status != DisputeStatus::Open {
            return Err(EngineError::Validation(format!(
                "dispute {} already resolved as {}",
                self.dispute_id, self.status
            )));
        }
        self.status = target;
        self.resolved_at = Some(now);
        Ok(true)
    }
}
