use {
    super::error::EngineError,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Monetary value in minor units (cents, paise). Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MoneyAmount(i64);

impl MoneyAmount {
    pub fn new(cents: i64) -> Result<Self, EngineError> {
        if cents < 0 {
            return Err(EngineError::Validation(format!(
                "MoneyAmount cannot be negative, got: {cents}"
            )));
        }
        Ok(Self(cents))
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0.checked_add(other.0).map(MoneyAmount)
    }

    pub fn checked_sub(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0
            .checked_sub(other.0)
            .filter(|&v| v >= 0)
            .map(MoneyAmount)
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Inr,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Inr => "INR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Currency {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "INR" => Ok(Self::Inr),
            other => Err(EngineError::Validation(format!(
                "unknown currency: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: MoneyAmount,
    currency: Currency,
}

impl Money {
    pub fn new(amount: MoneyAmount, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn amount(&self) -> MoneyAmount {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }
}

/// Fee rates applied at payment creation. Basis points over the
/// authorized amount, plus a fixed per-transaction component.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub processing_bps: i64,
    pub processing_fixed_cents: i64,
    pub platform_bps: i64,
    /// Tax charged on the fee total, not on the payment amount.
    pub tax_bps: i64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            processing_bps: 290,
            processing_fixed_cents: 30,
            platform_bps: 100,
            tax_bps: 1800,
        }
    }
}

impl FeeSchedule {
    /// Deterministic: the same amount always yields the same fees.
    pub fn compute(&self, amount: MoneyAmount) -> Fees {
        let cents = amount.cents();
        let processing_fee = cents * self.processing_bps / 10_000 + self.processing_fixed_cents;
        let platform_fee = cents * self.platform_bps / 10_000;
        let tax_amount = (processing_fee + platform_fee) * self.tax_bps / 10_000;
        Fees {
            processing_fee,
            platform_fee,
            tax_amount,
            total_fees: processing_fee + platform_fee + tax_amount,
        }
    }
}

/// Computed once at creation; `total_fees = processing + platform + tax`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fees {
    pub processing_fee: i64,
    pub platform_fee: i64,
    pub tax_amount: i64,
    pub total_fees: i64,
}
