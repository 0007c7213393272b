use {
    super::payment::PaymentMethod,
    serde::{Deserialize, Serialize},
};

/// Weighted signals feeding the suspicion score. All thresholds are
/// explicit configuration; `RiskConfig::default()` matches production.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskConfig {
    pub high_amount_cents: i64,
    pub very_high_amount_cents: i64,
    pub high_amount_points: u8,
    pub very_high_amount_points: u8,
    /// Added once per prior failed attempt.
    pub attempt_penalty: u8,
    /// A capture this close to creation smells like card testing.
    pub fast_completion_secs: i64,
    pub fast_completion_points: u8,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_amount_cents: 50_000,
            very_high_amount_cents: 500_000,
            high_amount_points: 15,
            very_high_amount_points: 35,
            attempt_penalty: 10,
            fast_completion_secs: 5,
            fast_completion_points: 25,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RiskInput {
    pub amount_cents: i64,
    pub failed_attempts: u32,
    pub method: PaymentMethod,
    /// Seconds between creation and completion, once completed.
    pub completion_secs: Option<i64>,
}

fn method_base_risk(method: PaymentMethod) -> u8 {
    match method {
        PaymentMethod::Card => 10,
        PaymentMethod::Upi => 5,
        PaymentMethod::Netbanking => 5,
        PaymentMethod::Wallet => 15,
        PaymentMethod::BankTransfer => 0,
    }
}

/// Pure and deterministic; no I/O. Always returns a value in [0, 100].
pub fn calculate_risk_score(input: &RiskInput, cfg: &RiskConfig) -> u8 {
    let mut score: u32 = u32::from(method_base_risk(input.method));

    if input.amount_cents >= cfg.very_high_amount_cents {
        score = score.saturating_add(u32::from(cfg.very_high_amount_points));
    } else if input.amount_cents >= cfg.high_amount_cents {
        score = score.saturating_add(u32::from(cfg.high_amount_points));
    }

    score = score.saturating_add(
        input
            .failed_attempts
            .saturating_mul(u32::from(cfg.attempt_penalty)),
    );

    if let Some(secs) = input.completion_secs {
        if secs >= 0 && secs <= cfg.fast_completion_secs {
            score = score.saturating_add(u32::from(cfg.fast_completion_points));
        }
    }

    score.min(100) as u8
}
