use {super::payment::PaymentStatus, thiserror::Error};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("insufficient refundable amount: requested {requested}, refundable {refundable}")]
    InsufficientRefundableAmount { requested: i64, refundable: i64 },

    #[error("webhook signature: {0}")]
    SignatureInvalid(String),

    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    #[error("store: {0}")]
    Store(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
