use {
    crate::domain::error::EngineError,
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
};

/// Newtype over the domain error so the HTTP mapping lives in this layer.
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self(EngineError::Serialization(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, extra) = match &self.0 {
            EngineError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
                serde_json::Value::Null,
            ),
            EngineError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
                serde_json::Value::Null,
            ),
            EngineError::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                "invalid_transition",
                format!("transition {from} -> {to} is not allowed"),
                serde_json::json!({ "current_status": from.as_str() }),
            ),
            EngineError::InsufficientRefundableAmount {
                requested,
                refundable,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_refundable_amount",
                format!("requested {requested} exceeds refundable {refundable}"),
                serde_json::json!({ "requested": requested, "refundable": refundable }),
            ),
            EngineError::SignatureInvalid(msg) => {
                // Potential security event: log the detail, return a
                // generic response.
                tracing::warn!("webhook signature rejected: {msg}");
                (
                    StatusCode::BAD_REQUEST,
                    "webhook_error",
                    "invalid webhook signature".to_string(),
                    serde_json::Value::Null,
                )
            }
            EngineError::Conflict(msg) => (
                StatusCode::CONFLICT,
                "conflict",
                msg.clone(),
                serde_json::Value::Null,
            ),
            EngineError::Store(msg) => {
                tracing::error!("store error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                    serde_json::Value::Null,
                )
            }
            EngineError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                    serde_json::Value::Null,
                )
            }
            EngineError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                    serde_json::Value::Null,
                )
            }
        };

        let mut body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });
        if let (Some(obj), serde_json::Value::Object(extra)) = (body.as_object_mut(), extra) {
            obj.extend(extra);
        }

        (status, Json(body)).into_response()
    }
}
