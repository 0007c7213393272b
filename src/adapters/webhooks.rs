use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::error::EngineError,
        domain::event::Gateway,
        services::ingest::ingest_webhook,
    },
    axum::{
        Json,
        extract::{Path, State},
        http::HeaderMap,
    },
};

/// `POST /webhooks/{gateway}`: 200 for anything authenticated and
/// (idempotently) processed or intentionally ignored, 400 only on
/// signature failure, 5xx only when the store is down.
#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(gateway = tracing::field::Empty, outcome = tracing::field::Empty)
)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let gateway = Gateway::try_from(gateway.as_str())
        .map_err(|_| EngineError::NotFound(format!("unknown gateway: {gateway}")))?;
    tracing::Span::current().record("gateway", tracing::field::display(gateway));

    let adapter = state.gateways.adapter_for(gateway);
    let outcome = ingest_webhook(&state.engine, adapter, &headers, &body).await?;
    tracing::Span::current().record("outcome", outcome.as_str());

    Ok(Json(serde_json::json!({ "status": outcome.as_str() })))
}
