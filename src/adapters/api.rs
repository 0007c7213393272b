use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::dispute::DisputeOutcome,
        domain::event::Gateway,
        domain::ids::{DisputeId, OrderId, PaymentId, RefundId},
        domain::money::{Currency, Money, MoneyAmount},
        domain::payment::{PaymentMethod, PaymentStatus},
        domain::refund::{RefundReason, RefundStatus},
        services::engine::CreatePayment,
    },
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
    },
    serde::Deserialize,
    uuid::Uuid,
};

const API_ACTOR: &str = "api";

#[derive(Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub gateway: String,
    pub method: String,
    pub gateway_payment_id: Option<String>,
    pub provider_txn_id: Option<String>,
}

pub async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let payment = state
        .engine
        .create_payment(CreatePayment {
            order_id: OrderId::new(req.order_id)?,
            money: Money::new(
                MoneyAmount::new(req.amount_cents)?,
                Currency::try_from(req.currency.as_str())?,
            ),
            gateway: Gateway::try_from(req.gateway.as_str())?,
            method: PaymentMethod::try_from(req.method.as_str())?,
            gateway_payment_id: req.gateway_payment_id,
            provider_txn_id: req.provider_txn_id,
            actor: API_ACTOR.into(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(&payment)?)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payment = state.engine.get_payment(PaymentId::from_uuid(id)).await?;
    Ok(Json(serde_json::to_value(&payment)?))
}

pub async fn get_payments_by_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payments = state.engine.find_by_order(&order_id).await?;
    Ok(Json(serde_json::to_value(&payments)?))
}

pub async fn get_payment_by_provider(
    State(state): State<AppState>,
    Path((gateway, key)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let gateway = Gateway::try_from(gateway.as_str())?;
    let payment = state
        .engine
        .find_by_provider_key(gateway, &key)
        .await?
        .ok_or_else(|| {
            crate::domain::error::EngineError::NotFound(format!(
                "no payment for provider key {key}"
            ))
        })?;
    Ok(Json(serde_json::to_value(&payment)?))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub note: Option<String>,
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let target = PaymentStatus::try_from(req.status.as_str())?;
    let outcome = state
        .engine
        .apply_status(PaymentId::from_uuid(id), target, API_ACTOR, req.note)
        .await?;
    Ok(Json(serde_json::to_value(outcome.payment())?))
}

pub async fn capture_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .engine
        .capture(PaymentId::from_uuid(id), API_ACTOR)
        .await?;
    Ok(Json(serde_json::to_value(outcome.payment())?))
}

#[derive(Deserialize)]
pub struct AddRefundRequest {
    pub amount_cents: i64,
    pub reason: String,
}

pub async fn add_refund(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddRefundRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let refund = state
        .engine
        .add_refund(
            PaymentId::from_uuid(id),
            MoneyAmount::new(req.amount_cents)?,
            RefundReason::try_from(req.reason.as_str())?,
            API_ACTOR,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(&refund)?)))
}

#[derive(Deserialize)]
pub struct UpdateRefundStatusRequest {
    pub status: String,
    pub gateway_refund_id: Option<String>,
}

pub async fn update_refund_status(
    State(state): State<AppState>,
    Path((id, refund_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateRefundStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payment = state
        .engine
        .update_refund_status(
            PaymentId::from_uuid(id),
            RefundId::from_uuid(refund_id),
            RefundStatus::try_from(req.status.as_str())?,
            req.gateway_refund_id,
            API_ACTOR,
        )
        .await?;
    Ok(Json(serde_json::to_value(&payment)?))
}

#[derive(Deserialize)]
pub struct AddDisputeRequest {
    pub amount_cents: i64,
    pub reason: String,
    pub provider_dispute_id: Option<String>,
}

pub async fn add_dispute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddDisputeRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let dispute = state
        .engine
        .add_dispute(
            PaymentId::from_uuid(id),
            MoneyAmount::new(req.amount_cents)?,
            req.reason,
            req.provider_dispute_id,
            API_ACTOR,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(&dispute)?)))
}

#[derive(Deserialize)]
pub struct ResolveDisputeRequest {
    pub outcome: String,
    pub note: Option<String>,
}

pub async fn resolve_dispute(
    State(state): State<AppState>,
    Path((id, dispute_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ResolveDisputeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payment = state
        .engine
        .resolve_dispute(
            PaymentId::from_uuid(id),
            DisputeId::from_uuid(dispute_id),
            DisputeOutcome::try_from(req.outcome.as_str())?,
            req.note,
            API_ACTOR,
        )
        .await?;
    Ok(Json(serde_json::to_value(&payment)?))
}

pub async fn risk_score(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let score = state.engine.risk_score(PaymentId::from_uuid(id)).await?;
    Ok(Json(serde_json::json!({
        "payment_id": id,
        "risk_score": score,
    })))
}

#[derive(Deserialize)]
pub struct BulkStatusRequest {
    pub payment_ids: Vec<Uuid>,
    pub status: String,
    pub note: Option<String>,
}

pub async fn bulk_update_status(
    State(state): State<AppState>,
    Json(req): Json<BulkStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let target = PaymentStatus::try_from(req.status.as_str())?;
    let ids: Vec<PaymentId> = req.payment_ids.into_iter().map(PaymentId::from_uuid).collect();
    let results = state
        .engine
        .bulk_apply(&ids, target, API_ACTOR, req.note)
        .await;
    Ok(Json(serde_json::to_value(&results)?))
}

#[derive(Deserialize)]
pub struct BulkCancelRequest {
    pub payment_ids: Vec<Uuid>,
}

pub async fn bulk_cancel(
    State(state): State<AppState>,
    Json(req): Json<BulkCancelRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ids: Vec<PaymentId> = req.payment_ids.into_iter().map(PaymentId::from_uuid).collect();
    let results = state.engine.bulk_cancel(&ids, API_ACTOR).await;
    Ok(Json(serde_json::to_value(&results)?))
}

pub async fn payments_summary(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let summary = state.engine.summary().await?;
    Ok(Json(serde_json::to_value(&summary)?))
}

pub async fn purge_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.engine.purge_pending(PaymentId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
