pub mod adapters;
pub mod config;
pub mod domain;
pub mod gateways;
pub mod infra;
pub mod services;

use {crate::gateways::GatewayAdapters, crate::services::engine::PaymentEngine, std::sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PaymentEngine>,
    pub gateways: Arc<GatewayAdapters>,
}
