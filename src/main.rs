use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    pay_ledger::{
        AppState,
        adapters::{api, webhooks},
        config::AppConfig,
        gateways::GatewayAdapters,
        infra::postgres::PgStore,
        infra::store::PaymentStore,
        services::engine::{
            LoggingNotificationSink, LoggingOrderCollaborator, OrderCollaborator, PaymentEngine,
        },
        services::supervisor::{run_expiry_sweep, run_outbox_relay},
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::{signal, sync::watch},
    tower_http::timeout::TimeoutLayer,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let store: Arc<dyn PaymentStore> = Arc::new(PgStore::new(pool));
    let orders: Arc<dyn OrderCollaborator> = Arc::new(LoggingOrderCollaborator);
    let engine = Arc::new(PaymentEngine::new(
        Arc::clone(&store),
        Arc::clone(&orders),
        Arc::new(LoggingNotificationSink),
        config.engine,
    ));
    let gateways = Arc::new(GatewayAdapters::new(&config.secrets));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(run_expiry_sweep(
        Arc::clone(&engine),
        Duration::from_secs(60),
        shutdown_rx.clone(),
    ));
    tokio::spawn(run_outbox_relay(
        Arc::clone(&store),
        orders,
        Duration::from_millis(config.engine.notify_timeout_ms),
        config.engine.outbox_batch,
        shutdown_rx,
    ));

    let state = AppState { engine, gateways };

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route(
            "/webhooks/{gateway}",
            post(webhooks::webhook_handler).layer(DefaultBodyLimit::max(64 * 1024)),
        )
        .route("/payments", post(api::create_payment))
        .route("/payments/summary", get(api::payments_summary))
        .route("/payments/bulk/status", post(api::bulk_update_status))
        .route("/payments/bulk/cancel", post(api::bulk_cancel))
        .route(
            "/payments/{id}",
            get(api::get_payment).delete(api::purge_payment),
        )
        .route(
            "/payments/by-order/{order_id}",
            get(api::get_payments_by_order),
        )
        .route(
            "/payments/by-provider/{gateway}/{key}",
            get(api::get_payment_by_provider),
        )
        .route("/payments/{id}/status", post(api::update_status))
        .route("/payments/{id}/capture", post(api::capture_payment))
        .route("/payments/{id}/refunds", post(api::add_refund))
        .route(
            "/payments/{id}/refunds/{refund_id}/status",
            post(api::update_refund_status),
        )
        .route("/payments/{id}/disputes", post(api::add_dispute))
        .route(
            "/payments/{id}/disputes/{dispute_id}/resolve",
            post(api::resolve_dispute),
        )
        .route("/payments/{id}/risk", get(api::risk_score))
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .unwrap();
}

async fn shutdown_signal(tx: watch::Sender<bool>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
    let _ = tx.send(true);
}
