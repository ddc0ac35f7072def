use crate::cli::ServeArgs;
use crate::infra::{AppState, LogNotificationPublisher};
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lead_exchange::config::AppConfig;
use lead_exchange::error::AppError;
use lead_exchange::marketplace::{InMemoryMarketplaceStore, Marketplace};
use lead_exchange::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let marketplace = Arc::new(Marketplace::new(
        Arc::new(InMemoryMarketplaceStore::default()),
        Arc::new(LogNotificationPublisher),
        config.marketplace.clone(),
    ));
    let sweeper = tokio::spawn(
        marketplace
            .sweeper()
            .run(config.marketplace.sweep_interval),
    );

    let app = with_marketplace_routes(marketplace)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        sweep_interval_secs = config.marketplace.sweep_interval.as_secs(),
        "lead exchange ready"
    );

    let served = axum::serve(listener, app).await;
    sweeper.abort();
    served?;
    Ok(())
}
