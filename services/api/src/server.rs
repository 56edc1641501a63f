use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryAuditLog, InMemoryJobStore, InMemoryObjectRegistry, InMemoryPricebookStore,
};
use crate::routes::with_ops_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use glassline::config::AppConfig;
use glassline::error::AppError;
use glassline::telemetry;
use glassline::workflows::jobs::{hook_router, UploadLifecycle};
use glassline::workflows::pricing::{pricing_router, PricingService};
use glassline::workflows::stream::{stream_router, StatusStream};
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

    let jobs = Arc::new(InMemoryJobStore::default());
    let objects = Arc::new(InMemoryObjectRegistry::default());
    let pricebooks = Arc::new(InMemoryPricebookStore::default());
    let audit = Arc::new(InMemoryAuditLog::default());

    let lifecycle = Arc::new(UploadLifecycle::new(jobs.clone(), objects, &config.uploads));
    let pricing = Arc::new(PricingService::new(pricebooks, jobs.clone(), audit));
    let stream = Arc::new(StatusStream::new(jobs, &config.stream));

    let app = with_ops_routes(
        hook_router(lifecycle)
            .merge(pricing_router(pricing))
            .merge(stream_router(stream)),
    )
    .layer(Extension(app_state))
    .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "quote pipeline service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
