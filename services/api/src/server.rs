use crate::cli::ServeArgs;
use crate::infra::{build_renewal_service, AppState};
use crate::routes::with_renewal_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use scholarship_renewal::config::AppConfig;
use scholarship_renewal::error::AppError;
use scholarship_renewal::telemetry;
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

    let renewal_service = build_renewal_service(&config.renewal);

    let app = with_renewal_routes(renewal_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        window_days = config.renewal.window_days,
        pinned_today = ?config.renewal.fixed_today,
        "scholarship renewal service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
