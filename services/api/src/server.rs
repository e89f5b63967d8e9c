use crate::cli::ServeArgs;
use crate::infra::{seed_desk, AppState, TracingNotifier};
use crate::routes::with_lending_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use loan_desk::config::AppConfig;
use loan_desk::error::AppError;
use loan_desk::lending::{scheduler, InMemoryDocumentIntake, InMemoryLendingStore, LendingService};
use loan_desk::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(config.environment, &config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = Arc::new(LendingService::new(
        Arc::new(InMemoryLendingStore::new()),
        Arc::new(TracingNotifier),
        Arc::new(InMemoryDocumentIntake::new()),
        config.lending.clone(),
    ));
    if args.seed {
        seed_desk(&service)?;
    }

    let sweepers = scheduler::spawn(service.clone(), &config.scheduler);

    let app = with_lending_routes(service, config.server.request_timeout)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        sweepers = sweepers.task_count(),
        "loan desk ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(readiness_flag))
        .await?;

    sweepers.shutdown().await;
    info!("loan desk stopped");
    Ok(())
}

async fn shutdown_signal(readiness: Arc<AtomicBool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    readiness.store(false, Ordering::Release);
    info!("shutdown requested, draining connections");
}
