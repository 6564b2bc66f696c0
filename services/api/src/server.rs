use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryRegistrationBackend};
use crate::routes::with_registration_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use codekids::config::AppConfig;
use codekids::error::AppError;
use codekids::telemetry;
use codekids::workflows::registration::RegistrationService;
use std::sync::atomic::Ordering;
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let registration = config.registration.clone();
    if registration.verification.mode == codekids::config::VerificationMode::EmailLink {
        warn!("email_link verification enabled: links carry no proof of mailbox ownership");
    }
    let backend = Arc::new(InMemoryRegistrationBackend::default());
    let registration_service = Arc::new(RegistrationService::new(backend, registration));

    let app = with_registration_routes(registration_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "registration service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
