use crate::cli::ServeArgs;
use crate::infra::{AppState, StorageHandles};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use scheme_intake::config::AppConfig;
use scheme_intake::error::AppError;
use scheme_intake::intake::IntakeService;
use scheme_intake::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let handles = StorageHandles::open(&config.storage)?;
    let intake_service = Arc::new(
        handles
            .intake_service(config.verification.policy(), config.storage.retry_policy())
            .with_draft_ttl(config.drafts.idle_ttl()),
    );
    if let Some(ttl) = config.drafts.idle_ttl() {
        spawn_draft_sweeper(intake_service.clone(), ttl);
    }

    let app = with_service_routes(intake_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        render_dir = %config.storage.render_dir.display(),
        "scheme intake service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Abandoned drafts are otherwise only dropped when another request touches the map.
fn spawn_draft_sweeper(service: Arc<IntakeService>, ttl: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ttl.min(Duration::from_secs(60)));
        loop {
            ticker.tick().await;
            let evicted = service.evict_idle_drafts();
            if evicted > 0 {
                debug!(evicted, "idle drafts swept");
            }
        }
    });
}
