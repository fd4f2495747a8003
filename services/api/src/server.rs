use crate::cli::ServeArgs;
use crate::infra::{build_review_service, AppState, InMemoryReviewService};
use crate::routes::with_review_routes;
use approval_engine::config::AppConfig;
use approval_engine::error::AppError;
use approval_engine::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(interval) = args.sweep_interval_secs.take() {
        config.review.sweep_interval_secs = interval;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let (review_service, _targets) = build_review_service(&config.review);
    if let Some(interval) = config.review.sweep_interval() {
        spawn_expiry_sweeper(review_service.clone(), interval);
    }

    let app = with_review_routes(review_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        payment_window_minutes = config.review.payment_window_minutes,
        sweep_interval_secs = config.review.sweep_interval_secs,
        "approval engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically expires overdue submissions so submitters hear back without a
/// reviewer having to open the queue.
fn spawn_expiry_sweeper(service: Arc<InMemoryReviewService>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match service.sweep_all(Utc::now()) {
                Ok(summaries) => {
                    for summary in summaries
                        .iter()
                        .filter(|summary| !summary.expired.is_empty() || !summary.failed.is_empty())
                    {
                        let pending_retry = summary
                            .dispatch
                            .iter()
                            .filter(|report| !report.is_complete())
                            .count();
                        info!(
                            kind = %summary.kind,
                            expired = summary.expired.len(),
                            failed = summary.failed.len(),
                            pending_retry,
                            "scheduled expiry sweep"
                        );
                    }
                }
                Err(err) => warn!(%err, "scheduled expiry sweep failed"),
            }
        }
    });
}
