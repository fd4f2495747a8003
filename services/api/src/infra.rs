use approval_engine::config::ReviewConfig;
use approval_engine::workflows::approvals::{
    ExpiryPolicy, InMemorySubmissionStore, InMemoryTargets, OutboundMessage, OutboundMessenger,
    ReviewService, SideEffectTargets, SinkError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type InMemoryReviewService = ReviewService<InMemorySubmissionStore>;

/// Stands in for an email gateway: every outbound message becomes a log line.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingMessenger;

impl OutboundMessenger for LoggingMessenger {
    fn send(&self, message: OutboundMessage) -> Result<(), SinkError> {
        info!(
            key = %message.key,
            recipient = %message.recipient_id,
            subject = %message.subject,
            "outbound message queued"
        );
        Ok(())
    }
}

/// In-memory review service wired from configuration. The concrete targets are
/// returned alongside so callers can inspect what dispatch wrote.
pub(crate) fn build_review_service(
    config: &ReviewConfig,
) -> (Arc<InMemoryReviewService>, InMemoryTargets) {
    let store = Arc::new(InMemorySubmissionStore::default());
    let memory = InMemoryTargets::default();
    let targets = side_effect_targets(&memory, config.email_notifications);
    let service = Arc::new(ReviewService::new(
        store,
        targets,
        ExpiryPolicy::from_config(config),
    ));
    (service, memory)
}

fn side_effect_targets(memory: &InMemoryTargets, email_notifications: bool) -> SideEffectTargets {
    let targets = memory.targets(false);
    if email_notifications {
        targets.with_messenger(Arc::new(LoggingMessenger))
    } else {
        targets
    }
}

pub(crate) fn parse_positive_minutes(raw: &str) -> Result<i64, String> {
    match raw.trim().parse::<i64>() {
        Ok(minutes) if minutes > 0 => Ok(minutes),
        Ok(_) => Err(format!("'{raw}' must be a positive number of minutes")),
        Err(err) => Err(format!("failed to parse '{raw}' as minutes ({err})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_engine::workflows::approvals::SubmissionKind;

    #[test]
    fn email_flag_adds_send_step() {
        let config = ReviewConfig {
            email_notifications: true,
            ..ReviewConfig::default()
        };
        let (service, _) = build_review_service(&config);
        assert!(service.dispatcher().targets().messenger.is_some());

        let (quiet, _) = build_review_service(&ReviewConfig::default());
        assert!(quiet.dispatcher().targets().messenger.is_none());
    }

    #[test]
    fn configured_window_reaches_policy() {
        let config = ReviewConfig {
            payment_window_minutes: 10,
            ..ReviewConfig::default()
        };
        let (service, _) = build_review_service(&config);
        assert_eq!(
            service.policy().window_for(SubmissionKind::Payment),
            Some(chrono::Duration::minutes(10))
        );
    }

    #[test]
    fn minutes_parser_rejects_non_positive_values() {
        assert_eq!(parse_positive_minutes("45"), Ok(45));
        assert!(parse_positive_minutes("0").is_err());
        assert!(parse_positive_minutes("soon").is_err());
    }
}
