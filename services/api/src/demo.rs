use crate::infra::{build_review_service, parse_positive_minutes, InMemoryReviewService};
use approval_engine::config::ReviewConfig;
use approval_engine::error::AppError;
use approval_engine::workflows::approvals::{
    ActorId, ConnectionId, ConnectionRequest, DecisionReceipt, DecisionRequest,
    InMemoryTargets, JobPostingDraft, NewSubmission, PaymentProof, ReviewError, StepStatus,
    SubmissionKind, SubmissionPayload, VideoSubmission,
};
use chrono::{DateTime, Duration, Utc};
use clap::Args;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Payment decision window in minutes (defaults to 30).
    #[arg(long, value_parser = parse_positive_minutes)]
    pub(crate) window_minutes: Option<i64>,
    /// Route submitter notifications through the outbound messenger as well.
    #[arg(long)]
    pub(crate) with_email: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let mut review = ReviewConfig::default();
    if let Some(minutes) = args.window_minutes {
        review.payment_window_minutes = minutes;
    }
    review.email_notifications = args.with_email;

    let (service, targets) = build_review_service(&review);
    let start = Utc::now();
    let employer = ActorId::new("employer-7");
    let candidate = ActorId::new("candidate-3");
    let reviewer = ActorId::new("admin42");

    println!("Approval workflow demo");
    println!(
        "- payment decision window: {} min | email notifications: {}",
        review.payment_window_minutes,
        if review.email_notifications { "on" } else { "off" }
    );

    let connection_id = ConnectionId::new("conn-demo");
    let reveal_request = service.submit(
        NewSubmission {
            submitter_id: employer.clone(),
            payload: SubmissionPayload::Connection(ConnectionRequest {
                connection_id: connection_id.clone(),
                employer_id: employer.clone(),
                candidate_id: candidate.clone(),
            }),
        },
        start,
    )?;
    let payment = service.submit(
        NewSubmission {
            submitter_id: employer.clone(),
            payload: SubmissionPayload::Payment(payment_proof("GCASH-10442", Some(&connection_id))),
        },
        start,
    )?;
    let posting = service.submit(
        NewSubmission {
            submitter_id: employer.clone(),
            payload: SubmissionPayload::JobPosting(JobPostingDraft {
                title: "Customer support associate".to_string(),
                description: "Day shift, English and Tagalog".to_string(),
                company: "Harbor BPO".to_string(),
                location: Some("Makati".to_string()),
            }),
        },
        start,
    )?;
    let video = service.submit(
        NewSubmission {
            submitter_id: candidate.clone(),
            payload: SubmissionPayload::Video(VideoSubmission {
                video_url: "https://cdn.example.test/videos/intro.mp4".to_string(),
                duration_secs: 64,
                flags: vec!["contact_info_spoken".to_string()],
            }),
        },
        start,
    )?;

    println!("\nSubmissions received");
    for submission in [&reveal_request, &payment, &posting, &video] {
        println!("- {} ({})", submission.id, submission.kind());
    }

    println!("\nDecisions");
    let at = start + Duration::minutes(10);
    let receipt = service.decide(DecisionRequest::approve(payment.id.clone(), reviewer.clone()), at)?;
    render_receipt(&receipt, at, start);
    let receipt = service.decide(
        DecisionRequest::approve(posting.id.clone(), reviewer.clone()).featured(),
        at,
    )?;
    render_receipt(&receipt, at, start);
    let receipt = service.decide(
        DecisionRequest::reject(
            video.id.clone(),
            reviewer.clone(),
            "Please remove your phone number from the recording",
        ),
        at,
    )?;
    render_receipt(&receipt, at, start);

    match service.decide(
        DecisionRequest::reject(posting.id.clone(), ActorId::new("admin7"), "duplicate listing"),
        at + Duration::minutes(1),
    ) {
        Err(ReviewError::Decision(err)) if err.is_already_handled() => {
            println!("- second reviewer on {}: {err}", posting.id)
        }
        Err(err) => return Err(err.into()),
        Ok(receipt) => render_receipt(&receipt, at, start),
    }

    if let Some(connection) = targets.entities.connection(&connection_id) {
        println!(
            "- contact reveal for {}: {:?} (payment {:?})",
            connection.id, connection.reveal_status, connection.payment_status
        );
    }
    let settled = service.get(&reveal_request.id)?;
    println!("- reveal request {} settled as {}", settled.id, settled.status);

    println!("\nDecision window");
    let late = service.submit(
        NewSubmission {
            submitter_id: employer.clone(),
            payload: SubmissionPayload::Payment(payment_proof("GCASH-10587", None)),
        },
        at,
    )?;
    let past_window = at + service_window(&service) + Duration::minutes(1);
    let view = service.window(&late.id, at + Duration::minutes(5))?;
    println!(
        "- {} at +5 min: {}s remaining",
        late.id,
        view.remaining_seconds.unwrap_or_default()
    );
    match service.decide(DecisionRequest::approve(late.id.clone(), reviewer.clone()), past_window) {
        Err(ReviewError::Decision(err)) => println!("- late approval refused: {err}"),
        Err(err) => return Err(err.into()),
        Ok(receipt) => render_receipt(&receipt, past_window, start),
    }
    let summaries = service.sweep_all(past_window)?;
    for summary in &summaries {
        println!(
            "- sweep of {} queue: scanned {} | expired {:?} | failed {}",
            summary.kind,
            summary.scanned,
            summary.expired,
            summary.failed.len()
        );
    }

    render_queues(&service)?;
    render_records(&targets);
    Ok(())
}

fn payment_proof(reference: &str, connection_id: Option<&ConnectionId>) -> PaymentProof {
    PaymentProof {
        amount_cents: 49_900,
        currency: "PHP".to_string(),
        transaction_reference: reference.to_string(),
        screenshot_url: format!("https://cdn.example.test/proofs/{reference}.png"),
        connection_id: connection_id.cloned(),
    }
}

fn service_window(service: &InMemoryReviewService) -> Duration {
    service
        .policy()
        .window_for(SubmissionKind::Payment)
        .unwrap_or_else(Duration::zero)
}

fn render_receipt(receipt: &DecisionReceipt, at: DateTime<Utc>, start: DateTime<Utc>) {
    let submission = &receipt.submission;
    println!(
        "- {} {} at +{} min{}",
        submission.id,
        submission.status,
        (at - start).num_minutes(),
        if submission.featured { " (featured)" } else { "" }
    );
    for result in &receipt.dispatch.steps {
        let status = match &result.status {
            StepStatus::Applied => "applied".to_string(),
            StepStatus::Unchanged => "unchanged".to_string(),
            StepStatus::Failed { error } => format!("failed: {error}"),
        };
        println!("    {} -> {}", result.step, status);
    }
}

fn render_queues(service: &InMemoryReviewService) -> Result<(), AppError> {
    println!("\nReview queues");
    for kind in SubmissionKind::ALL {
        let counts = service.counts(kind)?;
        let buckets: Vec<String> = counts
            .by_status
            .iter()
            .map(|(status, count)| format!("{status} {count}"))
            .collect();
        println!("- {}: {} total | {}", kind, counts.total, buckets.join(" | "));
    }
    Ok(())
}

fn render_records(targets: &InMemoryTargets) {
    println!("\nNotifications");
    for record in targets.notifications.records() {
        println!(
            "- [{}] to {}: {} ({})",
            record.notification_type, record.recipient_id, record.title, record.message
        );
    }

    println!("\nAudit log");
    for entry in targets.audit_log.entries() {
        println!("- {} {} by {}: {}", entry.action_type, entry.target_id, entry.actor_id, entry.note);
    }
}
