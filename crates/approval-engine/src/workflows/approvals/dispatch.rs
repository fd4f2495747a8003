//! Dependent-record propagation after a decision commits.
//!
//! Each kind has a fixed, ordered step list. Steps run in order, a failing step
//! never rolls back the ones before it, and every write is keyed by the
//! submission id so a full or partial replay converges on the same records.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{ActorId, Submission, SubmissionId, SubmissionPayload, SubmissionStatus};
use super::machine::DecisionError;
use super::repository::{
    AuditEntry, AuditLogStore, JobListingState, LinkedEntityStore, NotificationRecord,
    NotificationStore, OutboundMessage, OutboundMessenger, SinkError, WriteOutcome,
};
use super::reveal::{RevealGate, RevealOutcome};

/// External collaborators written by side effects.
#[derive(Clone)]
pub struct SideEffectTargets {
    pub notifications: Arc<dyn NotificationStore>,
    pub audit_log: Arc<dyn AuditLogStore>,
    pub entities: Arc<dyn LinkedEntityStore>,
    pub messenger: Option<Arc<dyn OutboundMessenger>>,
}

impl SideEffectTargets {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        audit_log: Arc<dyn AuditLogStore>,
        entities: Arc<dyn LinkedEntityStore>,
    ) -> Self {
        Self {
            notifications,
            audit_log,
            entities,
            messenger: None,
        }
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn OutboundMessenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    /// Shared notification path for submitters and gated employers alike.
    pub fn notify(&self, record: NotificationRecord) -> Result<WriteOutcome, SinkError> {
        let key = record.key.clone();
        let outcome = self.notifications.upsert(record)?;
        debug!(%key, ?outcome, "notification upserted");
        Ok(outcome)
    }
}

impl fmt::Debug for SideEffectTargets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideEffectTargets")
            .field("messenger", &self.messenger.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectStep {
    CreditAccount,
    SyncContactReveal,
    SettleRevealRequest,
    PublishJobListing,
    UpdateVideoVisibility,
    NotifySubmitter,
    AppendAuditEntry,
    SendEmail,
}

impl SideEffectStep {
    pub const fn label(self) -> &'static str {
        match self {
            SideEffectStep::CreditAccount => "credit_account",
            SideEffectStep::SyncContactReveal => "sync_contact_reveal",
            SideEffectStep::SettleRevealRequest => "settle_reveal_request",
            SideEffectStep::PublishJobListing => "publish_job_listing",
            SideEffectStep::UpdateVideoVisibility => "update_video_visibility",
            SideEffectStep::NotifySubmitter => "notify_submitter",
            SideEffectStep::AppendAuditEntry => "append_audit_entry",
            SideEffectStep::SendEmail => "send_email",
        }
    }
}

impl fmt::Display for SideEffectStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Applied,
    Unchanged,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub step: SideEffectStep,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Per-step record of one dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub submission_id: SubmissionId,
    pub steps: Vec<StepResult>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|result| !matches!(result.status, StepStatus::Failed { .. }))
    }

    pub fn failed_steps(&self) -> Vec<SideEffectStep> {
        self.steps
            .iter()
            .filter(|result| matches!(result.status, StepStatus::Failed { .. }))
            .map(|result| result.step)
            .collect()
    }

    pub fn status_of(&self, step: SideEffectStep) -> Option<&StepStatus> {
        self.steps
            .iter()
            .find(|result| result.step == step)
            .map(|result| &result.status)
    }

    /// Surface failed steps as an error value for callers that want one.
    pub fn into_result(self) -> Result<DispatchReport, DispatchPartialFailure> {
        if self.is_complete() {
            return Ok(self);
        }
        let failures = self
            .steps
            .into_iter()
            .filter_map(|result| match result.status {
                StepStatus::Failed { error } => Some((result.step, error)),
                _ => None,
            })
            .collect();
        Err(DispatchPartialFailure {
            submission_id: self.submission_id,
            failures,
        })
    }
}

/// Side effects still owed for a decision that has already committed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("decision on {submission_id} stands; {} side effect(s) pending retry", failures.len())]
pub struct DispatchPartialFailure {
    pub submission_id: SubmissionId,
    pub failures: Vec<(SideEffectStep, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("submission {0} is still pending; nothing to dispatch")]
    NotDecided(SubmissionId),
}

/// Moves pending contact-reveal requests to the terminal status of the payment
/// bought for them.
pub trait RevealRequestSettler: Send + Sync {
    /// Every request mirroring `payment`, with whether this call settled it.
    fn mirror_payment(
        &self,
        payment: &Submission,
    ) -> Result<Vec<(Submission, WriteOutcome)>, DecisionError>;
}

/// Runs the per-kind step list for decided submissions.
pub struct SideEffectDispatcher {
    targets: SideEffectTargets,
    reveal: RevealGate,
    settler: Option<Arc<dyn RevealRequestSettler>>,
}

impl SideEffectDispatcher {
    pub fn new(targets: SideEffectTargets) -> Self {
        let reveal = RevealGate::new(targets.clone());
        Self {
            targets,
            reveal,
            settler: None,
        }
    }

    pub fn with_settler(mut self, settler: Arc<dyn RevealRequestSettler>) -> Self {
        self.settler = Some(settler);
        self
    }

    pub fn targets(&self) -> &SideEffectTargets {
        &self.targets
    }

    pub fn reveal_gate(&self) -> &RevealGate {
        &self.reveal
    }

    /// Ordered step list for a decided submission.
    pub fn plan(&self, submission: &Submission) -> Vec<SideEffectStep> {
        let mut steps = Vec::new();
        match &submission.payload {
            SubmissionPayload::Payment(proof) => {
                if submission.status == SubmissionStatus::Approved {
                    steps.push(SideEffectStep::CreditAccount);
                }
                if proof.connection_id.is_some() {
                    steps.push(SideEffectStep::SyncContactReveal);
                    if self.settler.is_some() {
                        steps.push(SideEffectStep::SettleRevealRequest);
                    }
                }
            }
            SubmissionPayload::JobPosting(_) => steps.push(SideEffectStep::PublishJobListing),
            SubmissionPayload::Video(_) => steps.push(SideEffectStep::UpdateVideoVisibility),
            SubmissionPayload::Connection(_) => {}
        }
        steps.push(SideEffectStep::NotifySubmitter);
        steps.push(SideEffectStep::AppendAuditEntry);
        if self.targets.messenger.is_some() {
            steps.push(SideEffectStep::SendEmail);
        }
        steps
    }

    pub fn dispatch(&self, submission: &Submission) -> Result<DispatchReport, DispatchError> {
        let steps = self.plan(submission);
        self.run(submission, &steps)
    }

    /// Re-run only `steps`, in plan order. Steps outside the plan are ignored.
    pub fn retry(
        &self,
        submission: &Submission,
        steps: &[SideEffectStep],
    ) -> Result<DispatchReport, DispatchError> {
        let selected: Vec<SideEffectStep> = self
            .plan(submission)
            .into_iter()
            .filter(|step| steps.contains(step))
            .collect();
        self.run(submission, &selected)
    }

    fn run(
        &self,
        submission: &Submission,
        steps: &[SideEffectStep],
    ) -> Result<DispatchReport, DispatchError> {
        if submission.is_pending() {
            return Err(DispatchError::NotDecided(submission.id.clone()));
        }

        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            let status = match self.execute(*step, submission) {
                Ok(WriteOutcome::Written) => StepStatus::Applied,
                Ok(WriteOutcome::Unchanged) => StepStatus::Unchanged,
                Err(error) => {
                    warn!(submission_id = %submission.id, step = %step, %error, "side effect failed");
                    StepStatus::Failed { error }
                }
            };
            results.push(StepResult {
                step: *step,
                status,
            });
        }

        Ok(DispatchReport {
            submission_id: submission.id.clone(),
            steps: results,
        })
    }

    /// Settles the linked reveal requests and propagates their own side effects.
    fn settle_reveal_requests(&self, payment: &Submission) -> Result<WriteOutcome, String> {
        let Some(settler) = &self.settler else {
            return Ok(WriteOutcome::Unchanged);
        };
        let mirrored = settler
            .mirror_payment(payment)
            .map_err(|err| err.to_string())?;

        let mut outcome = WriteOutcome::Unchanged;
        for (request, write) in mirrored {
            let report = self.dispatch(&request).map_err(|err| err.to_string())?;
            if !report.is_complete() {
                return Err(format!(
                    "reveal request {} has side effects pending: {:?}",
                    request.id,
                    report.failed_steps()
                ));
            }
            let applied = report
                .steps
                .iter()
                .any(|result| result.status == StepStatus::Applied);
            if write == WriteOutcome::Written || applied {
                outcome = WriteOutcome::Written;
            }
        }
        Ok(outcome)
    }

    fn execute(&self, step: SideEffectStep, submission: &Submission) -> Result<WriteOutcome, String> {
        let status = submission.status;
        match (step, &submission.payload) {
            (SideEffectStep::CreditAccount, SubmissionPayload::Payment(proof)) => self
                .targets
                .entities
                .credit_account(&submission.submitter_id, &submission.id, proof.amount_cents)
                .map_err(|err| err.to_string()),
            (SideEffectStep::SyncContactReveal, SubmissionPayload::Payment(_)) => self
                .reveal
                .on_payment_decided(submission)
                .map(|outcome| match outcome {
                    RevealOutcome::Unlocked { .. } | RevealOutcome::Withheld { .. } => {
                        WriteOutcome::Written
                    }
                    _ => WriteOutcome::Unchanged,
                })
                .map_err(|err| err.to_string()),
            (SideEffectStep::PublishJobListing, SubmissionPayload::JobPosting(_)) => {
                let published = status == SubmissionStatus::Approved;
                let state = JobListingState {
                    published,
                    featured: published && submission.featured,
                };
                self.targets
                    .entities
                    .set_job_listing(&submission.id, &submission.submitter_id, state)
                    .map_err(|err| err.to_string())
            }
            (SideEffectStep::UpdateVideoVisibility, SubmissionPayload::Video(_)) => self
                .targets
                .entities
                .set_video_visibility(
                    &submission.submitter_id,
                    &submission.id,
                    status == SubmissionStatus::Approved,
                )
                .map_err(|err| err.to_string()),
            (SideEffectStep::SettleRevealRequest, SubmissionPayload::Payment(_)) => {
                self.settle_reveal_requests(submission)
            }
            (SideEffectStep::NotifySubmitter, _) => self
                .targets
                .notify(submitter_notification(submission))
                .map_err(|err| err.to_string()),
            (SideEffectStep::AppendAuditEntry, _) => self
                .targets
                .audit_log
                .append(audit_entry(submission))
                .map_err(|err| err.to_string()),
            (SideEffectStep::SendEmail, _) => match &self.targets.messenger {
                Some(messenger) => {
                    let notification = submitter_notification(submission);
                    messenger
                        .send(OutboundMessage {
                            key: format!("{}:email", submission.id),
                            recipient_id: submission.submitter_id.clone(),
                            subject: notification.title,
                            body: notification.message,
                        })
                        .map(|()| WriteOutcome::Written)
                        .map_err(|err| err.to_string())
                }
                None => Ok(WriteOutcome::Unchanged),
            },
            (step, _) => Err(format!(
                "step {step} does not apply to {} submissions",
                submission.kind()
            )),
        }
    }
}

/// `<kind>_<status>`, e.g. `payment_approved`.
pub fn outcome_type(submission: &Submission) -> String {
    format!("{}_{}", submission.kind().label(), submission.status.label())
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn submitter_notification(submission: &Submission) -> NotificationRecord {
    let noun = submission.kind().noun();
    let title = format!("{} {}", capitalize(noun), submission.status.label());
    let message = match submission.status {
        SubmissionStatus::Approved if submission.featured => {
            format!("Your {noun} has been approved and featured.")
        }
        SubmissionStatus::Approved => format!("Your {noun} has been approved."),
        SubmissionStatus::Rejected => format!(
            "Your {noun} was rejected: {}",
            submission.rejection_reason.as_deref().unwrap_or("no reason given")
        ),
        SubmissionStatus::Expired => format!(
            "The review window for your {noun} closed before a decision. Please submit it again."
        ),
        SubmissionStatus::Pending => format!("Your {noun} is awaiting review."),
    };

    NotificationRecord {
        key: format!("{}:submitter", submission.id),
        recipient_id: submission.submitter_id.clone(),
        notification_type: outcome_type(submission),
        title,
        message,
        read: false,
        created_at: submission.decided_at.unwrap_or(submission.submitted_at),
    }
}

fn audit_entry(submission: &Submission) -> AuditEntry {
    let noun = submission.kind().noun();
    let actor = submission.decider_id.clone().unwrap_or_else(ActorId::system);
    let note = match submission.status {
        SubmissionStatus::Rejected => format!(
            "{noun} rejected by {actor}: {}",
            submission.rejection_reason.as_deref().unwrap_or_default()
        ),
        SubmissionStatus::Expired => format!("{noun} expired after its decision window"),
        SubmissionStatus::Approved if submission.featured => {
            format!("{noun} approved and featured by {actor}")
        }
        status => format!("{noun} {status} by {actor}"),
    };

    AuditEntry {
        key: format!("{}:decision", submission.id),
        actor_id: actor,
        action_type: outcome_type(submission),
        target_id: submission.id.to_string(),
        target_type: submission.kind().label().to_string(),
        note,
        created_at: submission.decided_at.unwrap_or(submission.submitted_at),
    }
}
