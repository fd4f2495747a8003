use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for submissions awaiting or holding a decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub String);

impl SubmissionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Submitters, reviewers, and employers all share one identifier space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Actor recorded in the audit trail for transitions nobody clicked.
    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an employer/candidate connection whose contact details are gated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed set of artifacts moderated through the shared lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Payment,
    JobPosting,
    Video,
    Connection,
}

impl SubmissionKind {
    pub const ALL: [SubmissionKind; 4] = [
        SubmissionKind::Payment,
        SubmissionKind::JobPosting,
        SubmissionKind::Video,
        SubmissionKind::Connection,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            SubmissionKind::Payment => "payment",
            SubmissionKind::JobPosting => "job_posting",
            SubmissionKind::Video => "video",
            SubmissionKind::Connection => "connection",
        }
    }

    /// Human-readable noun used in notification titles and audit notes.
    pub const fn noun(self) -> &'static str {
        match self {
            SubmissionKind::Payment => "payment proof",
            SubmissionKind::JobPosting => "job posting",
            SubmissionKind::Video => "video",
            SubmissionKind::Connection => "contact reveal request",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle status. `Pending` is the only state any transition may leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 4] = [
        SubmissionStatus::Pending,
        SubmissionStatus::Approved,
        SubmissionStatus::Rejected,
        SubmissionStatus::Expired,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Expired => "expired",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcomes a human reviewer may issue. Expiry is never a reviewer choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Approved,
    Rejected,
}

impl DecisionOutcome {
    pub const fn status(self) -> SubmissionStatus {
        match self {
            DecisionOutcome::Approved => SubmissionStatus::Approved,
            DecisionOutcome::Rejected => SubmissionStatus::Rejected,
        }
    }
}

/// Proof of an offline payment, optionally buying a contact reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    pub amount_cents: u64,
    pub currency: String,
    pub transaction_reference: String,
    pub screenshot_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPostingDraft {
    pub title: String,
    pub description: String,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Candidate introduction video plus flags derived upstream (e.g. by transcription).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSubmission {
    pub video_url: String,
    pub duration_secs: u32,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// An employer asking to see a candidate's contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub connection_id: ConnectionId,
    pub employer_id: ActorId,
    pub candidate_id: ActorId,
}

/// Kind-specific immutable data carried by a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionPayload {
    Payment(PaymentProof),
    JobPosting(JobPostingDraft),
    Video(VideoSubmission),
    Connection(ConnectionRequest),
}

impl SubmissionPayload {
    pub const fn kind(&self) -> SubmissionKind {
        match self {
            SubmissionPayload::Payment(_) => SubmissionKind::Payment,
            SubmissionPayload::JobPosting(_) => SubmissionKind::JobPosting,
            SubmissionPayload::Video(_) => SubmissionKind::Video,
            SubmissionPayload::Connection(_) => SubmissionKind::Connection,
        }
    }

    /// Reject payloads that could never be reviewed meaningfully.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            SubmissionPayload::Payment(proof) => {
                if proof.amount_cents == 0 {
                    return Err(ValidationError::NonPositiveAmount);
                }
                require("transaction_reference", &proof.transaction_reference)?;
                require("screenshot_url", &proof.screenshot_url)?;
                require("currency", &proof.currency)
            }
            SubmissionPayload::JobPosting(draft) => {
                require("title", &draft.title)?;
                require("description", &draft.description)?;
                require("company", &draft.company)
            }
            SubmissionPayload::Video(video) => require("video_url", &video.video_url),
            SubmissionPayload::Connection(request) => {
                require("employer_id", request.employer_id.as_str())?;
                require("candidate_id", request.candidate_id.as_str())?;
                if request.employer_id == request.candidate_id {
                    return Err(ValidationError::SelfConnection);
                }
                Ok(())
            }
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField { field })
    } else {
        Ok(())
    }
}

/// A user-originated artifact and its decision metadata.
///
/// `decided_at` is present exactly when the status is terminal, and
/// `rejection_reason` exactly when the status is `Rejected`. Only
/// [`DecisionCommit`] values produced by the state machine change these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub submitter_id: ActorId,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decider_id: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub featured: bool,
    pub payload: SubmissionPayload,
}

impl Submission {
    pub fn pending(
        id: SubmissionId,
        submitter_id: ActorId,
        submitted_at: DateTime<Utc>,
        payload: SubmissionPayload,
    ) -> Self {
        Self {
            id,
            submitter_id,
            status: SubmissionStatus::Pending,
            submitted_at,
            decided_at: None,
            decider_id: None,
            rejection_reason: None,
            featured: false,
            payload,
        }
    }

    pub const fn kind(&self) -> SubmissionKind {
        self.payload.kind()
    }

    pub fn is_pending(&self) -> bool {
        self.status == SubmissionStatus::Pending
    }

    pub fn connection_id(&self) -> Option<&ConnectionId> {
        match &self.payload {
            SubmissionPayload::Payment(proof) => proof.connection_id.as_ref(),
            SubmissionPayload::Connection(request) => Some(&request.connection_id),
            _ => None,
        }
    }

    /// Checks the record-level invariants tying metadata to status.
    pub fn is_consistent(&self) -> bool {
        let decided = self.decided_at.is_some() == self.status.is_terminal();
        let reason = match (&self.rejection_reason, self.status) {
            (Some(reason), SubmissionStatus::Rejected) => !reason.trim().is_empty(),
            (None, SubmissionStatus::Rejected) => false,
            (Some(_), _) => false,
            (None, _) => true,
        };
        let decider = self.decider_id.is_none()
            || matches!(
                self.status,
                SubmissionStatus::Approved | SubmissionStatus::Rejected
            );
        let featured = !self.featured
            || (self.status == SubmissionStatus::Approved
                && self.kind() == SubmissionKind::JobPosting);
        decided && reason && decider && featured
    }

    /// Applies a committed transition. Store adapters call this while holding
    /// whatever guard backs their compare-and-swap.
    pub fn apply_commit(&mut self, commit: DecisionCommit) {
        self.status = commit.status;
        self.decided_at = Some(commit.decided_at);
        self.decider_id = commit.decider_id;
        self.rejection_reason = commit.rejection_reason;
        self.featured = commit.featured;
    }
}

/// Field values written by a transition out of `pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionCommit {
    pub status: SubmissionStatus,
    pub decided_at: DateTime<Utc>,
    pub decider_id: Option<ActorId>,
    pub rejection_reason: Option<String>,
    pub featured: bool,
}

impl DecisionCommit {
    pub fn expire(at: DateTime<Utc>) -> Self {
        Self {
            status: SubmissionStatus::Expired,
            decided_at: at,
            decider_id: None,
            rejection_reason: None,
            featured: false,
        }
    }
}

/// Intake payload supplied by the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub submitter_id: ActorId,
    pub payload: SubmissionPayload,
}

/// A reviewer's decision on one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub submission_id: SubmissionId,
    pub outcome: DecisionOutcome,
    pub actor_id: ActorId,
    #[serde(default)]
    pub reason: Option<String>,
    /// "Approve and feature" for job postings.
    #[serde(default)]
    pub feature: bool,
}

impl DecisionRequest {
    pub fn approve(submission_id: SubmissionId, actor_id: ActorId) -> Self {
        Self {
            submission_id,
            outcome: DecisionOutcome::Approved,
            actor_id,
            reason: None,
            feature: false,
        }
    }

    pub fn reject(
        submission_id: SubmissionId,
        actor_id: ActorId,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            submission_id,
            outcome: DecisionOutcome::Rejected,
            actor_id,
            reason: Some(reason.into()),
            feature: false,
        }
    }

    pub fn featured(mut self) -> Self {
        self.feature = true;
        self
    }
}

/// Malformed intake or decision input. Never retried; reported back as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("a rejection requires a non-empty reason")]
    MissingRejectionReason,
    #[error("decision actor must be provided")]
    MissingActor,
    #[error("only job posting approvals can be featured")]
    FeatureRequiresJobPostingApproval,
    #[error("contact reveals are approved through their linked payment, not directly")]
    RevealApprovalRequiresPayment,
    #[error("field `{field}` must not be empty")]
    MissingField { field: &'static str },
    #[error("payment amount must be greater than zero")]
    NonPositiveAmount,
    #[error("employer and candidate must be different actors")]
    SelfConnection,
    #[error("connection {connection_id} is registered for a different employer or candidate")]
    ConnectionPartiesMismatch { connection_id: ConnectionId },
    #[error("connection {connection_id} already has a payment awaiting review")]
    ConnectionPaymentPending { connection_id: ConnectionId },
    #[error("contact details for connection {connection_id} are already unlocked")]
    ConnectionAlreadyRevealed { connection_id: ConnectionId },
}
