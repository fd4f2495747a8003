use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ActorId, ConnectionId, DecisionCommit, Submission, SubmissionId, SubmissionKind,
    SubmissionStatus,
};

/// Authoritative storage for submissions.
///
/// `compare_and_commit` is the only way decision fields change: adapters must
/// apply the commit atomically and only while the stored status still equals
/// `expected`, otherwise answer [`StoreError::StatusMismatch`].
pub trait SubmissionStore: Send + Sync {
    fn insert(&self, submission: Submission) -> Result<Submission, StoreError>;
    fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError>;
    fn compare_and_commit(
        &self,
        id: &SubmissionId,
        expected: SubmissionStatus,
        commit: DecisionCommit,
    ) -> Result<Submission, StoreError>;
    /// Every submission of `kind`, optionally narrowed to one status. Order is unspecified.
    fn scan(
        &self,
        kind: SubmissionKind,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("submission already exists")]
    Conflict,
    #[error("submission not found")]
    NotFound,
    #[error("status precondition failed: expected {expected}, found {actual}")]
    StatusMismatch {
        expected: SubmissionStatus,
        actual: SubmissionStatus,
    },
    #[error("submission store unavailable: {0}")]
    Unavailable(String),
}

/// Result of a keyed write against a derived-record target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

/// Failure of a dependent-record target. Retried, never fatal to a decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("target unavailable: {0}")]
    Unavailable(String),
    #[error("linked record not found: {0}")]
    Missing(String),
    #[error("linked record changed concurrently: {0}")]
    Conflict(String),
}

/// User-facing inbox. Records are upserted by `key`, so replays are no-ops.
pub trait NotificationStore: Send + Sync {
    fn upsert(&self, record: NotificationRecord) -> Result<WriteOutcome, SinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub key: String,
    pub recipient_id: ActorId,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Append-only activity log, deduplicated on `key`.
pub trait AuditLogStore: Send + Sync {
    fn append(&self, entry: AuditEntry) -> Result<WriteOutcome, SinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub key: String,
    pub actor_id: ActorId,
    pub action_type: String,
    pub target_id: String,
    pub target_type: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// Profile, listing, account, and connection records touched by decisions.
/// Every write sets an absolute value or is keyed, so replays converge.
pub trait LinkedEntityStore: Send + Sync {
    fn credit_account(
        &self,
        account: &ActorId,
        payment: &SubmissionId,
        amount_cents: u64,
    ) -> Result<WriteOutcome, SinkError>;
    /// Records whether one video is approved. A profile shows a video while
    /// any of its videos is approved.
    fn set_video_visibility(
        &self,
        profile: &ActorId,
        video: &SubmissionId,
        approved: bool,
    ) -> Result<WriteOutcome, SinkError>;
    fn set_job_listing(
        &self,
        posting: &SubmissionId,
        owner: &ActorId,
        state: JobListingState,
    ) -> Result<WriteOutcome, SinkError>;
    /// Creates the connection if absent. Registering the same parties again is
    /// a no-op; different parties under an existing id are a conflict.
    fn register_connection(&self, connection: Connection) -> Result<WriteOutcome, SinkError>;
    fn fetch_connection(&self, id: &ConnectionId) -> Result<Option<Connection>, SinkError>;
    /// Points the connection at `payment`, provided it still points at
    /// `replaces`. Answers [`SinkError::Conflict`] otherwise.
    fn link_payment(
        &self,
        id: &ConnectionId,
        payment: &SubmissionId,
        replaces: Option<&SubmissionId>,
    ) -> Result<WriteOutcome, SinkError>;
    /// Drops the link to `payment` if it is still the current one.
    fn unlink_payment(
        &self,
        id: &ConnectionId,
        payment: &SubmissionId,
    ) -> Result<WriteOutcome, SinkError>;
    fn update_reveal(
        &self,
        id: &ConnectionId,
        payment: &SubmissionId,
        reveal_status: RevealStatus,
        payment_status: SubmissionStatus,
    ) -> Result<WriteOutcome, SinkError>;
}

/// Visibility of a job posting on the public board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListingState {
    pub published: bool,
    pub featured: bool,
}

/// Whether an employer may see the candidate's contact details.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealStatus {
    #[default]
    Pending,
    Approved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub employer_id: ActorId,
    pub candidate_id: ActorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_submission_id: Option<SubmissionId>,
    pub reveal_status: RevealStatus,
    /// Terminal status of the linked payment, once it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<SubmissionStatus>,
}

impl Connection {
    pub fn new(id: ConnectionId, employer_id: ActorId, candidate_id: ActorId) -> Self {
        Self {
            id,
            employer_id,
            candidate_id,
            payment_submission_id: None,
            reveal_status: RevealStatus::Pending,
            payment_status: None,
        }
    }

    pub fn is_revealed(&self) -> bool {
        self.reveal_status == RevealStatus::Approved
    }
}

/// Optional outbound email/SMS hook.
pub trait OutboundMessenger: Send + Sync {
    fn send(&self, message: OutboundMessage) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub key: String,
    pub recipient_id: ActorId,
    pub subject: String,
    pub body: String,
}
