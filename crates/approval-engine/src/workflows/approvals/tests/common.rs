use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::approvals::domain::{
    ActorId, ConnectionId, ConnectionRequest, DecisionCommit, JobPostingDraft, NewSubmission,
    PaymentProof, Submission, SubmissionId, SubmissionKind, SubmissionPayload, SubmissionStatus,
    VideoSubmission,
};
use crate::workflows::approvals::expiry::ExpiryPolicy;
use crate::workflows::approvals::memory::{InMemorySubmissionStore, InMemoryTargets};
use crate::workflows::approvals::repository::{
    Connection, NotificationRecord, NotificationStore, SinkError, StoreError, SubmissionStore,
    WriteOutcome,
};
use crate::workflows::approvals::{InMemoryNotificationStore, ReviewService, SideEffectTargets};

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn minutes(value: i64) -> Duration {
    Duration::minutes(value)
}

pub(super) fn submitter() -> ActorId {
    ActorId::new("employer-7")
}

pub(super) fn reviewer() -> ActorId {
    ActorId::new("admin42")
}

pub(super) fn payment_proof(connection_id: Option<&str>) -> PaymentProof {
    PaymentProof {
        amount_cents: 4_900,
        currency: "PHP".to_string(),
        transaction_reference: "GCASH-88213".to_string(),
        screenshot_url: "https://cdn.example.test/proofs/88213.png".to_string(),
        connection_id: connection_id.map(ConnectionId::new),
    }
}

pub(super) fn payment(id: &str, submitted_at: DateTime<Utc>) -> Submission {
    Submission::pending(
        SubmissionId::new(id),
        submitter(),
        submitted_at,
        SubmissionPayload::Payment(payment_proof(None)),
    )
}

pub(super) fn linked_payment(
    id: &str,
    connection: &str,
    submitted_at: DateTime<Utc>,
) -> Submission {
    Submission::pending(
        SubmissionId::new(id),
        submitter(),
        submitted_at,
        SubmissionPayload::Payment(payment_proof(Some(connection))),
    )
}

pub(super) fn job_posting(id: &str, submitted_at: DateTime<Utc>) -> Submission {
    Submission::pending(
        SubmissionId::new(id),
        submitter(),
        submitted_at,
        SubmissionPayload::JobPosting(JobPostingDraft {
            title: "Warehouse associate".to_string(),
            description: "Night shift, forklift certification preferred.".to_string(),
            company: "Northwind Logistics".to_string(),
            location: Some("Cebu".to_string()),
        }),
    )
}

pub(super) fn video(id: &str, candidate: &str, submitted_at: DateTime<Utc>) -> Submission {
    Submission::pending(
        SubmissionId::new(id),
        ActorId::new(candidate),
        submitted_at,
        SubmissionPayload::Video(VideoSubmission {
            video_url: format!("https://cdn.example.test/videos/{id}.mp4"),
            duration_secs: 58,
            flags: Vec::new(),
        }),
    )
}

pub(super) fn new_connection_request(connection: &str) -> NewSubmission {
    NewSubmission {
        submitter_id: submitter(),
        payload: SubmissionPayload::Connection(ConnectionRequest {
            connection_id: ConnectionId::new(connection),
            employer_id: submitter(),
            candidate_id: ActorId::new("candidate-3"),
        }),
    }
}

pub(super) fn new_linked_payment(connection: &str) -> NewSubmission {
    NewSubmission {
        submitter_id: submitter(),
        payload: SubmissionPayload::Payment(payment_proof(Some(connection))),
    }
}

pub(super) fn connection_request(
    id: &str,
    connection: &str,
    submitted_at: DateTime<Utc>,
) -> Submission {
    Submission::pending(
        SubmissionId::new(id),
        submitter(),
        submitted_at,
        SubmissionPayload::Connection(ConnectionRequest {
            connection_id: ConnectionId::new(connection),
            employer_id: submitter(),
            candidate_id: ActorId::new("candidate-3"),
        }),
    )
}

pub(super) fn connection(id: &str, payment: Option<&str>) -> Connection {
    let mut connection = Connection::new(
        ConnectionId::new(id),
        submitter(),
        ActorId::new("candidate-3"),
    );
    connection.payment_submission_id = payment.map(SubmissionId::new);
    connection
}

pub(super) struct Harness {
    pub(super) store: Arc<InMemorySubmissionStore>,
    pub(super) targets: InMemoryTargets,
    pub(super) service: ReviewService<InMemorySubmissionStore>,
}

impl Harness {
    pub(super) fn seed(&self, submission: Submission) -> Submission {
        self.store.insert(submission).expect("seed submission")
    }

    pub(super) fn stored(&self, id: &str) -> Submission {
        self.store
            .fetch(&SubmissionId::new(id))
            .expect("fetch succeeds")
            .expect("submission present")
    }
}

pub(super) fn harness() -> Harness {
    harness_with(false)
}

pub(super) fn harness_with(with_email: bool) -> Harness {
    let store = Arc::new(InMemorySubmissionStore::default());
    let targets = InMemoryTargets::default();
    let service = ReviewService::new(
        store.clone(),
        targets.targets(with_email),
        ExpiryPolicy::default(),
    );
    Harness {
        store,
        targets,
        service,
    }
}

/// Notification inbox that is down for the first `failures` writes.
pub(super) struct FlakyNotifications {
    failures: AtomicUsize,
    pub(super) inner: Arc<InMemoryNotificationStore>,
}

impl FlakyNotifications {
    pub(super) fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            inner: Arc::default(),
        }
    }
}

impl NotificationStore for FlakyNotifications {
    fn upsert(&self, record: NotificationRecord) -> Result<WriteOutcome, SinkError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::Unavailable("inbox offline".to_string()));
        }
        self.inner.upsert(record)
    }
}

pub(super) fn flaky_targets(
    targets: &InMemoryTargets,
    notifications: Arc<FlakyNotifications>,
) -> SideEffectTargets {
    SideEffectTargets::new(
        notifications,
        targets.audit_log.clone(),
        targets.entities.clone(),
    )
}

/// Store where another reviewer's decision always lands between our read and
/// our conditional write.
#[derive(Default)]
pub(super) struct RacingStore {
    pub(super) inner: InMemorySubmissionStore,
}

impl SubmissionStore for RacingStore {
    fn insert(&self, submission: Submission) -> Result<Submission, StoreError> {
        self.inner.insert(submission)
    }

    fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError> {
        self.inner.fetch(id)
    }

    fn compare_and_commit(
        &self,
        id: &SubmissionId,
        expected: SubmissionStatus,
        commit: DecisionCommit,
    ) -> Result<Submission, StoreError> {
        let competing = DecisionCommit {
            status: SubmissionStatus::Rejected,
            decided_at: commit.decided_at,
            decider_id: Some(ActorId::new("admin-other")),
            rejection_reason: Some("duplicate upload".to_string()),
            featured: false,
        };
        let _ = self.inner.compare_and_commit(id, expected, competing);
        self.inner.compare_and_commit(id, expected, commit)
    }

    fn scan(
        &self,
        kind: SubmissionKind,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, StoreError> {
        self.inner.scan(kind, status)
    }
}

/// Store that reads normally but cannot take new submissions.
#[derive(Default)]
pub(super) struct ReadOnlyStore {
    pub(super) inner: InMemorySubmissionStore,
}

impl SubmissionStore for ReadOnlyStore {
    fn insert(&self, _submission: Submission) -> Result<Submission, StoreError> {
        Err(StoreError::Unavailable("primary is read-only".to_string()))
    }

    fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError> {
        self.inner.fetch(id)
    }

    fn compare_and_commit(
        &self,
        id: &SubmissionId,
        expected: SubmissionStatus,
        commit: DecisionCommit,
    ) -> Result<Submission, StoreError> {
        self.inner.compare_and_commit(id, expected, commit)
    }

    fn scan(
        &self,
        kind: SubmissionKind,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, StoreError> {
        self.inner.scan(kind, status)
    }
}

/// Store whose conditional writes fail for one submission.
pub(super) struct StuckRecordStore {
    pub(super) inner: InMemorySubmissionStore,
    pub(super) stuck: SubmissionId,
}

impl StuckRecordStore {
    pub(super) fn stuck_on(id: &str) -> Self {
        Self {
            inner: InMemorySubmissionStore::default(),
            stuck: SubmissionId::new(id),
        }
    }
}

impl SubmissionStore for StuckRecordStore {
    fn insert(&self, submission: Submission) -> Result<Submission, StoreError> {
        self.inner.insert(submission)
    }

    fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError> {
        self.inner.fetch(id)
    }

    fn compare_and_commit(
        &self,
        id: &SubmissionId,
        expected: SubmissionStatus,
        commit: DecisionCommit,
    ) -> Result<Submission, StoreError> {
        if *id == self.stuck {
            return Err(StoreError::Unavailable("row lock timeout".to_string()));
        }
        self.inner.compare_and_commit(id, expected, commit)
    }

    fn scan(
        &self,
        kind: SubmissionKind,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, StoreError> {
        self.inner.scan(kind, status)
    }
}

pub(super) struct UnavailableStore;

impl SubmissionStore for UnavailableStore {
    fn insert(&self, _submission: Submission) -> Result<Submission, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &SubmissionId) -> Result<Option<Submission>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn compare_and_commit(
        &self,
        _id: &SubmissionId,
        _expected: SubmissionStatus,
        _commit: DecisionCommit,
    ) -> Result<Submission, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn scan(
        &self,
        _kind: SubmissionKind,
        _status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
