//! Mutex-backed adapters used by the demo service and the test suites.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use super::dispatch::SideEffectTargets;
use super::domain::{
    ActorId, ConnectionId, DecisionCommit, Submission, SubmissionId, SubmissionKind,
    SubmissionStatus,
};
use super::repository::{
    AuditEntry, AuditLogStore, Connection, JobListingState, LinkedEntityStore,
    NotificationRecord, NotificationStore, OutboundMessage, OutboundMessenger, RevealStatus,
    SinkError, StoreError, SubmissionStore, WriteOutcome,
};

#[derive(Default, Clone)]
pub struct InMemorySubmissionStore {
    records: Arc<Mutex<HashMap<SubmissionId, Submission>>>,
}

impl InMemorySubmissionStore {
    pub fn len(&self) -> usize {
        self.records.lock().expect("submission mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SubmissionStore for InMemorySubmissionStore {
    fn insert(&self, submission: Submission) -> Result<Submission, StoreError> {
        let mut guard = self.records.lock().expect("submission mutex poisoned");
        if guard.contains_key(&submission.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(submission.id.clone(), submission.clone());
        Ok(submission)
    }

    fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError> {
        let guard = self.records.lock().expect("submission mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn compare_and_commit(
        &self,
        id: &SubmissionId,
        expected: SubmissionStatus,
        commit: DecisionCommit,
    ) -> Result<Submission, StoreError> {
        let mut guard = self.records.lock().expect("submission mutex poisoned");
        let record = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        if record.status != expected {
            return Err(StoreError::StatusMismatch {
                expected,
                actual: record.status,
            });
        }
        record.apply_commit(commit);
        Ok(record.clone())
    }

    fn scan(
        &self,
        kind: SubmissionKind,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, StoreError> {
        let guard = self.records.lock().expect("submission mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| record.kind() == kind)
            .filter(|record| status.map_or(true, |status| record.status == status))
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryNotificationStore {
    records: Arc<Mutex<BTreeMap<String, NotificationRecord>>>,
}

impl InMemoryNotificationStore {
    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records
            .lock()
            .expect("notification mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn for_recipient(&self, recipient: &ActorId) -> Vec<NotificationRecord> {
        self.records()
            .into_iter()
            .filter(|record| &record.recipient_id == recipient)
            .collect()
    }
}

impl NotificationStore for InMemoryNotificationStore {
    fn upsert(&self, record: NotificationRecord) -> Result<WriteOutcome, SinkError> {
        let mut guard = self.records.lock().expect("notification mutex poisoned");
        if guard.contains_key(&record.key) {
            return Ok(WriteOutcome::Unchanged);
        }
        guard.insert(record.key.clone(), record);
        Ok(WriteOutcome::Written)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditLogStore for InMemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<WriteOutcome, SinkError> {
        let mut guard = self.entries.lock().expect("audit mutex poisoned");
        if guard.iter().any(|existing| existing.key == entry.key) {
            return Ok(WriteOutcome::Unchanged);
        }
        guard.push(entry);
        Ok(WriteOutcome::Written)
    }
}

#[derive(Default)]
struct EntityState {
    credits: HashMap<ActorId, BTreeMap<SubmissionId, u64>>,
    video_approvals: HashMap<ActorId, BTreeMap<SubmissionId, bool>>,
    job_listings: HashMap<SubmissionId, (ActorId, JobListingState)>,
    connections: HashMap<ConnectionId, Connection>,
}

#[derive(Default, Clone)]
pub struct InMemoryLinkedEntities {
    state: Arc<Mutex<EntityState>>,
}

impl InMemoryLinkedEntities {
    pub fn insert_connection(&self, connection: Connection) {
        let mut guard = self.state.lock().expect("entity mutex poisoned");
        guard.connections.insert(connection.id.clone(), connection);
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<Connection> {
        let guard = self.state.lock().expect("entity mutex poisoned");
        guard.connections.get(id).cloned()
    }

    pub fn account_balance(&self, account: &ActorId) -> u64 {
        let guard = self.state.lock().expect("entity mutex poisoned");
        guard
            .credits
            .get(account)
            .map(|ledger| ledger.values().sum())
            .unwrap_or_default()
    }

    /// `None` until some video of the profile has been decided.
    pub fn video_visible(&self, profile: &ActorId) -> Option<bool> {
        let guard = self.state.lock().expect("entity mutex poisoned");
        guard
            .video_approvals
            .get(profile)
            .map(|videos| videos.values().any(|approved| *approved))
    }

    pub fn job_listing(&self, posting: &SubmissionId) -> Option<JobListingState> {
        let guard = self.state.lock().expect("entity mutex poisoned");
        guard.job_listings.get(posting).map(|(_, state)| *state)
    }
}

impl LinkedEntityStore for InMemoryLinkedEntities {
    fn credit_account(
        &self,
        account: &ActorId,
        payment: &SubmissionId,
        amount_cents: u64,
    ) -> Result<WriteOutcome, SinkError> {
        let mut guard = self.state.lock().expect("entity mutex poisoned");
        let ledger = guard.credits.entry(account.clone()).or_default();
        if ledger.contains_key(payment) {
            return Ok(WriteOutcome::Unchanged);
        }
        ledger.insert(payment.clone(), amount_cents);
        Ok(WriteOutcome::Written)
    }

    fn set_video_visibility(
        &self,
        profile: &ActorId,
        video: &SubmissionId,
        approved: bool,
    ) -> Result<WriteOutcome, SinkError> {
        let mut guard = self.state.lock().expect("entity mutex poisoned");
        let videos = guard.video_approvals.entry(profile.clone()).or_default();
        match videos.insert(video.clone(), approved) {
            Some(previous) if previous == approved => Ok(WriteOutcome::Unchanged),
            _ => Ok(WriteOutcome::Written),
        }
    }

    fn set_job_listing(
        &self,
        posting: &SubmissionId,
        owner: &ActorId,
        state: JobListingState,
    ) -> Result<WriteOutcome, SinkError> {
        let mut guard = self.state.lock().expect("entity mutex poisoned");
        match guard
            .job_listings
            .insert(posting.clone(), (owner.clone(), state))
        {
            Some((_, previous)) if previous == state => Ok(WriteOutcome::Unchanged),
            _ => Ok(WriteOutcome::Written),
        }
    }

    fn register_connection(&self, connection: Connection) -> Result<WriteOutcome, SinkError> {
        let mut guard = self.state.lock().expect("entity mutex poisoned");
        match guard.connections.get(&connection.id) {
            Some(existing)
                if existing.employer_id == connection.employer_id
                    && existing.candidate_id == connection.candidate_id =>
            {
                Ok(WriteOutcome::Unchanged)
            }
            Some(existing) => Err(SinkError::Conflict(format!(
                "connection {} belongs to other parties",
                existing.id
            ))),
            None => {
                guard.connections.insert(connection.id.clone(), connection);
                Ok(WriteOutcome::Written)
            }
        }
    }

    fn fetch_connection(&self, id: &ConnectionId) -> Result<Option<Connection>, SinkError> {
        Ok(self.connection(id))
    }

    fn link_payment(
        &self,
        id: &ConnectionId,
        payment: &SubmissionId,
        replaces: Option<&SubmissionId>,
    ) -> Result<WriteOutcome, SinkError> {
        let mut guard = self.state.lock().expect("entity mutex poisoned");
        let connection = guard
            .connections
            .get_mut(id)
            .ok_or_else(|| SinkError::Missing(format!("connection {id}")))?;
        if connection.payment_submission_id.as_ref() == Some(payment) {
            return Ok(WriteOutcome::Unchanged);
        }
        if connection.payment_submission_id.as_ref() != replaces {
            return Err(SinkError::Conflict(format!(
                "connection {id} was linked to another payment"
            )));
        }
        connection.payment_submission_id = Some(payment.clone());
        connection.payment_status = None;
        Ok(WriteOutcome::Written)
    }

    fn unlink_payment(
        &self,
        id: &ConnectionId,
        payment: &SubmissionId,
    ) -> Result<WriteOutcome, SinkError> {
        let mut guard = self.state.lock().expect("entity mutex poisoned");
        let connection = guard
            .connections
            .get_mut(id)
            .ok_or_else(|| SinkError::Missing(format!("connection {id}")))?;
        if connection.payment_submission_id.as_ref() != Some(payment) {
            return Ok(WriteOutcome::Unchanged);
        }
        connection.payment_submission_id = None;
        connection.payment_status = None;
        Ok(WriteOutcome::Written)
    }

    fn update_reveal(
        &self,
        id: &ConnectionId,
        payment: &SubmissionId,
        reveal_status: RevealStatus,
        payment_status: SubmissionStatus,
    ) -> Result<WriteOutcome, SinkError> {
        let mut guard = self.state.lock().expect("entity mutex poisoned");
        let connection = guard
            .connections
            .get_mut(id)
            .ok_or_else(|| SinkError::Missing(format!("connection {id}")))?;
        // An unlocked connection never locks again.
        let next = if connection.is_revealed() {
            RevealStatus::Approved
        } else {
            reveal_status
        };
        if connection.reveal_status == next
            && connection.payment_status == Some(payment_status)
            && connection.payment_submission_id.as_ref() == Some(payment)
        {
            return Ok(WriteOutcome::Unchanged);
        }
        connection.reveal_status = next;
        connection.payment_submission_id = Some(payment.clone());
        connection.payment_status = Some(payment_status);
        Ok(WriteOutcome::Written)
    }
}

/// Captures outbound messages instead of delivering them.
#[derive(Default, Clone)]
pub struct InMemoryOutbox {
    messages: Arc<Mutex<BTreeMap<String, OutboundMessage>>>,
}

impl InMemoryOutbox {
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .expect("outbox mutex poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl OutboundMessenger for InMemoryOutbox {
    fn send(&self, message: OutboundMessage) -> Result<(), SinkError> {
        let mut guard = self.messages.lock().expect("outbox mutex poisoned");
        guard.insert(message.key.clone(), message);
        Ok(())
    }
}

/// Concrete handles to every in-memory target, for inspection after dispatch.
#[derive(Default, Clone)]
pub struct InMemoryTargets {
    pub notifications: Arc<InMemoryNotificationStore>,
    pub audit_log: Arc<InMemoryAuditLog>,
    pub entities: Arc<InMemoryLinkedEntities>,
    pub outbox: Arc<InMemoryOutbox>,
}

impl InMemoryTargets {
    pub fn targets(&self, with_email: bool) -> SideEffectTargets {
        let targets = SideEffectTargets::new(
            self.notifications.clone(),
            self.audit_log.clone(),
            self.entities.clone(),
        );
        if with_email {
            targets.with_messenger(self.outbox.clone())
        } else {
            targets
        }
    }
}
