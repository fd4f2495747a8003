use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::dispatch::{
    DispatchError, DispatchReport, SideEffectDispatcher, SideEffectStep, SideEffectTargets,
};
use super::domain::{
    ConnectionId, ConnectionRequest, DecisionRequest, NewSubmission, Submission, SubmissionId,
    SubmissionKind, SubmissionPayload, ValidationError,
};
use super::expiry::{DecisionWindowView, ExpiryPolicy};
use super::machine::{ApprovalStateMachine, DecisionError, SweepFailure};
use super::projection::{QueueCounts, QueueCursor, QueuePage, ReviewQueueProjection, StatusFilter};
use super::repository::{Connection, SinkError, StoreError, SubmissionStore};

/// Facade composing the state machine, dispatcher, and queue projection.
pub struct ReviewService<S> {
    store: Arc<S>,
    machine: Arc<ApprovalStateMachine<S>>,
    dispatcher: SideEffectDispatcher,
    projection: ReviewQueueProjection<S>,
}

static SUBMISSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_submission_id(kind: SubmissionKind) -> SubmissionId {
    let id = SUBMISSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let prefix = match kind {
        SubmissionKind::Payment => "pay",
        SubmissionKind::JobPosting => "job",
        SubmissionKind::Video => "vid",
        SubmissionKind::Connection => "con",
    };
    SubmissionId(format!("{prefix}-{id:06}"))
}

/// A committed decision together with its first dispatch pass.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionReceipt {
    pub submission: Submission,
    pub dispatch: DispatchReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub kind: SubmissionKind,
    pub scanned: usize,
    pub expired: Vec<SubmissionId>,
    pub dispatch: Vec<DispatchReport>,
    /// Overdue submissions the store refused to expire this time.
    pub failed: Vec<SweepFailure>,
}

impl<S> ReviewService<S>
where
    S: SubmissionStore + 'static,
{
    pub fn new(store: Arc<S>, targets: SideEffectTargets, policy: ExpiryPolicy) -> Self {
        let machine = Arc::new(ApprovalStateMachine::new(store.clone(), policy));
        Self {
            dispatcher: SideEffectDispatcher::new(targets).with_settler(machine.clone()),
            projection: ReviewQueueProjection::new(store.clone()),
            machine,
            store,
        }
    }

    pub fn policy(&self) -> &ExpiryPolicy {
        self.machine.policy()
    }

    pub fn dispatcher(&self) -> &SideEffectDispatcher {
        &self.dispatcher
    }

    /// Record a new pending submission.
    pub fn submit(
        &self,
        submission: NewSubmission,
        now: DateTime<Utc>,
    ) -> Result<Submission, ReviewError> {
        let NewSubmission {
            submitter_id,
            payload,
        } = submission;

        if submitter_id.as_str().trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "submitter_id",
            }
            .into());
        }
        payload.validate()?;

        let kind = payload.kind();
        let id = next_submission_id(kind);
        let linked_connection = match &payload {
            SubmissionPayload::Payment(proof) => proof.connection_id.clone(),
            SubmissionPayload::Connection(request) => {
                self.register_connection(request)?;
                None
            }
            _ => None,
        };
        if let Some(connection_id) = &linked_connection {
            self.claim_connection(connection_id, &id)?;
        }

        let stored = match self
            .store
            .insert(Submission::pending(id.clone(), submitter_id, now, payload))
        {
            Ok(stored) => stored,
            Err(error) => {
                if let Some(connection_id) = &linked_connection {
                    self.release_connection(connection_id, &id);
                }
                return Err(error.into());
            }
        };

        info!(submission_id = %stored.id, %kind, submitter = %stored.submitter_id, "submission received");
        Ok(stored)
    }

    fn register_connection(&self, request: &ConnectionRequest) -> Result<(), ReviewError> {
        let connection = Connection::new(
            request.connection_id.clone(),
            request.employer_id.clone(),
            request.candidate_id.clone(),
        );
        match self.dispatcher.targets().entities.register_connection(connection) {
            Ok(_) => Ok(()),
            Err(SinkError::Conflict(_)) => Err(ValidationError::ConnectionPartiesMismatch {
                connection_id: request.connection_id.clone(),
            }
            .into()),
            Err(other) => Err(other.into()),
        }
    }

    /// Link `payment` to its connection. A connection backs at most one
    /// payment awaiting review, and an unlocked one needs no further payment.
    fn claim_connection(
        &self,
        connection_id: &ConnectionId,
        payment: &SubmissionId,
    ) -> Result<(), ReviewError> {
        let entities = &self.dispatcher.targets().entities;
        let connection = entities
            .fetch_connection(connection_id)?
            .ok_or_else(|| SinkError::Missing(format!("connection {connection_id}")))?;
        if connection.is_revealed() {
            return Err(ValidationError::ConnectionAlreadyRevealed {
                connection_id: connection_id.clone(),
            }
            .into());
        }

        let pending = || -> ReviewError {
            ValidationError::ConnectionPaymentPending {
                connection_id: connection_id.clone(),
            }
            .into()
        };
        let current = connection.payment_submission_id.as_ref();
        if let Some(current) = current {
            if self
                .store
                .fetch(current)?
                .is_some_and(|existing| existing.is_pending())
            {
                return Err(pending());
            }
        }

        match entities.link_payment(connection_id, payment, current) {
            Ok(_) => Ok(()),
            Err(SinkError::Conflict(_)) => Err(pending()),
            Err(other) => Err(other.into()),
        }
    }

    fn release_connection(&self, connection_id: &ConnectionId, payment: &SubmissionId) {
        if let Err(error) = self
            .dispatcher
            .targets()
            .entities
            .unlink_payment(connection_id, payment)
        {
            warn!(%connection_id, payment_id = %payment, %error, "connection link not released after failed intake");
        }
    }

    pub fn get(&self, id: &SubmissionId) -> Result<Submission, ReviewError> {
        self.store
            .fetch(id)?
            .ok_or_else(|| ReviewError::NotFound(id.clone()))
    }

    /// Commit a reviewer decision and propagate it. Side-effect failures are
    /// reported inside the receipt; the decision itself stands.
    pub fn decide(
        &self,
        request: DecisionRequest,
        now: DateTime<Utc>,
    ) -> Result<DecisionReceipt, ReviewError> {
        let submission = self.machine.decide(request, now)?;
        let dispatch = self.dispatcher.dispatch(&submission)?;
        if !dispatch.is_complete() {
            warn!(
                submission_id = %submission.id,
                failed = ?dispatch.failed_steps(),
                "decision committed with side effects pending retry"
            );
        }
        Ok(DecisionReceipt {
            submission,
            dispatch,
        })
    }

    /// Replay side effects for an already decided submission. With no explicit
    /// step list the whole plan runs again; every step is idempotent.
    pub fn retry_dispatch(
        &self,
        id: &SubmissionId,
        steps: Option<&[SideEffectStep]>,
    ) -> Result<DispatchReport, ReviewError> {
        let submission = self.get(id)?;
        let report = match steps {
            Some(steps) => self.dispatcher.retry(&submission, steps)?,
            None => self.dispatcher.dispatch(&submission)?,
        };
        info!(submission_id = %id, complete = report.is_complete(), "dispatch replayed");
        Ok(report)
    }

    /// Expire overdue submissions of `kind` using its configured window.
    pub fn sweep(&self, kind: SubmissionKind, now: DateTime<Utc>) -> Result<SweepSummary, ReviewError> {
        let Some(window) = self.policy().window_for(kind) else {
            return Ok(SweepSummary {
                kind,
                scanned: 0,
                expired: Vec::new(),
                dispatch: Vec::new(),
                failed: Vec::new(),
            });
        };

        // Committed expirations are dispatched even when other candidates failed.
        let report = self.machine.sweep_expired(kind, window, now)?;
        if !report.failed.is_empty() {
            warn!(%kind, failed = report.failed.len(), "expiry sweep left submissions pending");
        }
        let mut dispatch = Vec::with_capacity(report.count());
        for submission in &report.expired {
            dispatch.push(self.dispatcher.dispatch(submission)?);
        }

        Ok(SweepSummary {
            kind,
            scanned: report.scanned,
            expired: report.expired.into_iter().map(|item| item.id).collect(),
            dispatch,
            failed: report.failed,
        })
    }

    /// Sweep every kind that has a decision window.
    pub fn sweep_all(&self, now: DateTime<Utc>) -> Result<Vec<SweepSummary>, ReviewError> {
        let kinds: Vec<SubmissionKind> = self.policy().bounded_kinds().map(|(kind, _)| kind).collect();
        kinds.into_iter().map(|kind| self.sweep(kind, now)).collect()
    }

    pub fn queue(
        &self,
        kind: SubmissionKind,
        filter: StatusFilter,
    ) -> Result<Vec<Submission>, ReviewError> {
        Ok(self.projection.list(kind, filter)?)
    }

    pub fn queue_page(
        &self,
        kind: SubmissionKind,
        filter: StatusFilter,
        after: Option<&QueueCursor>,
        limit: usize,
    ) -> Result<QueuePage, ReviewError> {
        Ok(self.projection.page(kind, filter, after, limit)?)
    }

    pub fn counts(&self, kind: SubmissionKind) -> Result<QueueCounts, ReviewError> {
        Ok(self.projection.counts_by_status(kind)?)
    }

    pub fn window(&self, id: &SubmissionId, now: DateTime<Utc>) -> Result<DecisionWindowView, ReviewError> {
        let submission = self.get(id)?;
        Ok(self.policy().window_view(&submission, now))
    }
}

/// Error raised by the review service.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Decision(#[from] DecisionError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("submission {0} not found")]
    NotFound(SubmissionId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Linked(#[from] SinkError),
}
