use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::dispatch::RevealRequestSettler;
use super::domain::{
    DecisionCommit, DecisionOutcome, DecisionRequest, Submission, SubmissionId, SubmissionKind,
    SubmissionStatus, ValidationError,
};
use super::expiry::{self, ExpiryPolicy};
use super::repository::{StoreError, SubmissionStore, WriteOutcome};

/// Validates and commits transitions out of `pending`.
///
/// The machine holds no state of its own; the store's conditional write is the
/// sole arbiter when two reviewers race on the same submission.
pub struct ApprovalStateMachine<S> {
    store: Arc<S>,
    policy: ExpiryPolicy,
}

impl<S> ApprovalStateMachine<S>
where
    S: SubmissionStore + 'static,
{
    pub fn new(store: Arc<S>, policy: ExpiryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &ExpiryPolicy {
        &self.policy
    }

    /// Apply a reviewer decision evaluated at `now`.
    pub fn decide(
        &self,
        request: DecisionRequest,
        now: DateTime<Utc>,
    ) -> Result<Submission, DecisionError> {
        let DecisionRequest {
            submission_id,
            outcome,
            actor_id,
            reason,
            feature,
        } = request;

        if actor_id.as_str().trim().is_empty() {
            return Err(ValidationError::MissingActor.into());
        }
        let rejection_reason = match outcome {
            DecisionOutcome::Rejected => {
                let reason = reason
                    .map(|reason| reason.trim().to_string())
                    .filter(|reason| !reason.is_empty())
                    .ok_or(ValidationError::MissingRejectionReason)?;
                Some(reason)
            }
            DecisionOutcome::Approved => None,
        };

        let current = self
            .store
            .fetch(&submission_id)?
            .ok_or_else(|| DecisionError::NotFound(submission_id.clone()))?;

        if current.status.is_terminal() {
            debug!(submission_id = %submission_id, status = %current.status, "decision on settled submission");
            return Err(DecisionError::AlreadyDecided {
                submission_id,
                current: current.status,
            });
        }

        let kind = current.kind();
        if feature && !(outcome == DecisionOutcome::Approved && kind == SubmissionKind::JobPosting) {
            return Err(ValidationError::FeatureRequiresJobPostingApproval.into());
        }
        if outcome == DecisionOutcome::Approved && kind == SubmissionKind::Connection {
            return Err(ValidationError::RevealApprovalRequiresPayment.into());
        }

        if outcome == DecisionOutcome::Approved {
            if let Some(window) = self.policy.window_for(kind) {
                if expiry::is_expired(current.submitted_at, now, window) {
                    let deadline = expiry::deadline(current.submitted_at, window).unwrap_or(now);
                    warn!(submission_id = %submission_id, %kind, %deadline, "approval attempted after decision window");
                    return Err(DecisionError::WindowExpired {
                        submission_id,
                        deadline,
                    });
                }
            }
        }

        let commit = DecisionCommit {
            status: outcome.status(),
            decided_at: now,
            decider_id: Some(actor_id.clone()),
            rejection_reason,
            featured: feature,
        };

        match self
            .store
            .compare_and_commit(&submission_id, SubmissionStatus::Pending, commit)
        {
            Ok(updated) => {
                info!(
                    submission_id = %submission_id,
                    %kind,
                    status = %updated.status,
                    decider = %actor_id,
                    "decision committed"
                );
                Ok(updated)
            }
            Err(StoreError::StatusMismatch { actual, .. }) => {
                info!(submission_id = %submission_id, status = %actual, "decision lost race");
                Err(DecisionError::AlreadyDecided {
                    submission_id,
                    current: actual,
                })
            }
            Err(StoreError::NotFound) => Err(DecisionError::NotFound(submission_id)),
            Err(other) => Err(DecisionError::Store(other)),
        }
    }

    /// Move every pending submission of `kind` whose window has elapsed to
    /// `expired`. Submissions decided concurrently are left alone.
    pub fn sweep_expired(
        &self,
        kind: SubmissionKind,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, DecisionError> {
        let candidates = self.store.scan(kind, Some(SubmissionStatus::Pending))?;
        let scanned = candidates.len();
        let mut expired = Vec::new();
        let mut lost_races = 0;
        let mut failed = Vec::new();

        for candidate in candidates {
            if !candidate.is_pending()
                || !expiry::is_expired(candidate.submitted_at, now, window)
            {
                continue;
            }

            match self.store.compare_and_commit(
                &candidate.id,
                SubmissionStatus::Pending,
                DecisionCommit::expire(now),
            ) {
                Ok(updated) => expired.push(updated),
                Err(StoreError::StatusMismatch { .. }) | Err(StoreError::NotFound) => {
                    lost_races += 1;
                }
                Err(error) => {
                    warn!(submission_id = %candidate.id, %error, "expiry commit failed; left for the next sweep");
                    failed.push(SweepFailure {
                        submission_id: candidate.id,
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            %kind,
            scanned,
            expired = expired.len(),
            lost_races,
            failed = failed.len(),
            "expiry sweep finished"
        );

        Ok(SweepReport {
            kind,
            scanned,
            expired,
            lost_races,
            failed,
        })
    }

    /// Settle the contact-reveal requests for the payment's connection with the
    /// payment's own terminal status. Requests already mirroring this payment
    /// are returned again so their side effects can be replayed.
    pub fn mirror_payment(
        &self,
        payment: &Submission,
    ) -> Result<Vec<(Submission, WriteOutcome)>, DecisionError> {
        let (Some(connection_id), Some(decided_at)) = (payment.connection_id(), payment.decided_at)
        else {
            return Ok(Vec::new());
        };
        if payment.kind() != SubmissionKind::Payment {
            return Ok(Vec::new());
        }

        let requests = self.store.scan(SubmissionKind::Connection, None)?;
        let mut mirrored = Vec::new();
        for request in requests {
            if request.connection_id() != Some(connection_id) {
                continue;
            }
            if !request.is_pending() {
                if request.status == payment.status && request.decided_at == Some(decided_at) {
                    mirrored.push((request, WriteOutcome::Unchanged));
                }
                continue;
            }

            let commit = DecisionCommit {
                status: payment.status,
                decided_at,
                decider_id: payment.decider_id.clone(),
                rejection_reason: payment.rejection_reason.as_ref().map(|reason| {
                    format!("payment {} was rejected: {reason}", payment.id)
                }),
                featured: false,
            };
            match self
                .store
                .compare_and_commit(&request.id, SubmissionStatus::Pending, commit)
            {
                Ok(updated) => {
                    info!(
                        submission_id = %updated.id,
                        payment_id = %payment.id,
                        status = %updated.status,
                        "reveal request settled by payment"
                    );
                    mirrored.push((updated, WriteOutcome::Written));
                }
                Err(StoreError::StatusMismatch { .. }) | Err(StoreError::NotFound) => {
                    debug!(submission_id = %request.id, "reveal request settled elsewhere");
                }
                Err(other) => return Err(DecisionError::Store(other)),
            }
        }
        Ok(mirrored)
    }
}

impl<S> RevealRequestSettler for ApprovalStateMachine<S>
where
    S: SubmissionStore + 'static,
{
    fn mirror_payment(
        &self,
        payment: &Submission,
    ) -> Result<Vec<(Submission, WriteOutcome)>, DecisionError> {
        ApprovalStateMachine::mirror_payment(self, payment)
    }
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub kind: SubmissionKind,
    pub scanned: usize,
    pub expired: Vec<Submission>,
    pub lost_races: usize,
    /// Candidates whose expiry commit failed; they stay pending.
    pub failed: Vec<SweepFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub submission_id: SubmissionId,
    pub error: String,
}

impl SweepReport {
    pub fn count(&self) -> usize {
        self.expired.len()
    }
}

/// Why a decision did not commit.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("decision window for {submission_id} closed at {deadline}; a fresh submission is required")]
    WindowExpired {
        submission_id: SubmissionId,
        deadline: DateTime<Utc>,
    },
    #[error("submission {submission_id} was already {current}")]
    AlreadyDecided {
        submission_id: SubmissionId,
        current: SubmissionStatus,
    },
    #[error("submission {0} not found")]
    NotFound(SubmissionId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DecisionError {
    /// Lost races are reported to the caller as "already handled", not as faults.
    pub fn is_already_handled(&self) -> bool {
        matches!(self, DecisionError::AlreadyDecided { .. })
    }
}
