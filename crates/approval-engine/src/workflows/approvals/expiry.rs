//! Decision-window arithmetic shared by the countdown display and the
//! authoritative approval check.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::domain::{Submission, SubmissionId, SubmissionKind, SubmissionStatus};
use crate::config::ReviewConfig;

pub const DEFAULT_PAYMENT_WINDOW_MINUTES: i64 = 30;

/// Instant at which a window opened at `submitted_at` closes. `None` when the
/// sum is not representable, which is treated as a window that never closes.
pub fn deadline(submitted_at: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    submitted_at.checked_add_signed(window)
}

/// Whether the decision window has elapsed. A window closes at its deadline,
/// so a submission is expired from `submitted_at + window` onward.
pub fn is_expired(submitted_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    match deadline(submitted_at, window) {
        Some(closes_at) => now >= closes_at,
        None => false,
    }
}

/// Time left before the window closes, clamped at zero. Zero exactly when
/// [`is_expired`] holds; `None` when the window never closes.
pub fn time_remaining(
    submitted_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<Duration> {
    deadline(submitted_at, window).map(|closes_at| {
        if now < closes_at {
            closes_at - now
        } else {
            Duration::zero()
        }
    })
}

/// Per-kind decision windows. Kinds without an entry never expire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryPolicy {
    windows: BTreeMap<SubmissionKind, Duration>,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::unbounded().with_window(
            SubmissionKind::Payment,
            Duration::minutes(DEFAULT_PAYMENT_WINDOW_MINUTES),
        )
    }
}

impl ExpiryPolicy {
    pub fn unbounded() -> Self {
        Self {
            windows: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        Self::unbounded().with_window(SubmissionKind::Payment, config.payment_window())
    }

    pub fn with_window(mut self, kind: SubmissionKind, window: Duration) -> Self {
        self.windows.insert(kind, window);
        self
    }

    pub fn window_for(&self, kind: SubmissionKind) -> Option<Duration> {
        self.windows.get(&kind).copied()
    }

    pub fn bounded_kinds(&self) -> impl Iterator<Item = (SubmissionKind, Duration)> + '_ {
        self.windows.iter().map(|(kind, window)| (*kind, *window))
    }

    pub fn is_submission_expired(&self, submission: &Submission, now: DateTime<Utc>) -> bool {
        self.window_for(submission.kind())
            .is_some_and(|window| is_expired(submission.submitted_at, now, window))
    }

    /// Informational countdown for reviewer and submitter screens.
    pub fn window_view(&self, submission: &Submission, now: DateTime<Utc>) -> DecisionWindowView {
        let window = self.window_for(submission.kind());
        let closes_at = window.and_then(|window| deadline(submission.submitted_at, window));
        let remaining =
            window.and_then(|window| time_remaining(submission.submitted_at, now, window));

        DecisionWindowView {
            submission_id: submission.id.clone(),
            kind: submission.kind(),
            status: submission.status,
            window_seconds: window.map(|window| window.num_seconds()),
            deadline: closes_at,
            remaining_seconds: remaining.map(|remaining| remaining.num_seconds()),
            expired: self.is_submission_expired(submission, now),
        }
    }
}

/// Serialized countdown state for a single submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionWindowView {
    pub submission_id: SubmissionId,
    pub kind: SubmissionKind,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
    pub expired: bool,
}
