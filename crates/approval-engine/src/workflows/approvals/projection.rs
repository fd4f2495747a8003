use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Submission, SubmissionId, SubmissionKind, SubmissionStatus};
use super::repository::{StoreError, SubmissionStore};

/// Status narrowing for queue tabs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(SubmissionStatus),
}

impl StatusFilter {
    fn as_option(self) -> Option<SubmissionStatus> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Only(status) => Some(status),
        }
    }
}

impl From<Option<SubmissionStatus>> for StatusFilter {
    fn from(value: Option<SubmissionStatus>) -> Self {
        value.map_or(StatusFilter::All, StatusFilter::Only)
    }
}

/// Resume point for a paged scan: the last item already handed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCursor {
    pub submitted_at: DateTime<Utc>,
    pub id: SubmissionId,
}

impl From<&Submission> for QueueCursor {
    fn from(submission: &Submission) -> Self {
        Self {
            submitted_at: submission.submitted_at,
            id: submission.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuePage {
    pub items: Vec<Submission>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<QueueCursor>,
}

/// Tab counts for one kind. Every submission lands in exactly one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub kind: SubmissionKind,
    pub total: usize,
    pub by_status: BTreeMap<SubmissionStatus, usize>,
}

impl QueueCounts {
    pub fn count(&self, status: SubmissionStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or_default()
    }
}

/// Read-only, pull-based view over the submission store for admin queues.
pub struct ReviewQueueProjection<S> {
    store: Arc<S>,
}

impl<S> ReviewQueueProjection<S>
where
    S: SubmissionStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Newest first; ties broken by id so repeated reads agree.
    pub fn list(
        &self,
        kind: SubmissionKind,
        filter: StatusFilter,
    ) -> Result<Vec<Submission>, StoreError> {
        let mut items = self.store.scan(kind, filter.as_option())?;
        items.retain(|item| item.kind() == kind);
        if let StatusFilter::Only(status) = filter {
            items.retain(|item| item.status == status);
        }
        items.sort_by(queue_order);
        Ok(items)
    }

    /// Up to `limit` items strictly after `after` in queue order. A zero limit
    /// is read as one so the returned cursor always makes progress.
    pub fn page(
        &self,
        kind: SubmissionKind,
        filter: StatusFilter,
        after: Option<&QueueCursor>,
        limit: usize,
    ) -> Result<QueuePage, StoreError> {
        let limit = limit.max(1);
        let items = self.list(kind, filter)?;
        let mut remaining: Vec<Submission> = match after {
            Some(cursor) => items
                .into_iter()
                .filter(|item| position(item) > (Reverse(cursor.submitted_at), &cursor.id))
                .collect(),
            None => items,
        };

        let has_more = remaining.len() > limit;
        remaining.truncate(limit);
        let next = if has_more {
            remaining.last().map(QueueCursor::from)
        } else {
            None
        };

        Ok(QueuePage {
            items: remaining,
            next,
        })
    }

    pub fn counts_by_status(&self, kind: SubmissionKind) -> Result<QueueCounts, StoreError> {
        let mut by_status: BTreeMap<SubmissionStatus, usize> = SubmissionStatus::ALL
            .into_iter()
            .map(|status| (status, 0))
            .collect();

        // One scan, one bucket per record: the buckets cannot overlap.
        let items = self.list(kind, StatusFilter::All)?;
        for item in &items {
            *by_status.entry(item.status).or_default() += 1;
        }

        Ok(QueueCounts {
            kind,
            total: items.len(),
            by_status,
        })
    }
}

fn position(submission: &Submission) -> (Reverse<DateTime<Utc>>, &SubmissionId) {
    (Reverse(submission.submitted_at), &submission.id)
}

fn queue_order(left: &Submission, right: &Submission) -> Ordering {
    position(left).cmp(&position(right))
}
