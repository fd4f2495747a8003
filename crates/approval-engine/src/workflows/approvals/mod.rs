//! Submission moderation: the shared pending -> approved | rejected | expired
//! lifecycle, decision windows, side-effect propagation, and review queues.

pub mod dispatch;
pub mod domain;
pub mod expiry;
pub mod machine;
pub mod memory;
pub mod projection;
pub mod repository;
pub mod reveal;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use dispatch::{
    DispatchError, DispatchPartialFailure, DispatchReport, RevealRequestSettler,
    SideEffectDispatcher, SideEffectStep, SideEffectTargets, StepResult, StepStatus,
};
pub use domain::{
    ActorId, ConnectionId, ConnectionRequest, DecisionCommit, DecisionOutcome, DecisionRequest,
    JobPostingDraft, NewSubmission, PaymentProof, Submission, SubmissionId, SubmissionKind,
    SubmissionPayload, SubmissionStatus, ValidationError, VideoSubmission,
};
pub use expiry::{DecisionWindowView, ExpiryPolicy, DEFAULT_PAYMENT_WINDOW_MINUTES};
pub use machine::{ApprovalStateMachine, DecisionError, SweepFailure, SweepReport};
pub use memory::{
    InMemoryAuditLog, InMemoryLinkedEntities, InMemoryNotificationStore, InMemoryOutbox,
    InMemorySubmissionStore, InMemoryTargets,
};
pub use projection::{QueueCounts, QueueCursor, QueuePage, ReviewQueueProjection, StatusFilter};
pub use repository::{
    AuditEntry, AuditLogStore, Connection, JobListingState, LinkedEntityStore,
    NotificationRecord, NotificationStore, OutboundMessage, OutboundMessenger, RevealStatus,
    SinkError, StoreError, SubmissionStore, WriteOutcome,
};
pub use reveal::{RevealError, RevealGate, RevealOutcome};
pub use router::{review_error_response, review_router};
pub use service::{DecisionReceipt, ReviewError, ReviewService, SweepSummary};
