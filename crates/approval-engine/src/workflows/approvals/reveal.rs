//! Contact-reveal gating driven by payment outcomes.
//!
//! The gate never decides anything. It reads the terminal status of a payment
//! and mirrors it onto the connection that payment was bought for: an approved
//! payment unlocks the candidate's contact details, any other outcome leaves
//! them hidden and tells the employer why.

use serde::Serialize;
use tracing::info;

use super::dispatch::SideEffectTargets;
use super::domain::{ConnectionId, Submission, SubmissionId, SubmissionKind, SubmissionStatus};
use super::repository::{Connection, NotificationRecord, RevealStatus, SinkError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RevealOutcome {
    /// The payment was not bought for a connection.
    NotLinked,
    Unlocked {
        connection_id: ConnectionId,
    },
    AlreadyUnlocked {
        connection_id: ConnectionId,
    },
    Withheld {
        connection_id: ConnectionId,
        payment_status: SubmissionStatus,
    },
    /// A newer payment now backs the connection. The employer still hears
    /// about this outcome, but the connection is not touched.
    Superseded {
        connection_id: ConnectionId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevealError {
    #[error("submission {0} is not a payment")]
    NotPayment(SubmissionId),
    #[error("payment {0} has not been decided")]
    NotDecided(SubmissionId),
    #[error("connection {0} not found")]
    ConnectionMissing(ConnectionId),
    #[error(transparent)]
    Target(#[from] SinkError),
}

pub struct RevealGate {
    targets: SideEffectTargets,
}

impl RevealGate {
    pub fn new(targets: SideEffectTargets) -> Self {
        Self { targets }
    }

    pub fn on_payment_decided(&self, payment: &Submission) -> Result<RevealOutcome, RevealError> {
        if payment.kind() != SubmissionKind::Payment {
            return Err(RevealError::NotPayment(payment.id.clone()));
        }
        if payment.is_pending() {
            return Err(RevealError::NotDecided(payment.id.clone()));
        }
        let Some(connection_id) = payment.connection_id().cloned() else {
            return Ok(RevealOutcome::NotLinked);
        };

        let connection = self
            .targets
            .entities
            .fetch_connection(&connection_id)?
            .ok_or_else(|| RevealError::ConnectionMissing(connection_id.clone()))?;

        let linked = connection.payment_submission_id.as_ref() == Some(&payment.id);
        let outcome = match payment.status {
            SubmissionStatus::Approved if connection.is_revealed() => {
                RevealOutcome::AlreadyUnlocked {
                    connection_id: connection_id.clone(),
                }
            }
            // Any approved payment bought for this connection unlocks it, even
            // if a later attempt has since taken over the link.
            SubmissionStatus::Approved => {
                self.targets.entities.update_reveal(
                    &connection_id,
                    &payment.id,
                    RevealStatus::Approved,
                    payment.status,
                )?;
                info!(connection_id = %connection_id, payment_id = %payment.id, "contact details unlocked");
                RevealOutcome::Unlocked {
                    connection_id: connection_id.clone(),
                }
            }
            _ if !linked => {
                info!(connection_id = %connection_id, payment_id = %payment.id, status = %payment.status, "payment outcome superseded by a newer link");
                RevealOutcome::Superseded {
                    connection_id: connection_id.clone(),
                }
            }
            status => {
                self.targets.entities.update_reveal(
                    &connection_id,
                    &payment.id,
                    connection.reveal_status,
                    status,
                )?;
                info!(connection_id = %connection_id, payment_id = %payment.id, %status, "contact details stay hidden");
                RevealOutcome::Withheld {
                    connection_id: connection_id.clone(),
                    payment_status: status,
                }
            }
        };

        self.targets
            .notify(employer_notification(payment, &connection))?;
        Ok(outcome)
    }
}

fn employer_notification(payment: &Submission, connection: &Connection) -> NotificationRecord {
    let (title, message) = match payment.status {
        SubmissionStatus::Approved => (
            "Contact details unlocked".to_string(),
            "Your payment was approved. The candidate's contact details are now visible."
                .to_string(),
        ),
        SubmissionStatus::Rejected => (
            "Contact reveal declined".to_string(),
            format!(
                "Your payment was rejected ({}), so the candidate's contact details remain hidden.",
                payment.rejection_reason.as_deref().unwrap_or("no reason given")
            ),
        ),
        _ => (
            "Contact reveal expired".to_string(),
            "Your payment was not reviewed in time, so the candidate's contact details remain hidden. Please submit a new payment proof."
                .to_string(),
        ),
    };

    NotificationRecord {
        key: format!("{}:contact_reveal", payment.id),
        recipient_id: connection.employer_id.clone(),
        notification_type: format!("contact_reveal_{}", payment.status.label()),
        title,
        message,
        read: false,
        created_at: payment.decided_at.unwrap_or(payment.submitted_at),
    }
}
