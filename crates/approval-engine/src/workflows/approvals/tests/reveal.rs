use super::common::*;

use crate::workflows::approvals::domain::{
    ConnectionId, DecisionCommit, Submission, SubmissionStatus,
};
use crate::workflows::approvals::memory::InMemoryTargets;
use crate::workflows::approvals::repository::RevealStatus;
use crate::workflows::approvals::reveal::{RevealError, RevealGate, RevealOutcome};

fn gate() -> (InMemoryTargets, RevealGate) {
    let targets = InMemoryTargets::default();
    let gate = RevealGate::new(targets.targets(false));
    (targets, gate)
}

fn settle(mut submission: Submission, status: SubmissionStatus) -> Submission {
    let commit = match status {
        SubmissionStatus::Expired => DecisionCommit::expire(t0() + minutes(30)),
        _ => DecisionCommit {
            status,
            decided_at: t0() + minutes(5),
            decider_id: Some(reviewer()),
            rejection_reason: (status == SubmissionStatus::Rejected)
                .then(|| "reference not found".to_string()),
            featured: false,
        },
    };
    submission.apply_commit(commit);
    submission
}

#[test]
fn approved_payment_unlocks_connection_and_notifies_employer() {
    let (targets, gate) = gate();
    targets
        .entities
        .insert_connection(connection("conn-1", Some("pay-1")));

    let outcome = gate
        .on_payment_decided(&settle(
            linked_payment("pay-1", "conn-1", t0()),
            SubmissionStatus::Approved,
        ))
        .expect("gate runs");

    assert_eq!(
        outcome,
        RevealOutcome::Unlocked {
            connection_id: ConnectionId::new("conn-1")
        }
    );
    let stored = targets
        .entities
        .connection(&ConnectionId::new("conn-1"))
        .expect("connection present");
    assert_eq!(stored.reveal_status, RevealStatus::Approved);
    assert_eq!(stored.payment_status, Some(SubmissionStatus::Approved));

    let inbox = targets.notifications.for_recipient(&submitter());
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification_type, "contact_reveal_approved");
}

#[test]
fn rejected_or_expired_payment_keeps_details_hidden() {
    for status in [SubmissionStatus::Rejected, SubmissionStatus::Expired] {
        let (targets, gate) = gate();
        targets
            .entities
            .insert_connection(connection("conn-1", Some("pay-1")));

        let outcome = gate
            .on_payment_decided(&settle(linked_payment("pay-1", "conn-1", t0()), status))
            .expect("gate runs");

        assert_eq!(
            outcome,
            RevealOutcome::Withheld {
                connection_id: ConnectionId::new("conn-1"),
                payment_status: status,
            }
        );
        let stored = targets
            .entities
            .connection(&ConnectionId::new("conn-1"))
            .expect("connection present");
        assert!(!stored.is_revealed());
        assert_eq!(stored.payment_status, Some(status));
        assert_eq!(
            targets.notifications.records()[0].notification_type,
            format!("contact_reveal_{status}")
        );
    }
}

#[test]
fn already_unlocked_connection_is_left_alone() {
    let (targets, gate) = gate();
    let mut unlocked = connection("conn-1", Some("pay-1"));
    unlocked.reveal_status = RevealStatus::Approved;
    unlocked.payment_status = Some(SubmissionStatus::Approved);
    targets.entities.insert_connection(unlocked);

    let payment = settle(
        linked_payment("pay-1", "conn-1", t0()),
        SubmissionStatus::Approved,
    );
    let outcome = gate.on_payment_decided(&payment).expect("gate runs");

    assert_eq!(
        outcome,
        RevealOutcome::AlreadyUnlocked {
            connection_id: ConnectionId::new("conn-1")
        }
    );
}

#[test]
fn superseded_payment_still_tells_the_employer() {
    for status in [SubmissionStatus::Rejected, SubmissionStatus::Expired] {
        let (targets, gate) = gate();
        targets
            .entities
            .insert_connection(connection("conn-1", Some("pay-2")));

        let outcome = gate
            .on_payment_decided(&settle(linked_payment("pay-1", "conn-1", t0()), status))
            .expect("gate runs");

        assert_eq!(
            outcome,
            RevealOutcome::Superseded {
                connection_id: ConnectionId::new("conn-1")
            }
        );
        let stored = targets
            .entities
            .connection(&ConnectionId::new("conn-1"))
            .expect("connection present");
        assert_eq!(stored, connection("conn-1", Some("pay-2")));

        let inbox = targets.notifications.for_recipient(&submitter());
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].notification_type, format!("contact_reveal_{status}"));
    }
}

#[test]
fn approved_payment_unlocks_even_after_relink() {
    let (targets, gate) = gate();
    targets
        .entities
        .insert_connection(connection("conn-1", Some("pay-2")));
    let payment = settle(
        linked_payment("pay-1", "conn-1", t0()),
        SubmissionStatus::Approved,
    );

    assert_eq!(
        gate.on_payment_decided(&payment),
        Ok(RevealOutcome::Unlocked {
            connection_id: ConnectionId::new("conn-1")
        })
    );
    let stored = targets
        .entities
        .connection(&ConnectionId::new("conn-1"))
        .expect("connection present");
    assert!(stored.is_revealed());
    assert_eq!(stored.payment_submission_id, Some(payment.id.clone()));

    assert_eq!(
        gate.on_payment_decided(&payment),
        Ok(RevealOutcome::AlreadyUnlocked {
            connection_id: ConnectionId::new("conn-1")
        })
    );
    assert_eq!(targets.notifications.records().len(), 1);
}

#[test]
fn gate_rejects_inputs_it_cannot_mirror() {
    let (_, gate) = gate();

    assert_eq!(
        gate.on_payment_decided(&settle(payment("pay-1", t0()), SubmissionStatus::Approved)),
        Ok(RevealOutcome::NotLinked)
    );
    assert!(matches!(
        gate.on_payment_decided(&linked_payment("pay-1", "conn-1", t0())),
        Err(RevealError::NotDecided(_))
    ));
    assert!(matches!(
        gate.on_payment_decided(&settle(job_posting("job-1", t0()), SubmissionStatus::Approved)),
        Err(RevealError::NotPayment(_))
    ));
    assert!(matches!(
        gate.on_payment_decided(&settle(
            linked_payment("pay-1", "conn-missing", t0()),
            SubmissionStatus::Approved
        )),
        Err(RevealError::ConnectionMissing(_))
    ));
}
