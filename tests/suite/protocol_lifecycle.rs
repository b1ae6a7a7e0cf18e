//! Protocol workflow from enrollment to phase-2 close.

use reprotrack_core::{CoreError, ErrorKind, Phase1Draft, Phase2Review};
use reprotrack_types::{EnrollmentDetails, ProtocolStatus, ReproductiveStatus, SubStatus, Verdict};

use crate::common::{core, cow, date, farm, header, run_protocol};

#[tokio::test]
async fn two_fit_one_unfit_synchronizes_the_protocol() {
    let core = core();
    let farm = farm(&core, "Santa Rita");
    let a = cow(&core, farm, "101", None);
    let b = cow(&core, farm, "102", None);
    let c = cow(&core, farm, "103", None);

    let protocol = core.protocols.create(&header(farm, date(2, 1))).await.unwrap();
    for recipient in [a, b, c] {
        core.protocols
            .enroll(protocol.id, recipient, &EnrollmentDetails::default())
            .await
            .unwrap();
    }
    core.protocols.close_phase1(protocol.id).await.unwrap();

    let statuses = core.status.resolve(&[a, b, c]).await.unwrap();
    assert!(
        statuses
            .values()
            .all(|status| *status == ReproductiveStatus::Synchronizing)
    );

    core.protocols
        .evaluate(protocol.id, a, &Verdict::Fit)
        .await
        .unwrap();
    core.protocols
        .evaluate(protocol.id, b, &Verdict::Fit)
        .await
        .unwrap();
    core.protocols
        .evaluate(
            protocol.id,
            c,
            &Verdict::Unfit {
                reason: Some(" small ovaries ".to_string()),
            },
        )
        .await
        .unwrap();

    let report = core
        .protocols
        .close_phase2(protocol.id, Some(date(2, 10)), Some("Dr. Lima"))
        .await
        .unwrap();
    assert_eq!(report.status, ProtocolStatus::Synchronized);
    assert_eq!(report.outcomes.len(), 3);
    assert!(report.outcomes.iter().all(|o| o.is_ok()));

    let statuses = core.status.resolve(&[a, b, c]).await.unwrap();
    assert_eq!(statuses[&a], ReproductiveStatus::Synchronized);
    assert_eq!(statuses[&b], ReproductiveStatus::Synchronized);
    assert_eq!(statuses[&c], ReproductiveStatus::Empty);

    // The denormalized history agrees with the derived status.
    let history = core.ledger().status_history(c).unwrap();
    assert_eq!(history[0].status, ReproductiveStatus::Empty);
    assert_eq!(history[0].recorded_on, date(2, 10));
}

#[tokio::test]
async fn a_recipient_holds_one_open_enrollment_at_a_time() {
    let core = core();
    let farm = farm(&core, "Santa Rita");
    let cow = cow(&core, farm, "101", None);

    let first = core.protocols.create(&header(farm, date(2, 1))).await.unwrap();
    let second = core.protocols.create(&header(farm, date(2, 2))).await.unwrap();
    core.protocols
        .enroll(first.id, cow, &EnrollmentDetails::default())
        .await
        .unwrap();

    let err = core
        .protocols
        .enroll(second.id, cow, &EnrollmentDetails::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(
        err,
        CoreError::RecipientAlreadyEnrolled { protocol, .. } if protocol == first.id
    ));

    let held = core.ledger().open_enrollments(&[cow]).unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].protocol_id, first.id);
}

#[tokio::test]
async fn unfit_recipients_can_start_over() {
    let core = core();
    let farm = farm(&core, "Santa Rita");
    let cow = cow(&core, farm, "101", None);

    run_protocol(&core, farm, &[(cow, Verdict::Unfit { reason: None })]).await;
    assert_eq!(
        core.status.resolve_one(cow).await.unwrap(),
        ReproductiveStatus::Empty
    );

    let again = core.protocols.create(&header(farm, date(3, 1))).await.unwrap();
    core.protocols
        .enroll(again.id, cow, &EnrollmentDetails::default())
        .await
        .unwrap();
    assert_eq!(
        core.status.resolve_one(cow).await.unwrap(),
        ReproductiveStatus::Synchronizing
    );
}

#[tokio::test]
async fn gates_reject_out_of_order_steps() {
    let core = core();
    let farm = farm(&core, "Santa Rita");
    let first = cow(&core, farm, "101", None);
    let protocol = core.protocols.create(&header(farm, date(2, 1))).await.unwrap();

    let err = core
        .protocols
        .close_phase2(protocol.id, Some(date(2, 10)), Some("Dr. Lima"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    core.protocols
        .enroll(protocol.id, first, &EnrollmentDetails::default())
        .await
        .unwrap();
    core.protocols.close_phase1(protocol.id).await.unwrap();

    let err = core.protocols.close_phase1(protocol.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Transition(_)));

    let late = cow(&core, farm, "900", None);
    let err = core
        .protocols
        .enroll(protocol.id, late, &EnrollmentDetails::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::WrongProtocolState { .. }));

    let rows = core.protocols.recipients(protocol.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sub_status, SubStatus::Started);
}

#[tokio::test]
async fn wizard_commit_enrolls_every_candidate_at_once() {
    let core = core();
    let farm = farm(&core, "Santa Rita");
    let elsewhere = crate::common::farm(&core, "Boa Vista");
    let a = cow(&core, farm, "101", None);
    let b = cow(&core, farm, "102", None);
    let stranger = cow(&core, elsewhere, "201", None);

    let mut draft = Phase1Draft::new(header(farm, date(2, 1)));
    draft.add(a, EnrollmentDetails::default()).unwrap();
    draft.add(stranger, EnrollmentDetails::default()).unwrap();
    let err = core.protocols.commit_phase1(&draft).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(core.ledger().open_enrollments(&[a]).unwrap().is_empty());

    draft.remove(stranger);
    draft.add(b, EnrollmentDetails::default()).unwrap();
    let protocol = core.protocols.commit_phase1(&draft).await.unwrap();
    assert_eq!(protocol.status, ProtocolStatus::Phase1Closed);
    assert_eq!(core.protocols.recipients(protocol.id).await.unwrap().len(), 2);

    let mut review = Phase2Review::new(protocol.id);
    review.set(a, Verdict::Fit);
    let err = core
        .protocols
        .submit_phase2(&review, Some(date(2, 10)), Some("Dr. Lima"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UnresolvedRecipients { count: 1, .. }));

    review.set(b, Verdict::Fit);
    let report = core
        .protocols
        .submit_phase2(&review, Some(date(2, 10)), Some("Dr. Lima"))
        .await
        .unwrap();
    assert_eq!(report.status, ProtocolStatus::Synchronized);
    assert_eq!(report.failures(), 0);
}
