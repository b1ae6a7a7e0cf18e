//! Derived status across a herd at every stage.

use reprotrack_core::{CoreError, TransferRequest, expected_calving};
use reprotrack_types::{
    EnrollmentDetails, FetalSex, Grade, PregnancyResult, RecipientId, ReproductiveStatus,
    SessionDraft, StageAction, Verdict,
};

use crate::common::{Core, batch, core, cow, date, embryo, farm, header, run_protocol};

async fn serve(core: &Core, farm: reprotrack_types::FarmId, cows: &[RecipientId]) {
    let lot = batch(core, date(2, 13), true, &[farm]);
    let mut draft = SessionDraft::new(farm);
    draft.params.transfer_date = Some(date(2, 20));
    let mut session = core.sessions.persist(&draft).await.unwrap();
    for recipient in cows {
        let embryo = embryo(core, lot, date(2, 20), Some(Grade::BE));
        core.sessions
            .record_transfer(
                &mut session,
                TransferRequest {
                    recipient: *recipient,
                    embryo,
                    protocol_recipient: None,
                },
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn batch_and_single_resolution_agree_across_the_herd() {
    let core = core();
    let farm = farm(&core, "Santa Rita");
    let open = cow(&core, farm, "100", None);
    let waiting = cow(&core, farm, "101", None);
    let synced = cow(&core, farm, "102", None);
    let served = cow(&core, farm, "103", None);
    let pregnant = cow(&core, farm, "104", None);
    let female = cow(&core, farm, "105", None);
    let calved = cow(&core, farm, "106", None);

    let later = core.protocols.create(&header(farm, date(3, 1))).await.unwrap();
    core.protocols
        .enroll(later.id, waiting, &EnrollmentDetails::default())
        .await
        .unwrap();

    run_protocol(
        &core,
        farm,
        &[
            (synced, Verdict::Fit),
            (served, Verdict::Fit),
            (pregnant, Verdict::Fit),
            (female, Verdict::Fit),
            (calved, Verdict::Fit),
        ],
    )
    .await;
    serve(&core, farm, &[served, pregnant, female, calved]).await;

    for recipient in [pregnant, female, calved] {
        core.gestation
            .check_pregnancy(recipient, date(3, 20), PregnancyResult::Pregnant)
            .await
            .unwrap();
    }
    for recipient in [female, calved] {
        core.gestation
            .record_sexing(recipient, date(4, 20), &[FetalSex::Female])
            .await
            .unwrap();
    }
    core.gestation
        .record_calving(calved, date(11, 22), None)
        .await
        .unwrap();

    let herd = [open, waiting, synced, served, pregnant, female, calved];
    let batch = core.status.resolve(&herd).await.unwrap();
    let expected = [
        ReproductiveStatus::Empty,
        ReproductiveStatus::Synchronizing,
        ReproductiveStatus::Synchronized,
        ReproductiveStatus::Served,
        ReproductiveStatus::Pregnant,
        ReproductiveStatus::PregnantFemale,
        ReproductiveStatus::Empty,
    ];
    for (recipient, status) in herd.iter().zip(expected) {
        assert_eq!(batch[recipient], status, "recipient {recipient}");
        assert_eq!(core.status.resolve_one(*recipient).await.unwrap(), status);
    }

    assert_eq!(
        core.gestation.expected_calving_date(female).await.unwrap(),
        expected_calving(date(2, 13))
    );
}

#[tokio::test]
async fn unknown_recipients_resolve_to_empty() {
    let core = core();
    let ghost = RecipientId::new(404);
    let statuses = core.status.resolve(&[ghost]).await.unwrap();
    assert_eq!(statuses[&ghost], ReproductiveStatus::Empty);
    assert!(core.status.resolve(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn stage_actions_follow_the_status() {
    let core = core();
    let farm = farm(&core, "Santa Rita");
    let cow = cow(&core, farm, "101", None);
    run_protocol(&core, farm, &[(cow, Verdict::Fit)]).await;

    core.status
        .ensure_allows(cow, StageAction::Transfer)
        .await
        .unwrap();
    let err = core
        .status
        .ensure_allows(cow, StageAction::PregnancyCheck)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::StageNotAllowed {
            status: ReproductiveStatus::Synchronized,
            action: StageAction::PregnancyCheck,
            ..
        }
    ));

    serve(&core, farm, &[cow]).await;
    core.gestation
        .check_pregnancy(cow, date(3, 20), PregnancyResult::Empty)
        .await
        .unwrap();
    assert_eq!(
        core.status.resolve_one(cow).await.unwrap(),
        ReproductiveStatus::Empty
    );
    core.status
        .ensure_allows(cow, StageAction::EnterProtocol)
        .await
        .unwrap();
}
