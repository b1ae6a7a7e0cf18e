//! Transfer sessions from the protocol to the restore on reload.

use reprotrack_core::{CoreError, ErrorKind, TransferRequest};
use reprotrack_types::{
    Disposition, EmbryoId, FarmId, Grade, PackageKey, ProtocolId, RecipientId,
    ReproductiveStatus, SessionDraft, SubStatus, Verdict,
};

use crate::common::{Core, batch, core, cow, date, embryo, farm, run_protocol};

struct Herd {
    farm: FarmId,
    protocol: ProtocolId,
    mimosa: RecipientId,
    estrela: RecipientId,
    package: PackageKey,
    embryos: Vec<EmbryoId>,
}

async fn synchronized_herd(core: &Core) -> Herd {
    let farm = farm(core, "Santa Rita");
    let mimosa = cow(core, farm, "101", Some("Mimosa"));
    let estrela = cow(core, farm, "102", Some("Estrela"));
    let protocol = run_protocol(
        core,
        farm,
        &[(mimosa, Verdict::Fit), (estrela, Verdict::Fit)],
    )
    .await;

    let lot = batch(core, date(2, 13), true, &[farm]);
    let embryos = (0..3)
        .map(|_| embryo(core, lot, date(2, 20), Some(Grade::BE)))
        .collect();
    Herd {
        farm,
        protocol,
        mimosa,
        estrela,
        package: PackageKey {
            batch_id: lot,
            dispatched_on: date(2, 20),
        },
        embryos,
    }
}

fn draft(herd: &Herd) -> SessionDraft {
    let mut draft = SessionDraft::new(herd.farm);
    draft.package = Some(herd.package);
    draft.protocol_id = Some(herd.protocol);
    draft.params.transfer_date = Some(date(2, 20));
    draft.params.veterinarian = Some("Dr. Lima".to_string());
    draft
}

fn request(recipient: RecipientId, embryo: EmbryoId) -> TransferRequest {
    TransferRequest {
        recipient,
        embryo,
        protocol_recipient: None,
    }
}

#[tokio::test]
async fn saving_twice_keeps_one_open_session_per_farm() {
    let core = core();
    let herd = synchronized_herd(&core).await;

    let first = core.sessions.persist(&draft(&herd)).await.unwrap();
    let mut changed = draft(&herd);
    changed.params.technician = Some("Ana".to_string());
    let second = core.sessions.persist(&changed).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.draft.params.technician.as_deref(), Some("Ana"));
    let sessions = core.ledger().farm_sessions(herd.farm).unwrap();
    assert_eq!(sessions.iter().filter(|s| s.is_open()).count(), 1);

    core.sessions.complete(second.id).await.unwrap();
    assert!(core.sessions.open_for_farm(herd.farm).await.unwrap().is_none());

    let third = core.sessions.persist(&draft(&herd)).await.unwrap();
    assert_ne!(third.id, first.id);
}

#[tokio::test]
async fn transfers_consume_the_fit_row_and_the_embryo() {
    let core = core();
    let herd = synchronized_herd(&core).await;
    let mut session = core.sessions.persist(&draft(&herd)).await.unwrap();

    let transfer = core
        .sessions
        .record_transfer(&mut session, request(herd.mimosa, herd.embryos[0]))
        .await
        .unwrap();

    assert_eq!(session.draft.transfer_ids, vec![transfer]);
    assert_eq!(session.draft.protocol_recipient_ids.len(), 1);
    let saved = core.sessions.open_for_farm(herd.farm).await.unwrap().unwrap();
    assert_eq!(saved.draft.transfer_ids, vec![transfer]);

    assert_eq!(
        core.status.resolve_one(herd.mimosa).await.unwrap(),
        ReproductiveStatus::Served
    );
    assert_eq!(
        core.embryos.embryo(herd.embryos[0]).await.unwrap().disposition,
        Disposition::Transferred
    );
    let rows = core.protocols.recipients(herd.protocol).await.unwrap();
    let row = rows.iter().find(|r| r.recipient_id == herd.mimosa).unwrap();
    assert_eq!(row.sub_status, SubStatus::Used);

    let err = core
        .sessions
        .record_transfer(&mut session, request(herd.mimosa, herd.embryos[1]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyServed { recipient } if recipient == herd.mimosa));
    assert_eq!(session.draft.transfer_ids.len(), 1);
}

#[tokio::test]
async fn pairs_put_a_second_embryo_into_the_same_recipient() {
    let core = core();
    let herd = synchronized_herd(&core).await;
    let mut pairs = draft(&herd);
    pairs.params.allow_pairs = true;
    let mut session = core.sessions.persist(&pairs).await.unwrap();

    for embryo in &herd.embryos[..2] {
        core.sessions
            .record_transfer(&mut session, request(herd.mimosa, *embryo))
            .await
            .unwrap();
    }
    assert_eq!(session.draft.transfer_ids.len(), 2);
    assert_eq!(core.ledger().transfers(herd.mimosa).unwrap().len(), 2);
}

#[tokio::test]
async fn embryos_must_match_the_session() {
    let core = core();
    let herd = synchronized_herd(&core).await;
    let mut session = core.sessions.persist(&draft(&herd)).await.unwrap();

    let other_lot = batch(&core, date(2, 14), true, &[herd.farm]);
    let stray = embryo(&core, other_lot, date(2, 20), Some(Grade::BN));
    let err = core
        .sessions
        .record_transfer(&mut session, request(herd.mimosa, stray))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    core.embryos
        .freeze(herd.embryos[2], Some("tank 2, rack B"), date(2, 20))
        .await
        .unwrap();
    let err = core
        .sessions
        .record_transfer(&mut session, request(herd.mimosa, herd.embryos[2]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    assert!(session.draft.transfer_ids.is_empty());
    assert!(core.ledger().transfers(herd.mimosa).unwrap().is_empty());
}

#[tokio::test]
async fn unsynchronized_recipients_need_free_heat() {
    let core = core();
    let herd = synchronized_herd(&core).await;
    let open_cow = cow(&core, herd.farm, "103", None);
    let mut session = core.sessions.persist(&draft(&herd)).await.unwrap();

    let err = core
        .sessions
        .record_transfer(&mut session, request(open_cow, herd.embryos[0]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::StageNotAllowed {
            status: ReproductiveStatus::Empty,
            ..
        }
    ));

    let mut free_heat = draft(&herd);
    free_heat.params.include_free_heat = true;
    let mut session = core.sessions.persist(&free_heat).await.unwrap();
    core.sessions
        .record_transfer(&mut session, request(open_cow, herd.embryos[0]))
        .await
        .unwrap();
    assert!(session.draft.protocol_recipient_ids.is_empty());
}

#[tokio::test]
async fn restore_offers_sessions_with_open_rows_only() {
    let core = core();
    let herd = synchronized_herd(&core).await;
    let rows = core.protocols.recipients(herd.protocol).await.unwrap();
    let estrela_row = rows
        .iter()
        .find(|r| r.recipient_id == herd.estrela)
        .unwrap()
        .id;

    let mut pending = draft(&herd);
    pending.protocol_recipient_ids.push(estrela_row);
    let saved = core.sessions.persist(&pending).await.unwrap();
    let restored = core.sessions.restore().await.unwrap().unwrap();
    assert_eq!(restored.id, saved.id);

    let mut session = restored;
    let served = [
        (herd.estrela, herd.embryos[0]),
        (herd.mimosa, herd.embryos[1]),
    ];
    for (recipient, embryo) in served {
        core.sessions
            .record_transfer(&mut session, request(recipient, embryo))
            .await
            .unwrap();
    }

    // Both rows of the protocol are USED now, so the session is closed on reload.
    assert!(core.sessions.restore().await.unwrap().is_none());
    assert!(core.sessions.open_for_farm(herd.farm).await.unwrap().is_none());
    let sessions = core.ledger().farm_sessions(herd.farm).unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(!sessions[0].is_open());
}

#[tokio::test]
async fn restore_keeps_sessions_with_recipients_still_waiting() {
    let core = core();
    let herd = synchronized_herd(&core).await;
    let mut session = core.sessions.persist(&draft(&herd)).await.unwrap();
    let transfer = core
        .sessions
        .record_transfer(&mut session, request(herd.mimosa, herd.embryos[0]))
        .await
        .unwrap();

    // Mimosa's row is USED, Estrela's is still FIT in the session's protocol.
    let restored = core.sessions.restore().await.unwrap().unwrap();
    assert_eq!(restored.id, session.id);
    assert_eq!(restored.draft.transfer_ids, vec![transfer]);
    assert!(restored.is_open());

    let rows = core.protocols.recipients(herd.protocol).await.unwrap();
    let estrela = rows.iter().find(|r| r.recipient_id == herd.estrela).unwrap();
    assert_eq!(estrela.sub_status, SubStatus::Fit);

    let mut session = restored;
    core.sessions
        .record_transfer(&mut session, request(herd.estrela, herd.embryos[1]))
        .await
        .unwrap();
    assert_eq!(session.draft.transfer_ids.len(), 2);
    assert!(core.sessions.restore().await.unwrap().is_none());
}
