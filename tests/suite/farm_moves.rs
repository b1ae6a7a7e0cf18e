//! Moving recipients between farms.

use reprotrack_core::{CoreError, ErrorKind};
use reprotrack_types::RenameReason;

use crate::common::{core, cow, date, farm};

#[tokio::test]
async fn round_trip_without_collisions_keeps_the_tag() {
    let core = core();
    let a = farm(&core, "Santa Rita");
    let b = farm(&core, "Boa Vista");
    let mimosa = cow(&core, a, "101", Some("Mimosa"));

    let out = core
        .farms
        .move_recipient(mimosa, b, date(4, 1), Some("  sold pasture "))
        .await
        .unwrap();
    assert_eq!(out.from_farm, a);
    assert_eq!(out.target_farm, b);
    assert!(out.rename.is_none());

    core.farms
        .move_recipient(mimosa, a, date(5, 1), None)
        .await
        .unwrap();

    let history = core.ledger().farm_history(mimosa).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].ended_on, Some(date(4, 1)));
    assert_eq!(history[1].farm_id, b);
    assert_eq!(history[1].notes.as_deref(), Some("sold pasture"));
    assert_eq!(history[1].ended_on, Some(date(5, 1)));
    assert_eq!(history[2].farm_id, a);
    assert_eq!(history[2].ended_on, None);
    assert_eq!(history.iter().filter(|h| h.ended_on.is_none()).count(), 1);

    assert!(core.ledger().rename_history(mimosa).unwrap().is_empty());
    assert_eq!(core.ledger().active_farm(mimosa).unwrap(), Some(a));
}

#[tokio::test]
async fn tag_collision_renames_before_moving() {
    let core = core();
    let a = farm(&core, "Santa Rita");
    let b = farm(&core, "Boa Vista");
    let moving = cow(&core, a, "123", None);
    let resident = cow(&core, b, "123", None);

    let plan = core.farms.plan_move(moving, b, date(4, 7)).await.unwrap();
    assert_eq!(plan.tag_conflict, Some(resident));
    assert_eq!(plan.new_tag.as_deref(), Some("123-MOV0704"));
    assert!(!plan.is_blocked());

    let out = core
        .farms
        .move_recipient(moving, b, date(4, 7), None)
        .await
        .unwrap();
    let rename = out.rename.expect("tag was changed");
    assert_eq!(rename.old_tag, "123");
    assert_eq!(rename.new_tag, "123-MOV0704");
    assert_eq!(rename.reason, RenameReason::FarmChange);
    assert_eq!(
        rename.notes.as_deref(),
        Some("Moved from Santa Rita to Boa Vista")
    );

    // Same identity, new tag, one rename record.
    let recipient = core.ledger().recipient(moving).unwrap().unwrap();
    assert_eq!(recipient.id, moving);
    assert_eq!(recipient.ear_tag, "123-MOV0704");
    assert_eq!(core.ledger().rename_history(moving).unwrap().len(), 1);
    assert_eq!(core.ledger().active_farm(moving).unwrap(), Some(b));
}

#[tokio::test]
async fn suffixes_skip_taken_tags_case_insensitively() {
    let core = core();
    let a = farm(&core, "Santa Rita");
    let b = farm(&core, "Boa Vista");
    let moving = cow(&core, a, "123", None);
    cow(&core, b, "123", None);
    cow(&core, b, "123-mov0704", None);
    cow(&core, b, "123-MOV0704-1", None);

    let out = core
        .farms
        .move_recipient(moving, b, date(4, 7), None)
        .await
        .unwrap();
    assert_eq!(out.rename.unwrap().new_tag, "123-MOV0704-2");
}

#[tokio::test]
async fn name_conflict_blocks_the_move() {
    let core = core();
    let a = farm(&core, "Santa Rita");
    let b = farm(&core, "Boa Vista");
    let moving = cow(&core, a, "101", Some("Estrela"));
    let resident = cow(&core, b, "555", Some(" estrela "));

    let err = core
        .farms
        .move_recipient(moving, b, date(4, 1), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(
        err,
        CoreError::NameConflict { existing, .. } if existing == resident
    ));
    assert_eq!(core.ledger().active_farm(moving).unwrap(), Some(a));
    assert_eq!(core.ledger().farm_history(moving).unwrap().len(), 1);
}

#[tokio::test]
async fn moving_to_the_current_farm_is_rejected() {
    let core = core();
    let a = farm(&core, "Santa Rita");
    let moving = cow(&core, a, "101", None);

    let err = core
        .farms
        .move_recipient(moving, a, date(4, 1), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
