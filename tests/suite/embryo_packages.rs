//! Package aggregation over the embryo stock.

use reprotrack_core::{ErrorKind, StagedClassifications};
use reprotrack_types::{Disposition, Grade, PackageKey};

use crate::common::{batch, core, date, embryo, farm};

#[tokio::test]
async fn one_unclassified_embryo_keeps_the_package_open() {
    let core = core();
    let santa_rita = farm(&core, "Santa Rita");
    let lot = batch(&core, date(3, 1), true, &[santa_rita]);
    for grade in [Some(Grade::BE), Some(Grade::BE), Some(Grade::BN), None] {
        embryo(&core, lot, date(3, 8), grade);
    }

    let packages = core.packages.packages().await.unwrap();
    assert_eq!(packages.len(), 1);
    let package = &packages[0];
    assert_eq!(package.total, 4);
    assert_eq!(package.dispositions.fresh, 4);
    assert_eq!(package.grades.be, 2);
    assert_eq!(package.grades.bn, 1);
    assert_eq!(package.unclassified, 1);
    assert!(!package.all_classified);

    // Sessions only draw from fully graded packages.
    assert!(core.packages.transferable(santa_rita).await.unwrap().is_empty());
}

#[tokio::test]
async fn grading_the_last_embryo_makes_the_package_transferable() {
    let core = core();
    let santa_rita = farm(&core, "Santa Rita");
    let boa_vista = farm(&core, "Boa Vista");
    let lot = batch(&core, date(3, 1), true, &[santa_rita]);
    embryo(&core, lot, date(3, 8), Some(Grade::BE));
    let pending = embryo(&core, lot, date(3, 8), None);

    let mut staged = StagedClassifications::new();
    staged.stage(pending, Some(Grade::BX));
    let outcomes = core.embryos.commit(&mut staged, date(3, 9)).await.unwrap();
    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert!(staged.is_empty());

    let key = PackageKey {
        batch_id: lot,
        dispatched_on: date(3, 8),
    };
    let package = core.packages.package(key).await.unwrap();
    assert!(package.all_classified);
    assert_eq!(package.grades.bx, 1);

    assert_eq!(core.packages.transferable(santa_rita).await.unwrap().len(), 1);
    assert!(core.packages.transferable(boa_vista).await.unwrap().is_empty());

    core.packages.set_eligibility(lot, false).await.unwrap();
    assert!(core.packages.transferable(santa_rita).await.unwrap().is_empty());
    assert_eq!(
        core.packages.packages_for_farm(santa_rita).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn packages_are_ordered_newest_dispatch_first() {
    let core = core();
    let first = batch(&core, date(3, 1), true, &[]);
    let second = batch(&core, date(3, 2), true, &[]);
    embryo(&core, second, date(3, 8), None);
    embryo(&core, first, date(3, 9), None);
    embryo(&core, first, date(3, 8), None);

    let keys: Vec<_> = core
        .packages
        .packages()
        .await
        .unwrap()
        .into_iter()
        .map(|package| (package.key.batch_id, package.key.dispatched_on))
        .collect();
    assert_eq!(
        keys,
        vec![
            (first, date(3, 9)),
            (first, date(3, 8)),
            (second, date(3, 8)),
        ]
    );

    // Same stock, same answer.
    let again = core.packages.packages().await.unwrap();
    assert_eq!(again.len(), 3);
    assert_eq!(again[0].key.dispatched_on, date(3, 9));
}

#[tokio::test]
async fn discarded_embryos_leave_the_package() {
    let core = core();
    let lot = batch(&core, date(3, 1), true, &[]);
    let kept = embryo(&core, lot, date(3, 8), Some(Grade::BE));
    let dropped = embryo(&core, lot, date(3, 8), Some(Grade::BL));

    core.embryos
        .discard(dropped, date(3, 9), Some("cracked zona"))
        .await
        .unwrap();
    let err = core
        .embryos
        .discard(dropped, date(3, 9), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let packages = core.packages.packages().await.unwrap();
    assert_eq!(packages[0].total, 1);
    assert_eq!(packages[0].grades.bl, 0);
    assert_eq!(
        core.embryos.embryo(kept).await.unwrap().disposition,
        Disposition::Fresh
    );
}

#[tokio::test]
async fn daily_expiry_discards_overdue_fresh_embryos() {
    let core = core();
    let lot = batch(&core, date(8, 1), true, &[]);
    let fresh = embryo(&core, lot, date(8, 8), None);

    assert_eq!(
        core.maintenance.run_if_due(date(8, 9)).await.unwrap(),
        Some(Vec::new())
    );
    assert_eq!(
        core.maintenance.run_if_due(date(8, 10)).await.unwrap(),
        Some(vec![fresh])
    );
    assert_eq!(core.maintenance.run_if_due(date(8, 10)).await.unwrap(), None);

    assert!(core.packages.packages().await.unwrap().is_empty());
    let history = core.embryos.history(fresh).await.unwrap();
    assert_eq!(history.len(), 1);
}
