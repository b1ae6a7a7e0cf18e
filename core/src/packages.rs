//! Embryo packages: stock embryos grouped by fertilization batch and
//! dispatch date.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use reprotrack_ledger::Ledger;
use reprotrack_types::{
    BatchId, DispositionCounts, Embryo, EmbryoPackage, FarmId, FertilizationBatch, GradeCounts,
    PackageKey,
};

use crate::errors::{CoreError, CoreResult};

/// Groups in-stock embryos into packages, newest dispatch first, then by
/// batch id. Embryos that are discarded or assigned to a client are skipped.
/// A batch missing from `batches` makes its packages ineligible.
pub fn aggregate(
    embryos: &[Embryo],
    batches: &[FertilizationBatch],
) -> CoreResult<Vec<EmbryoPackage>> {
    let batches: HashMap<BatchId, &FertilizationBatch> =
        batches.iter().map(|batch| (batch.id, batch)).collect();

    let mut grouped: BTreeMap<PackageKey, EmbryoPackage> = BTreeMap::new();
    for embryo in embryos.iter().filter(|embryo| embryo.in_stock()) {
        let key = PackageKey {
            batch_id: embryo.batch_id,
            dispatched_on: embryo.dispatched_on,
        };
        let package = grouped.entry(key).or_insert_with(|| {
            let batch = batches.get(&key.batch_id);
            EmbryoPackage {
                key,
                total: 0,
                dispositions: DispositionCounts::default(),
                unclassified: 0,
                grades: GradeCounts::default(),
                all_classified: false,
                eligible_for_transfer: batch.is_some_and(|b| b.eligible_for_transfer),
                destination_farm_ids: batch
                    .map(|b| b.destination_farm_ids.iter().copied().collect())
                    .unwrap_or_default(),
            }
        });

        package.total += 1;
        package.dispositions.record(embryo.disposition);
        match embryo.grade {
            Some(grade) => package.grades.record(grade),
            None => package.unclassified += 1,
        }
        if let Some(farm) = embryo.destination_farm_id {
            package.destination_farm_ids.insert(farm);
        }
    }

    let mut packages: Vec<EmbryoPackage> = grouped
        .into_values()
        .map(|mut package| {
            package.all_classified = package.total > 0 && package.unclassified == 0;
            package
        })
        .collect();
    packages.sort_by(|a, b| {
        b.key
            .dispatched_on
            .cmp(&a.key.dispatched_on)
            .then(a.key.batch_id.cmp(&b.key.batch_id))
    });

    verify(&packages)?;
    Ok(packages)
}

/// Checks package counts and key uniqueness. Violations are logged and
/// returned; counts are never adjusted to fit.
pub fn verify(packages: &[EmbryoPackage]) -> CoreResult<()> {
    let mut seen = BTreeSet::new();
    for package in packages {
        if !seen.insert(package.key) {
            tracing::error!(package = %package.key, "Duplicate package key");
            return Err(CoreError::DuplicatePackage(package.key));
        }
        let dispositions = package.dispositions.sum();
        if package.total != dispositions {
            tracing::error!(
                package = %package.key,
                total = package.total,
                dispositions,
                "Package total disagrees with disposition counts"
            );
            return Err(CoreError::Invariant(format!(
                "package {}: total {} but dispositions sum to {dispositions}",
                package.key, package.total
            )));
        }
        if package.unclassified > package.total
            || package.grades.sum() != package.classified()
        {
            tracing::error!(
                package = %package.key,
                total = package.total,
                unclassified = package.unclassified,
                graded = package.grades.sum(),
                "Package classification counts are inconsistent"
            );
            return Err(CoreError::Invariant(format!(
                "package {}: {} unclassified, {} graded, {} total",
                package.key,
                package.unclassified,
                package.grades.sum(),
                package.total
            )));
        }
    }
    Ok(())
}

pub struct EmbryoPackageAggregator<L> {
    ledger: Arc<L>,
}

impl<L: Ledger> EmbryoPackageAggregator<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    pub async fn packages(&self) -> CoreResult<Vec<EmbryoPackage>> {
        let embryos = self.ledger.stock_embryos().await?;
        let batch_ids: Vec<BatchId> = embryos
            .iter()
            .map(|embryo| embryo.batch_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let batches = self.ledger.batches(&batch_ids).await?;
        tracing::debug!(embryos = embryos.len(), batches = batches.len(), "Aggregating packages");
        aggregate(&embryos, &batches)
    }

    /// Packages that ship to `farm`.
    pub async fn packages_for_farm(&self, farm: FarmId) -> CoreResult<Vec<EmbryoPackage>> {
        let mut packages = self.packages().await?;
        packages.retain(|package| package.serves_farm(farm));
        Ok(packages)
    }

    /// Packages a transfer session may draw from: eligible and fully graded.
    pub async fn transferable(&self, farm: FarmId) -> CoreResult<Vec<EmbryoPackage>> {
        let mut packages = self.packages_for_farm(farm).await?;
        packages.retain(|package| package.eligible_for_transfer && package.all_classified);
        Ok(packages)
    }

    pub async fn package(&self, key: PackageKey) -> CoreResult<EmbryoPackage> {
        self.packages()
            .await?
            .into_iter()
            .find(|package| package.key == key)
            .ok_or_else(|| CoreError::not_found("package batch", key.batch_id.value()))
    }

    pub async fn set_eligibility(&self, batch: BatchId, eligible: bool) -> CoreResult<()> {
        self.ledger.set_batch_eligibility(batch, eligible).await?;
        tracing::info!(%batch, eligible, "Updated batch transfer eligibility");
        Ok(())
    }
}
