//! Embryo grading and stock actions.
//!
//! Grades are staged in memory while an operator works through a package and
//! written in one pass on commit. Entries that fail stay staged so the commit
//! can be retried; entries that succeed are cleared.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;

use reprotrack_ledger::{EmbryoAssignment, Ledger};
use reprotrack_types::{Disposition, Embryo, EmbryoHistoryEntry, EmbryoId, Grade, NonEmptyString};

use crate::errors::{CoreError, CoreResult, ItemOutcome};
use crate::guard::{OperationGuards, OperationKind};

/// Guard entity for commits, which may span every package in stock.
const STOCK_ENTITY: i64 = 0;

/// Pending grade changes. `None` clears a grade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedClassifications {
    pending: BTreeMap<EmbryoId, Option<Grade>>,
}

impl StagedClassifications {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `grade`, replacing anything staged earlier for `embryo`.
    pub fn stage(&mut self, embryo: EmbryoId, grade: Option<Grade>) {
        self.pending.insert(embryo, grade);
    }

    pub fn unstage(&mut self, embryo: EmbryoId) -> bool {
        self.pending.remove(&embryo).is_some()
    }

    pub fn rollback(&mut self) {
        self.pending.clear();
    }

    #[must_use]
    pub fn staged(&self, embryo: EmbryoId) -> Option<Option<Grade>> {
        self.pending.get(&embryo).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmbryoId, Option<Grade>)> + '_ {
        self.pending.iter().map(|(id, grade)| (*id, *grade))
    }
}

pub struct EmbryoService<L> {
    ledger: Arc<L>,
    guards: OperationGuards,
}

impl<L: Ledger> EmbryoService<L> {
    pub fn new(ledger: Arc<L>, guards: OperationGuards) -> Self {
        Self { ledger, guards }
    }

    pub async fn embryo(&self, id: EmbryoId) -> CoreResult<Embryo> {
        self.ledger
            .embryo(id)
            .await?
            .ok_or_else(|| CoreError::not_found("embryo", id.value()))
    }

    pub async fn history(&self, id: EmbryoId) -> CoreResult<Vec<EmbryoHistoryEntry>> {
        Ok(self.ledger.embryo_history(id).await?)
    }

    /// Writes every staged grade. An embryo whose grade already matches is
    /// cleared without a write, so history only records real changes.
    pub async fn commit(
        &self,
        staged: &mut StagedClassifications,
        on: NaiveDate,
    ) -> CoreResult<Vec<ItemOutcome<EmbryoId>>> {
        let _token = self
            .guards
            .acquire(OperationKind::SaveClassifications, STOCK_ENTITY)?;

        let entries: Vec<(EmbryoId, Option<Grade>)> = staged.iter().collect();
        let mut outcomes = Vec::with_capacity(entries.len());
        for (id, grade) in entries {
            match self.classify_one(id, grade, on).await {
                Ok(()) => {
                    staged.unstage(id);
                    outcomes.push(ItemOutcome::ok(id));
                }
                Err(err) => {
                    tracing::warn!(embryo = %id, "Classification not saved: {err}");
                    outcomes.push(ItemOutcome::failed(id, err));
                }
            }
        }

        let saved = outcomes.iter().filter(|o| o.is_ok()).count();
        tracing::info!(saved, failed = outcomes.len() - saved, "Committed classifications");
        Ok(outcomes)
    }

    async fn classify_one(
        &self,
        id: EmbryoId,
        grade: Option<Grade>,
        on: NaiveDate,
    ) -> CoreResult<()> {
        let embryo = self.embryo(id).await?;
        if embryo.disposition.is_terminal() {
            return Err(CoreError::Precondition(format!(
                "embryo {id} is {} and can no longer be graded",
                embryo.disposition
            )));
        }
        if embryo.grade == grade {
            return Ok(());
        }
        self.ledger.classify_embryo(id, grade, on).await?;
        Ok(())
    }

    pub async fn freeze(
        &self,
        id: EmbryoId,
        location: Option<&str>,
        on: NaiveDate,
    ) -> CoreResult<()> {
        let location = NonEmptyString::from_optional(location)
            .map_err(|_| CoreError::MissingField { field: "location" })?;
        let _token = self.guards.acquire(OperationKind::EmbryoAction, id.value())?;

        let embryo = self.embryo(id).await?;
        if embryo.disposition != Disposition::Fresh {
            return Err(CoreError::Precondition(format!(
                "embryo {id} is {} and cannot be frozen",
                embryo.disposition
            )));
        }
        self.ledger.freeze_embryo(id, location.as_str(), on).await?;
        tracing::info!(embryo = %id, location = %location, "Froze embryo");
        Ok(())
    }

    pub async fn discard(
        &self,
        id: EmbryoId,
        on: NaiveDate,
        notes: Option<&str>,
    ) -> CoreResult<()> {
        let _token = self.guards.acquire(OperationKind::EmbryoAction, id.value())?;

        let embryo = self.embryo(id).await?;
        if embryo.disposition.is_terminal() {
            return Err(CoreError::Precondition(format!(
                "embryo {id} is already {}",
                embryo.disposition
            )));
        }
        self.ledger.discard_embryo(id, on, notes).await?;
        tracing::info!(embryo = %id, "Discarded embryo");
        Ok(())
    }

    pub async fn assign(
        &self,
        id: EmbryoId,
        assignment: EmbryoAssignment,
        on: NaiveDate,
    ) -> CoreResult<()> {
        let _token = self.guards.acquire(OperationKind::EmbryoAction, id.value())?;

        let embryo = self.embryo(id).await?;
        if embryo.disposition.is_terminal() {
            return Err(CoreError::Precondition(format!(
                "embryo {id} is {} and cannot be reassigned",
                embryo.disposition
            )));
        }
        self.ledger.assign_embryo(id, assignment, on).await?;
        tracing::info!(
            embryo = %id,
            client = ?assignment.client_id,
            farm = ?assignment.farm_id,
            "Assigned embryo destination"
        );
        Ok(())
    }
}
