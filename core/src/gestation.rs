//! Pregnancy checks, fetal sexing and calving.

use std::sync::Arc;

use chrono::{Days, NaiveDate};

use reprotrack_ledger::{Ledger, NewDiagnosis};
use reprotrack_types::{
    CalvingEvent, DiagnosisId, DiagnosisResult, FetalSex, PregnancyResult, RecipientId,
    SexingResult, StageAction, TransferOutcome,
};

use crate::errors::{CoreError, CoreResult};
use crate::guard::{OperationGuards, OperationKind};
use crate::status::StatusResolver;

/// Days from fertilization (D0) to the expected calving.
pub const GESTATION_DAYS: u64 = 275;

#[must_use]
pub fn expected_calving(fertilized_on: NaiveDate) -> Option<NaiveDate> {
    fertilized_on.checked_add_days(Days::new(GESTATION_DAYS))
}

pub struct GestationService<L> {
    ledger: Arc<L>,
    guards: OperationGuards,
    status: StatusResolver<L>,
}

impl<L: Ledger> GestationService<L> {
    pub fn new(ledger: Arc<L>, guards: OperationGuards) -> Self {
        let status = StatusResolver::new(Arc::clone(&ledger));
        Self {
            ledger,
            guards,
            status,
        }
    }

    pub async fn check_pregnancy(
        &self,
        recipient: RecipientId,
        diagnosed_on: NaiveDate,
        result: PregnancyResult,
    ) -> CoreResult<DiagnosisId> {
        let _token = self
            .guards
            .acquire(OperationKind::RecordDiagnosis, recipient.value())?;
        self.status
            .ensure_allows(recipient, StageAction::PregnancyCheck)
            .await?;

        let fetus_count = u32::from(result != PregnancyResult::Empty);
        let id = self
            .ledger
            .record_diagnosis(&NewDiagnosis {
                recipient_id: recipient,
                diagnosed_on,
                result: DiagnosisResult::Pregnancy(result),
                fetus_count,
            })
            .await?;
        tracing::info!(
            %recipient,
            diagnosis = %id,
            result = result.as_str(),
            "Recorded pregnancy check"
        );
        Ok(id)
    }

    /// Records sexing from the fetuses seen. No fetuses means the recipient
    /// lost the pregnancy.
    pub async fn record_sexing(
        &self,
        recipient: RecipientId,
        diagnosed_on: NaiveDate,
        fetuses: &[FetalSex],
    ) -> CoreResult<(DiagnosisId, SexingResult)> {
        let _token = self
            .guards
            .acquire(OperationKind::RecordDiagnosis, recipient.value())?;
        self.status
            .ensure_allows(recipient, StageAction::Sexing)
            .await?;

        let result = SexingResult::from_fetuses(fetuses);
        let id = self
            .ledger
            .record_diagnosis(&NewDiagnosis {
                recipient_id: recipient,
                diagnosed_on,
                result: DiagnosisResult::Sexing(result),
                fetus_count: fetuses.len() as u32,
            })
            .await?;
        tracing::info!(%recipient, diagnosis = %id, result = result.as_str(), "Recorded sexing");
        Ok((id, result))
    }

    pub async fn record_calving(
        &self,
        recipient: RecipientId,
        calved_on: NaiveDate,
        notes: Option<&str>,
    ) -> CoreResult<()> {
        let _token = self
            .guards
            .acquire(OperationKind::RecordDiagnosis, recipient.value())?;
        self.status
            .ensure_allows(recipient, StageAction::Calving)
            .await?;

        self.ledger
            .record_calving(&CalvingEvent {
                recipient_id: recipient,
                calved_on,
                notes: notes
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(ToString::to_string),
            })
            .await?;
        tracing::info!(%recipient, %calved_on, "Recorded calving");
        Ok(())
    }

    /// Expected calving date from the embryo of the latest performed
    /// transfer, if the recipient has one.
    pub async fn expected_calving_date(
        &self,
        recipient: RecipientId,
    ) -> CoreResult<Option<NaiveDate>> {
        let transfers = self.ledger.transfers(recipient).await?;
        let Some(latest) = transfers
            .iter()
            .filter(|t| t.outcome == TransferOutcome::Performed)
            .max_by_key(|t| (t.performed_on, t.id))
        else {
            return Ok(None);
        };

        let embryo = self
            .ledger
            .embryo(latest.embryo_id)
            .await?
            .ok_or_else(|| CoreError::not_found("embryo", latest.embryo_id.value()))?;
        let batch = self
            .ledger
            .batches(&[embryo.batch_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found("batch", embryo.batch_id.value()))?;
        Ok(expected_calving(batch.fertilized_on))
    }
}
