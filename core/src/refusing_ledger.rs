//! A ledger that refuses status-history writes for chosen recipients.

use anyhow::{Result, bail};
use chrono::NaiveDate;

use reprotrack_ledger::{
    EmbryoAssignment, FarmMove, Ledger, NewBatch, NewDiagnosis, NewEmbryo, NewProtocol,
    NewRecipient, NewTransfer, SqliteLedger,
};
use reprotrack_types::{
    BatchId, CalvingEvent, Diagnosis, DiagnosisId, Embryo, EmbryoHistoryEntry, EmbryoId,
    EnrollmentDetails, Farm, FarmHistoryEntry, FarmId, FertilizationBatch, Grade, Protocol,
    ProtocolId, ProtocolRecipient, ProtocolRecipientId, ProtocolStatus, Recipient,
    RecipientEvent, RecipientId, RenameRecord, SessionDraft, SessionId, StatusHistoryEntry,
    SubStatus, TransferEvent, TransferId, TransferSession,
};

pub(crate) struct RefusingHistoryLedger {
    pub inner: SqliteLedger,
    pub refuse_history_for: Vec<RecipientId>,
}

impl RefusingHistoryLedger {
    pub fn open_in_memory() -> Self {
        Self {
            inner: SqliteLedger::open_in_memory().expect("open ledger"),
            refuse_history_for: Vec::new(),
        }
    }
}

impl Ledger for RefusingHistoryLedger {
    async fn insert_farm(&self, name: &str) -> Result<FarmId> {
        self.inner.insert_farm(name)
    }

    async fn farm(&self, id: FarmId) -> Result<Option<Farm>> {
        self.inner.farm(id)
    }

    async fn insert_recipient(&self, recipient: &NewRecipient) -> Result<RecipientId> {
        self.inner.insert_recipient(recipient)
    }

    async fn recipient(&self, id: RecipientId) -> Result<Option<Recipient>> {
        self.inner.recipient(id)
    }

    async fn active_farm(&self, id: RecipientId) -> Result<Option<FarmId>> {
        self.inner.active_farm(id)
    }

    async fn active_residents(&self, farm: FarmId) -> Result<Vec<Recipient>> {
        self.inner.active_residents(farm)
    }

    async fn farm_history(&self, id: RecipientId) -> Result<Vec<FarmHistoryEntry>> {
        self.inner.farm_history(id)
    }

    async fn rename_recipient(&self, rename: &RenameRecord) -> Result<()> {
        self.inner.rename_recipient(rename)
    }

    async fn rename_history(&self, id: RecipientId) -> Result<Vec<RenameRecord>> {
        self.inner.rename_history(id)
    }

    async fn move_recipient(&self, request: &FarmMove) -> Result<()> {
        self.inner.move_recipient(request)
    }

    async fn insert_protocol(&self, protocol: &NewProtocol) -> Result<ProtocolId> {
        self.inner.insert_protocol(protocol)
    }

    async fn create_protocol_atomic(
        &self,
        protocol: &NewProtocol,
        enrollments: &[(RecipientId, EnrollmentDetails)],
    ) -> Result<ProtocolId> {
        self.inner.create_protocol_atomic(protocol, enrollments)
    }

    async fn protocol(&self, id: ProtocolId) -> Result<Option<Protocol>> {
        self.inner.protocol(id)
    }

    async fn enroll(
        &self,
        protocol: ProtocolId,
        recipient: RecipientId,
        details: &EnrollmentDetails,
    ) -> Result<ProtocolRecipientId> {
        self.inner.enroll(protocol, recipient, details)
    }

    async fn protocol_recipients(&self, protocol: ProtocolId) -> Result<Vec<ProtocolRecipient>> {
        self.inner.protocol_recipients(protocol)
    }

    async fn protocol_recipient_rows(
        &self,
        ids: &[ProtocolRecipientId],
    ) -> Result<Vec<ProtocolRecipient>> {
        self.inner.protocol_recipient_rows(ids)
    }

    async fn open_enrollments(&self, recipients: &[RecipientId]) -> Result<Vec<ProtocolRecipient>> {
        self.inner.open_enrollments(recipients)
    }

    async fn set_protocol_status(&self, id: ProtocolId, status: ProtocolStatus) -> Result<()> {
        self.inner.set_protocol_status(id, status)
    }

    async fn record_phase2_close(
        &self,
        id: ProtocolId,
        status: ProtocolStatus,
        closed_on: NaiveDate,
        closed_by: &str,
    ) -> Result<()> {
        self.inner.record_phase2_close(id, status, closed_on, closed_by)
    }

    async fn set_sub_status(
        &self,
        row: ProtocolRecipientId,
        sub_status: SubStatus,
        unfit_reason: Option<&str>,
    ) -> Result<()> {
        self.inner.set_sub_status(row, sub_status, unfit_reason)
    }

    async fn recipient_events(&self, recipients: &[RecipientId]) -> Result<Vec<RecipientEvent>> {
        self.inner.recipient_events(recipients)
    }

    async fn append_status_history(&self, entry: &StatusHistoryEntry) -> Result<()> {
        if self.refuse_history_for.contains(&entry.recipient_id) {
            bail!("status history is read-only for recipient {}", entry.recipient_id);
        }
        self.inner.append_status_history(entry)
    }

    async fn status_history(&self, id: RecipientId) -> Result<Vec<StatusHistoryEntry>> {
        self.inner.status_history(id)
    }

    async fn record_transfer(&self, transfer: &NewTransfer) -> Result<TransferId> {
        self.inner.record_transfer(transfer)
    }

    async fn transfers(&self, id: RecipientId) -> Result<Vec<TransferEvent>> {
        self.inner.transfers(id)
    }

    async fn record_diagnosis(&self, diagnosis: &NewDiagnosis) -> Result<DiagnosisId> {
        self.inner.record_diagnosis(diagnosis)
    }

    async fn diagnoses(&self, id: RecipientId) -> Result<Vec<Diagnosis>> {
        self.inner.diagnoses(id)
    }

    async fn record_calving(&self, calving: &CalvingEvent) -> Result<()> {
        self.inner.record_calving(calving)
    }

    async fn insert_batch(&self, batch: &NewBatch) -> Result<BatchId> {
        self.inner.insert_batch(batch)
    }

    async fn batches(&self, ids: &[BatchId]) -> Result<Vec<FertilizationBatch>> {
        self.inner.batches(ids)
    }

    async fn set_batch_eligibility(&self, id: BatchId, eligible: bool) -> Result<()> {
        self.inner.set_batch_eligibility(id, eligible)
    }

    async fn insert_embryo(&self, embryo: &NewEmbryo) -> Result<EmbryoId> {
        self.inner.insert_embryo(embryo)
    }

    async fn embryo(&self, id: EmbryoId) -> Result<Option<Embryo>> {
        self.inner.embryo(id)
    }

    async fn stock_embryos(&self) -> Result<Vec<Embryo>> {
        self.inner.stock_embryos()
    }

    async fn classify_embryo(
        &self,
        id: EmbryoId,
        grade: Option<Grade>,
        on: NaiveDate,
    ) -> Result<Option<Grade>> {
        self.inner.classify_embryo(id, grade, on)
    }

    async fn freeze_embryo(&self, id: EmbryoId, location: &str, on: NaiveDate) -> Result<()> {
        self.inner.freeze_embryo(id, location, on)
    }

    async fn discard_embryo(
        &self,
        id: EmbryoId,
        on: NaiveDate,
        notes: Option<&str>,
    ) -> Result<()> {
        self.inner.discard_embryo(id, on, notes)
    }

    async fn assign_embryo(
        &self,
        id: EmbryoId,
        assignment: EmbryoAssignment,
        on: NaiveDate,
    ) -> Result<()> {
        self.inner.assign_embryo(id, assignment, on)
    }

    async fn embryo_history(&self, id: EmbryoId) -> Result<Vec<EmbryoHistoryEntry>> {
        self.inner.embryo_history(id)
    }

    async fn expire_overdue_embryos(
        &self,
        today: NaiveDate,
        shelf_life_days: u32,
    ) -> Result<Vec<EmbryoId>> {
        self.inner.expire_overdue_embryos(today, shelf_life_days)
    }

    async fn upsert_open_session(&self, draft: &SessionDraft) -> Result<TransferSession> {
        self.inner.upsert_open_session(draft)
    }

    async fn open_session_for_farm(&self, farm: FarmId) -> Result<Option<TransferSession>> {
        self.inner.open_session_for_farm(farm)
    }

    async fn latest_open_session(&self) -> Result<Option<TransferSession>> {
        self.inner.latest_open_session()
    }

    async fn close_session(&self, id: SessionId) -> Result<()> {
        self.inner.close_session(id)
    }

    async fn farm_sessions(&self, farm: FarmId) -> Result<Vec<TransferSession>> {
        self.inner.farm_sessions(farm)
    }
}
