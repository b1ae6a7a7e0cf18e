use anyhow::Result;
use chrono::NaiveDate;

use reprotrack_types::{
    BatchId, CalvingEvent, Diagnosis, DiagnosisId, Embryo, EmbryoHistoryEntry, EmbryoId,
    EnrollmentDetails, Farm, FarmHistoryEntry, FarmId, FertilizationBatch, Grade, Protocol,
    ProtocolId, ProtocolRecipient, ProtocolRecipientId, ProtocolStatus, Recipient,
    RecipientEvent, RecipientId, RenameRecord, SessionDraft, SessionId, StatusHistoryEntry,
    SubStatus, TransferEvent, TransferId, TransferSession,
};

use crate::{
    EmbryoAssignment, FarmMove, NewBatch, NewDiagnosis, NewEmbryo, NewProtocol, NewRecipient,
    NewTransfer,
};

/// Typed access to the reproduction ledger.
///
/// Reads never rewrite history. Methods documented as atomic run in a single
/// store transaction; every other write is one statement. Failures carry the
/// store error with context and are not retried here.
#[allow(async_fn_in_trait)]
pub trait Ledger {
    // ── Farms and recipients ─────────────────────────────────

    async fn insert_farm(&self, name: &str) -> Result<FarmId>;

    async fn farm(&self, id: FarmId) -> Result<Option<Farm>>;

    /// Atomic: the recipient and its first open farm-history row.
    async fn insert_recipient(&self, recipient: &NewRecipient) -> Result<RecipientId>;

    async fn recipient(&self, id: RecipientId) -> Result<Option<Recipient>>;

    /// Farm of the open farm-history row, if any.
    async fn active_farm(&self, id: RecipientId) -> Result<Option<FarmId>>;

    /// Recipients whose open farm-history row points at `farm`.
    async fn active_residents(&self, farm: FarmId) -> Result<Vec<Recipient>>;

    async fn farm_history(&self, id: RecipientId) -> Result<Vec<FarmHistoryEntry>>;

    /// Atomic: updates the ear tag and appends the rename record.
    async fn rename_recipient(&self, rename: &RenameRecord) -> Result<()>;

    async fn rename_history(&self, id: RecipientId) -> Result<Vec<RenameRecord>>;

    /// Atomic: closes the open farm-history row and opens one on the target.
    async fn move_recipient(&self, request: &FarmMove) -> Result<()>;

    // ── Protocols ────────────────────────────────────────────

    async fn insert_protocol(&self, protocol: &NewProtocol) -> Result<ProtocolId>;

    /// Atomic: the protocol in its requested status plus one STARTED row per enrollment.
    async fn create_protocol_atomic(
        &self,
        protocol: &NewProtocol,
        enrollments: &[(RecipientId, EnrollmentDetails)],
    ) -> Result<ProtocolId>;

    async fn protocol(&self, id: ProtocolId) -> Result<Option<Protocol>>;

    async fn enroll(
        &self,
        protocol: ProtocolId,
        recipient: RecipientId,
        details: &EnrollmentDetails,
    ) -> Result<ProtocolRecipientId>;

    async fn protocol_recipients(&self, protocol: ProtocolId) -> Result<Vec<ProtocolRecipient>>;

    async fn protocol_recipient_rows(
        &self,
        ids: &[ProtocolRecipientId],
    ) -> Result<Vec<ProtocolRecipient>>;

    /// STARTED/FIT rows of the given recipients in protocols that are not CLOSED.
    async fn open_enrollments(&self, recipients: &[RecipientId]) -> Result<Vec<ProtocolRecipient>>;

    async fn set_protocol_status(&self, id: ProtocolId, status: ProtocolStatus) -> Result<()>;

    /// Final status plus the phase-2 closing fields.
    async fn record_phase2_close(
        &self,
        id: ProtocolId,
        status: ProtocolStatus,
        closed_on: NaiveDate,
        closed_by: &str,
    ) -> Result<()>;

    async fn set_sub_status(
        &self,
        row: ProtocolRecipientId,
        sub_status: SubStatus,
        unfit_reason: Option<&str>,
    ) -> Result<()>;

    // ── Status stream ────────────────────────────────────────

    /// Canonical event stream for the given recipients, in no particular order.
    async fn recipient_events(&self, recipients: &[RecipientId]) -> Result<Vec<RecipientEvent>>;

    async fn append_status_history(&self, entry: &StatusHistoryEntry) -> Result<()>;

    async fn status_history(&self, id: RecipientId) -> Result<Vec<StatusHistoryEntry>>;

    // ── Transfers, diagnoses, calvings ───────────────────────

    /// Atomic. A performed transfer also marks the protocol row USED and the
    /// embryo TRANSFERRED, with an embryo-history entry.
    async fn record_transfer(&self, transfer: &NewTransfer) -> Result<TransferId>;

    async fn transfers(&self, id: RecipientId) -> Result<Vec<TransferEvent>>;

    async fn record_diagnosis(&self, diagnosis: &NewDiagnosis) -> Result<DiagnosisId>;

    async fn diagnoses(&self, id: RecipientId) -> Result<Vec<Diagnosis>>;

    async fn record_calving(&self, calving: &CalvingEvent) -> Result<()>;

    // ── Embryos ──────────────────────────────────────────────

    async fn insert_batch(&self, batch: &NewBatch) -> Result<BatchId>;

    async fn batches(&self, ids: &[BatchId]) -> Result<Vec<FertilizationBatch>>;

    async fn set_batch_eligibility(&self, id: BatchId, eligible: bool) -> Result<()>;

    async fn insert_embryo(&self, embryo: &NewEmbryo) -> Result<EmbryoId>;

    async fn embryo(&self, id: EmbryoId) -> Result<Option<Embryo>>;

    /// Embryos that are not discarded and not assigned to a client.
    async fn stock_embryos(&self) -> Result<Vec<Embryo>>;

    /// Atomic: sets the grade and appends a CLASSIFICATION entry.
    /// Returns the previous grade.
    async fn classify_embryo(
        &self,
        id: EmbryoId,
        grade: Option<Grade>,
        on: NaiveDate,
    ) -> Result<Option<Grade>>;

    async fn freeze_embryo(&self, id: EmbryoId, location: &str, on: NaiveDate) -> Result<()>;

    async fn discard_embryo(&self, id: EmbryoId, on: NaiveDate, notes: Option<&str>)
    -> Result<()>;

    async fn assign_embryo(
        &self,
        id: EmbryoId,
        assignment: EmbryoAssignment,
        on: NaiveDate,
    ) -> Result<()>;

    async fn embryo_history(&self, id: EmbryoId) -> Result<Vec<EmbryoHistoryEntry>>;

    /// Atomic: discards FRESH embryos whose batch was fertilized more than
    /// `shelf_life_days` before `today`. Returns the discarded ids.
    async fn expire_overdue_embryos(
        &self,
        today: NaiveDate,
        shelf_life_days: u32,
    ) -> Result<Vec<EmbryoId>>;

    // ── Transfer sessions ────────────────────────────────────

    /// Insert or update the single OPEN session of `draft.farm_id`.
    async fn upsert_open_session(&self, draft: &SessionDraft) -> Result<TransferSession>;

    async fn open_session_for_farm(&self, farm: FarmId) -> Result<Option<TransferSession>>;

    /// The most recently updated OPEN session across all farms.
    async fn latest_open_session(&self) -> Result<Option<TransferSession>>;

    async fn close_session(&self, id: SessionId) -> Result<()>;

    /// Every session of a farm, open or closed, newest first.
    async fn farm_sessions(&self, farm: FarmId) -> Result<Vec<TransferSession>>;
}
