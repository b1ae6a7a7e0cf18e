//! SQLite-backed ledger.
//!
//! One connection behind a mutex. Every public method takes the lock, runs
//! its statements (inside a transaction when the write is atomic) and
//! releases it before returning, so no lock is ever held across an await.

mod embryos;
mod events;
mod herd;
mod protocols;
mod sessions;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use reprotrack_types::{
    BatchId, CalvingEvent, Diagnosis, DiagnosisId, Embryo, EmbryoHistoryEntry, EmbryoId,
    EnrollmentDetails, Farm, FarmHistoryEntry, FarmId, FertilizationBatch, Grade, Protocol,
    ProtocolId, ProtocolRecipient, ProtocolRecipientId, ProtocolStatus, Recipient,
    RecipientEvent, RecipientId, RenameRecord, SessionDraft, SessionId, StatusHistoryEntry,
    SubStatus, TransferEvent, TransferId, TransferSession,
};

use crate::sqlite_util::open_db;
use crate::{
    EmbryoAssignment, FarmMove, Ledger, NewBatch, NewDiagnosis, NewEmbryo, NewProtocol,
    NewRecipient, NewTransfer,
};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Reproduction ledger persisted in SQLite.
pub struct SqliteLedger {
    db: Mutex<Connection>,
}

impl SqliteLedger {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS farms (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recipients (
            id INTEGER PRIMARY KEY,
            ear_tag TEXT NOT NULL,
            name TEXT
        );

        CREATE TABLE IF NOT EXISTS farm_history (
            id INTEGER PRIMARY KEY,
            recipient_id INTEGER NOT NULL REFERENCES recipients(id),
            farm_id INTEGER NOT NULL REFERENCES farms(id),
            started_on TEXT NOT NULL,
            ended_on TEXT,
            notes TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_farm_history_active
        ON farm_history(recipient_id) WHERE ended_on IS NULL;

        CREATE INDEX IF NOT EXISTS idx_farm_history_farm
        ON farm_history(farm_id) WHERE ended_on IS NULL;

        CREATE TABLE IF NOT EXISTS rename_history (
            id INTEGER PRIMARY KEY,
            recipient_id INTEGER NOT NULL REFERENCES recipients(id),
            old_tag TEXT NOT NULL,
            new_tag TEXT NOT NULL,
            renamed_on TEXT NOT NULL,
            reason TEXT NOT NULL,
            notes TEXT
        );

        CREATE TABLE IF NOT EXISTS status_history (
            id INTEGER PRIMARY KEY,
            recipient_id INTEGER NOT NULL REFERENCES recipients(id),
            status TEXT NOT NULL,
            recorded_on TEXT NOT NULL,
            source TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS protocols (
            id INTEGER PRIMARY KEY,
            farm_id INTEGER NOT NULL REFERENCES farms(id),
            started_on TEXT NOT NULL,
            responsible TEXT NOT NULL,
            status TEXT NOT NULL,
            closed_on TEXT,
            closed_by TEXT
        );

        CREATE TABLE IF NOT EXISTS protocol_recipients (
            id INTEGER PRIMARY KEY,
            protocol_id INTEGER NOT NULL REFERENCES protocols(id),
            recipient_id INTEGER NOT NULL REFERENCES recipients(id),
            sub_status TEXT NOT NULL,
            unfit_reason TEXT,
            cycling TEXT,
            quality INTEGER,
            notes TEXT,
            UNIQUE (protocol_id, recipient_id)
        );

        CREATE INDEX IF NOT EXISTS idx_protocol_recipients_recipient
        ON protocol_recipients(recipient_id);

        CREATE TABLE IF NOT EXISTS transfers (
            id INTEGER PRIMARY KEY,
            recipient_id INTEGER NOT NULL REFERENCES recipients(id),
            embryo_id INTEGER NOT NULL REFERENCES embryos(id),
            protocol_recipient_id INTEGER REFERENCES protocol_recipients(id),
            performed_on TEXT NOT NULL,
            outcome TEXT NOT NULL,
            veterinarian TEXT,
            technician TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_transfers_recipient ON transfers(recipient_id);

        CREATE TABLE IF NOT EXISTS diagnoses (
            id INTEGER PRIMARY KEY,
            recipient_id INTEGER NOT NULL REFERENCES recipients(id),
            diagnosed_on TEXT NOT NULL,
            kind TEXT NOT NULL,
            result TEXT NOT NULL,
            fetus_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_diagnoses_recipient ON diagnoses(recipient_id);

        CREATE TABLE IF NOT EXISTS calvings (
            id INTEGER PRIMARY KEY,
            recipient_id INTEGER NOT NULL REFERENCES recipients(id),
            calved_on TEXT NOT NULL,
            notes TEXT
        );

        CREATE TABLE IF NOT EXISTS batches (
            id INTEGER PRIMARY KEY,
            fertilized_on TEXT NOT NULL,
            eligible_for_transfer INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS batch_destinations (
            batch_id INTEGER NOT NULL REFERENCES batches(id),
            farm_id INTEGER NOT NULL REFERENCES farms(id),
            PRIMARY KEY (batch_id, farm_id)
        );

        CREATE TABLE IF NOT EXISTS embryos (
            id INTEGER PRIMARY KEY,
            batch_id INTEGER NOT NULL REFERENCES batches(id),
            dispatched_on TEXT NOT NULL,
            disposition TEXT NOT NULL,
            grade TEXT,
            destination_farm_id INTEGER REFERENCES farms(id),
            client_id INTEGER,
            location TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_embryos_batch ON embryos(batch_id);

        CREATE TABLE IF NOT EXISTS embryo_history (
            id INTEGER PRIMARY KEY,
            embryo_id INTEGER NOT NULL REFERENCES embryos(id),
            operation TEXT NOT NULL,
            old_value TEXT,
            new_value TEXT,
            recorded_on TEXT NOT NULL,
            notes TEXT
        );

        CREATE TABLE IF NOT EXISTS transfer_sessions (
            id INTEGER PRIMARY KEY,
            farm_id INTEGER NOT NULL REFERENCES farms(id),
            package_batch_id INTEGER,
            package_dispatched_on TEXT,
            protocol_id INTEGER,
            transfer_ids TEXT NOT NULL DEFAULT '[]',
            protocol_recipient_ids TEXT NOT NULL DEFAULT '[]',
            params TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            touched INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_transfer_sessions_one_open
        ON transfer_sessions(farm_id) WHERE status = 'OPEN';
    ";

    /// Open or create the ledger database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let db = open_db(path)?;
        db.busy_timeout(busy_timeout)
            .context("Failed to set ledger busy timeout")?;
        tracing::debug!(path = %path.display(), "Opened ledger");
        Self::initialize(db)
    }

    /// Open an in-memory ledger (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory ledger")?;
        Self::initialize(db)
    }

    fn initialize(db: Connection) -> Result<Self> {
        db.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;",
        )
        .context("Failed to set ledger pragmas")?;
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create ledger schema")?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow!("ledger connection lock poisoned"))
    }
}

impl Ledger for SqliteLedger {
    async fn insert_farm(&self, name: &str) -> Result<FarmId> {
        SqliteLedger::insert_farm(self, name)
    }

    async fn farm(&self, id: FarmId) -> Result<Option<Farm>> {
        SqliteLedger::farm(self, id)
    }

    async fn insert_recipient(&self, recipient: &NewRecipient) -> Result<RecipientId> {
        SqliteLedger::insert_recipient(self, recipient)
    }

    async fn recipient(&self, id: RecipientId) -> Result<Option<Recipient>> {
        SqliteLedger::recipient(self, id)
    }

    async fn active_farm(&self, id: RecipientId) -> Result<Option<FarmId>> {
        SqliteLedger::active_farm(self, id)
    }

    async fn active_residents(&self, farm: FarmId) -> Result<Vec<Recipient>> {
        SqliteLedger::active_residents(self, farm)
    }

    async fn farm_history(&self, id: RecipientId) -> Result<Vec<FarmHistoryEntry>> {
        SqliteLedger::farm_history(self, id)
    }

    async fn rename_recipient(&self, rename: &RenameRecord) -> Result<()> {
        SqliteLedger::rename_recipient(self, rename)
    }

    async fn rename_history(&self, id: RecipientId) -> Result<Vec<RenameRecord>> {
        SqliteLedger::rename_history(self, id)
    }

    async fn move_recipient(&self, request: &FarmMove) -> Result<()> {
        SqliteLedger::move_recipient(self, request)
    }

    async fn insert_protocol(&self, protocol: &NewProtocol) -> Result<ProtocolId> {
        SqliteLedger::insert_protocol(self, protocol)
    }

    async fn create_protocol_atomic(
        &self,
        protocol: &NewProtocol,
        enrollments: &[(RecipientId, EnrollmentDetails)],
    ) -> Result<ProtocolId> {
        SqliteLedger::create_protocol_atomic(self, protocol, enrollments)
    }

    async fn protocol(&self, id: ProtocolId) -> Result<Option<Protocol>> {
        SqliteLedger::protocol(self, id)
    }

    async fn enroll(
        &self,
        protocol: ProtocolId,
        recipient: RecipientId,
        details: &EnrollmentDetails,
    ) -> Result<ProtocolRecipientId> {
        SqliteLedger::enroll(self, protocol, recipient, details)
    }

    async fn protocol_recipients(&self, protocol: ProtocolId) -> Result<Vec<ProtocolRecipient>> {
        SqliteLedger::protocol_recipients(self, protocol)
    }

    async fn protocol_recipient_rows(
        &self,
        ids: &[ProtocolRecipientId],
    ) -> Result<Vec<ProtocolRecipient>> {
        SqliteLedger::protocol_recipient_rows(self, ids)
    }

    async fn open_enrollments(&self, recipients: &[RecipientId]) -> Result<Vec<ProtocolRecipient>> {
        SqliteLedger::open_enrollments(self, recipients)
    }

    async fn set_protocol_status(&self, id: ProtocolId, status: ProtocolStatus) -> Result<()> {
        SqliteLedger::set_protocol_status(self, id, status)
    }

    async fn record_phase2_close(
        &self,
        id: ProtocolId,
        status: ProtocolStatus,
        closed_on: NaiveDate,
        closed_by: &str,
    ) -> Result<()> {
        SqliteLedger::record_phase2_close(self, id, status, closed_on, closed_by)
    }

    async fn set_sub_status(
        &self,
        row: ProtocolRecipientId,
        sub_status: SubStatus,
        unfit_reason: Option<&str>,
    ) -> Result<()> {
        SqliteLedger::set_sub_status(self, row, sub_status, unfit_reason)
    }

    async fn recipient_events(&self, recipients: &[RecipientId]) -> Result<Vec<RecipientEvent>> {
        SqliteLedger::recipient_events(self, recipients)
    }

    async fn append_status_history(&self, entry: &StatusHistoryEntry) -> Result<()> {
        SqliteLedger::append_status_history(self, entry)
    }

    async fn status_history(&self, id: RecipientId) -> Result<Vec<StatusHistoryEntry>> {
        SqliteLedger::status_history(self, id)
    }

    async fn record_transfer(&self, transfer: &NewTransfer) -> Result<TransferId> {
        SqliteLedger::record_transfer(self, transfer)
    }

    async fn transfers(&self, id: RecipientId) -> Result<Vec<TransferEvent>> {
        SqliteLedger::transfers(self, id)
    }

    async fn record_diagnosis(&self, diagnosis: &NewDiagnosis) -> Result<DiagnosisId> {
        SqliteLedger::record_diagnosis(self, diagnosis)
    }

    async fn diagnoses(&self, id: RecipientId) -> Result<Vec<Diagnosis>> {
        SqliteLedger::diagnoses(self, id)
    }

    async fn record_calving(&self, calving: &CalvingEvent) -> Result<()> {
        SqliteLedger::record_calving(self, calving)
    }

    async fn insert_batch(&self, batch: &NewBatch) -> Result<BatchId> {
        SqliteLedger::insert_batch(self, batch)
    }

    async fn batches(&self, ids: &[BatchId]) -> Result<Vec<FertilizationBatch>> {
        SqliteLedger::batches(self, ids)
    }

    async fn set_batch_eligibility(&self, id: BatchId, eligible: bool) -> Result<()> {
        SqliteLedger::set_batch_eligibility(self, id, eligible)
    }

    async fn insert_embryo(&self, embryo: &NewEmbryo) -> Result<EmbryoId> {
        SqliteLedger::insert_embryo(self, embryo)
    }

    async fn embryo(&self, id: EmbryoId) -> Result<Option<Embryo>> {
        SqliteLedger::embryo(self, id)
    }

    async fn stock_embryos(&self) -> Result<Vec<Embryo>> {
        SqliteLedger::stock_embryos(self)
    }

    async fn classify_embryo(
        &self,
        id: EmbryoId,
        grade: Option<Grade>,
        on: NaiveDate,
    ) -> Result<Option<Grade>> {
        SqliteLedger::classify_embryo(self, id, grade, on)
    }

    async fn freeze_embryo(&self, id: EmbryoId, location: &str, on: NaiveDate) -> Result<()> {
        SqliteLedger::freeze_embryo(self, id, location, on)
    }

    async fn discard_embryo(
        &self,
        id: EmbryoId,
        on: NaiveDate,
        notes: Option<&str>,
    ) -> Result<()> {
        SqliteLedger::discard_embryo(self, id, on, notes)
    }

    async fn assign_embryo(
        &self,
        id: EmbryoId,
        assignment: EmbryoAssignment,
        on: NaiveDate,
    ) -> Result<()> {
        SqliteLedger::assign_embryo(self, id, assignment, on)
    }

    async fn embryo_history(&self, id: EmbryoId) -> Result<Vec<EmbryoHistoryEntry>> {
        SqliteLedger::embryo_history(self, id)
    }

    async fn expire_overdue_embryos(
        &self,
        today: NaiveDate,
        shelf_life_days: u32,
    ) -> Result<Vec<EmbryoId>> {
        SqliteLedger::expire_overdue_embryos(self, today, shelf_life_days)
    }

    async fn upsert_open_session(&self, draft: &SessionDraft) -> Result<TransferSession> {
        SqliteLedger::upsert_open_session(self, draft)
    }

    async fn open_session_for_farm(&self, farm: FarmId) -> Result<Option<TransferSession>> {
        SqliteLedger::open_session_for_farm(self, farm)
    }

    async fn latest_open_session(&self) -> Result<Option<TransferSession>> {
        SqliteLedger::latest_open_session(self)
    }

    async fn close_session(&self, id: SessionId) -> Result<()> {
        SqliteLedger::close_session(self, id)
    }

    async fn farm_sessions(&self, farm: FarmId) -> Result<Vec<TransferSession>> {
        SqliteLedger::farm_sessions(self, farm)
    }
}
