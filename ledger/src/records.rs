//! Inputs for ledger writes.

use chrono::NaiveDate;

use reprotrack_types::{
    BatchId, ClientId, DiagnosisResult, Disposition, EmbryoId, FarmId, Grade, ProtocolRecipientId,
    ProtocolStatus, RecipientId, TransferOutcome,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecipient {
    pub ear_tag: String,
    pub name: Option<String>,
    pub farm_id: FarmId,
    /// Start of the first farm-history row.
    pub since: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProtocol {
    pub farm_id: FarmId,
    pub started_on: NaiveDate,
    pub responsible: String,
    /// Written with the header row; the wizard commits straight into PHASE1_CLOSED.
    pub status: ProtocolStatus,
}

/// Relocation of one recipient; both farm-history writes happen in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FarmMove {
    pub recipient_id: RecipientId,
    pub target_farm_id: FarmId,
    pub moved_on: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub recipient_id: RecipientId,
    pub embryo_id: EmbryoId,
    pub protocol_recipient_id: Option<ProtocolRecipientId>,
    pub performed_on: NaiveDate,
    pub outcome: TransferOutcome,
    pub veterinarian: Option<String>,
    pub technician: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDiagnosis {
    pub recipient_id: RecipientId,
    pub diagnosed_on: NaiveDate,
    pub result: DiagnosisResult,
    pub fetus_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub fertilized_on: NaiveDate,
    pub eligible_for_transfer: bool,
    pub destination_farm_ids: Vec<FarmId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmbryo {
    pub batch_id: BatchId,
    pub dispatched_on: NaiveDate,
    pub disposition: Disposition,
    pub grade: Option<Grade>,
    pub destination_farm_id: Option<FarmId>,
}

/// New destination for an embryo. `None` clears the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbryoAssignment {
    pub client_id: Option<ClientId>,
    pub farm_id: Option<FarmId>,
}
