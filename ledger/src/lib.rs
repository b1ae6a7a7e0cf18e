//! Event ledger for reprotrack.
//!
//! The ledger is the only collaborator the core services talk to. It stores
//! the append-only record sets (enrollments, transfers, diagnoses, calvings,
//! farm history, renames, embryo history) plus the mutable rows the workflows
//! drive (protocol status, embryo disposition, transfer sessions).
//!
//! [`Ledger`] is the seam; [`SqliteLedger`] is the production store.

mod ledger;
mod records;
mod sqlite;
mod sqlite_util;

pub use ledger::Ledger;
pub use records::{
    EmbryoAssignment, FarmMove, NewBatch, NewDiagnosis, NewEmbryo, NewProtocol, NewRecipient,
    NewTransfer,
};
pub use sqlite::SqliteLedger;
