//! In-flight operation tokens.
//!
//! A mutating operation takes a token keyed by (kind, entity) before it first
//! awaits the ledger. A second trigger for the same key fails fast with
//! [`CoreError::AlreadyInFlight`] and performs no writes. Dropping the token
//! releases the key, including on early return and error paths.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::errors::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Enroll,
    Evaluate,
    ClosePhase1,
    ClosePhase2,
    CommitPhase1,
    MoveRecipient,
    SaveClassifications,
    EmbryoAction,
    PersistSession,
    RecordTransfer,
    RecordDiagnosis,
}

type Key = (OperationKind, i64);

#[derive(Debug, Clone, Default)]
pub struct OperationGuards {
    active: Arc<Mutex<HashSet<Key>>>,
}

impl OperationGuards {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, kind: OperationKind, entity: i64) -> Result<InFlightToken, CoreError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert((kind, entity)) {
            tracing::debug!(?kind, entity, "Rejected duplicate trigger");
            return Err(CoreError::AlreadyInFlight { kind, entity });
        }
        Ok(InFlightToken {
            registry: Arc::clone(&self.active),
            key: (kind, entity),
        })
    }

    #[must_use]
    pub fn is_in_flight(&self, kind: OperationKind, entity: i64) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(kind, entity))
    }
}

/// Held for the duration of one operation.
#[derive(Debug)]
#[must_use = "the operation is only guarded while the token is alive"]
pub struct InFlightToken {
    registry: Arc<Mutex<HashSet<Key>>>,
    key: Key,
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
