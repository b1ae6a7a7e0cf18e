//! Typed failures of the core services.
//!
//! Every service returns [`CoreError`]. Callers branch on [`CoreError::kind`]
//! rather than on individual variants; the variants carry what a message or a
//! follow-up action needs (the conflicting protocol, the clashing recipient).

use thiserror::Error;

use reprotrack_types::{
    FarmId, PackageKey, ProtocolId, ProtocolStatus, ProtocolTransitionError, RecipientId,
    ReproductiveStatus, StageAction,
};

use crate::guard::OperationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Precondition,
    Transient,
    Invariant,
    InFlight,
    NotFound,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("{0}")]
    Validation(String),

    #[error("recipient {recipient} is already enrolled in protocol {protocol}")]
    RecipientAlreadyEnrolled {
        recipient: RecipientId,
        protocol: ProtocolId,
    },

    #[error("farm {farm} already has an active recipient named '{name}' ({existing})")]
    NameConflict {
        farm: FarmId,
        name: String,
        existing: RecipientId,
    },

    #[error("no free ear tag derived from '{tag}' on farm {farm} after {attempts} attempts")]
    TagGenerationExhausted {
        farm: FarmId,
        tag: String,
        attempts: u32,
    },

    #[error("package {0} appears more than once")]
    DuplicatePackage(PackageKey),

    #[error("recipient {recipient} already received an embryo in this session")]
    AlreadyServed { recipient: RecipientId },

    #[error(transparent)]
    Transition(#[from] ProtocolTransitionError),

    #[error("protocol {protocol} is {actual}; expected {expected}")]
    WrongProtocolState {
        protocol: ProtocolId,
        expected: ProtocolStatus,
        actual: ProtocolStatus,
    },

    #[error("protocol {0} header is incomplete")]
    HeaderIncomplete(ProtocolId),

    #[error("protocol {0} has no enrolled recipients")]
    NoRecipientsEnrolled(ProtocolId),

    #[error("protocol {protocol} still has {count} recipient(s) without a verdict")]
    UnresolvedRecipients { protocol: ProtocolId, count: usize },

    #[error("recipient {recipient} is {status}; {action:?} is not allowed")]
    StageNotAllowed {
        recipient: RecipientId,
        status: ReproductiveStatus,
        action: StageAction,
    },

    #[error("{0}")]
    Precondition(String),

    #[error("ledger failure: {0:#}")]
    Transient(#[from] anyhow::Error),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("{kind:?} already in flight for {entity}")]
    AlreadyInFlight { kind: OperationKind, entity: i64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
}

impl CoreError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField { .. } | Self::Validation(_) => ErrorKind::Validation,
            Self::RecipientAlreadyEnrolled { .. }
            | Self::NameConflict { .. }
            | Self::TagGenerationExhausted { .. }
            | Self::DuplicatePackage(_)
            | Self::AlreadyServed { .. } => ErrorKind::Conflict,
            Self::Transition(_)
            | Self::WrongProtocolState { .. }
            | Self::HeaderIncomplete(_)
            | Self::NoRecipientsEnrolled(_)
            | Self::UnresolvedRecipients { .. }
            | Self::StageNotAllowed { .. }
            | Self::Precondition(_) => ErrorKind::Precondition,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Invariant(_) => ErrorKind::Invariant,
            Self::AlreadyInFlight { .. } => ErrorKind::InFlight,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Result of one item in a best-effort batch.
#[derive(Debug)]
pub struct ItemOutcome<T> {
    pub item: T,
    pub error: Option<CoreError>,
}

impl<T> ItemOutcome<T> {
    pub(crate) fn ok(item: T) -> Self {
        Self { item, error: None }
    }

    pub(crate) fn failed(item: T, error: CoreError) -> Self {
        Self {
            item,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
