//! Core domain types for reprotrack.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from the ledger and from the core services.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod embryo;
mod event;
mod ids;
mod protocol;
mod recipient;
mod session;
mod status;

pub use embryo::{
    Disposition, DispositionCounts, Embryo, EmbryoHistoryEntry, EmbryoOperation, EmbryoPackage,
    FertilizationBatch, Grade, GradeCounts, PackageKey,
};
pub use event::{
    CalvingEvent, Diagnosis, DiagnosisKind, DiagnosisResult, EventKind, FetalSex, PregnancyResult,
    RecipientEvent, SexingResult, TransferEvent, TransferOutcome,
};
pub use ids::{
    BatchId, ClientId, DiagnosisId, EmbryoId, FarmId, ProtocolId, ProtocolRecipientId,
    RecipientId, SessionId, TransferId,
};
pub use protocol::{
    CyclingClass, EnrollmentDetails, Protocol, ProtocolHeader, ProtocolRecipient, ProtocolStatus,
    ProtocolTransitionError, QualityTier, QualityTierError, SubStatus, Verdict,
};
pub use recipient::{
    Farm, FarmHistoryEntry, Recipient, RenameReason, RenameRecord, StatusHistoryEntry,
};
pub use session::{EmbryoOrigin, SessionDraft, SessionParams, SessionStatus, TransferSession};
pub use status::{ReproductiveStatus, StageAction};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// NonEmpty String Types
// ============================================================================

/// A string guaranteed to be non-empty after trimming. Stored trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("value must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Err(EmptyStringError)
        } else if trimmed.len() == value.len() {
            Ok(Self(value))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// Accept an optional field, treating `None` and blank text alike.
    pub fn from_optional(value: Option<&str>) -> Result<Self, EmptyStringError> {
        value.map_or(Err(EmptyStringError), Self::new)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::ops::Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for NonEmptyString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Stored codes
// ============================================================================

/// A stored code that does not map to any known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} code: {code:?}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: String,
}

impl UnknownCode {
    #[must_use]
    pub fn new(kind: &'static str, code: &str) -> Self {
        Self {
            kind,
            code: code.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EmptyStringError, NonEmptyString, UnknownCode};

    #[test]
    fn non_empty_string_trims_and_rejects_blank() {
        assert_eq!(NonEmptyString::new("  "), Err(EmptyStringError));
        assert_eq!(NonEmptyString::new(" Dr. Ana ").unwrap().as_str(), "Dr. Ana");
        assert_eq!(NonEmptyString::from_optional(None), Err(EmptyStringError));
        assert_eq!(
            NonEmptyString::from_optional(Some("x")).unwrap().into_inner(),
            "x"
        );
    }

    #[test]
    fn non_empty_string_deserialize_validates() {
        let ok: NonEmptyString = serde_json::from_str("\"vet\"").unwrap();
        assert_eq!(&*ok, "vet");
        assert!(serde_json::from_str::<NonEmptyString>("\"  \"").is_err());
    }

    #[test]
    fn unknown_code_names_the_kind() {
        let err = UnknownCode::new("embryo grade", "ZZ");
        assert_eq!(err.to_string(), "unknown embryo grade code: \"ZZ\"");
    }
}
