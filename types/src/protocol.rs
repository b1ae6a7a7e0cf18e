//! Synchronization protocol data model.
//!
//! A protocol walks `OpenPhase1 → Phase1Closed → {Synchronized | Closed}`.
//! The legal edges live here so every layer agrees on them; the gates that
//! depend on ledger state (enrolled count, unresolved rows) live in core.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{FarmId, NonEmptyString, ProtocolId, ProtocolRecipientId, RecipientId, UnknownCode};

// ── Protocol lifecycle ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolStatus {
    OpenPhase1,
    Phase1Closed,
    Synchronized,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid protocol transition from {from} to {to}")]
pub struct ProtocolTransitionError {
    pub from: ProtocolStatus,
    pub to: ProtocolStatus,
}

impl ProtocolStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenPhase1 => "OPEN_PHASE1",
            Self::Phase1Closed => "PHASE1_CLOSED",
            Self::Synchronized => "SYNCHRONIZED",
            Self::Closed => "CLOSED",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Synchronized | Self::Closed)
    }

    /// Validate a lifecycle edge and return the target state.
    pub fn transition(self, to: Self) -> Result<Self, ProtocolTransitionError> {
        let legal = matches!(
            (self, to),
            (Self::OpenPhase1, Self::Phase1Closed)
                | (Self::Phase1Closed, Self::Synchronized | Self::Closed)
        );
        if legal {
            Ok(to)
        } else {
            Err(ProtocolTransitionError { from: self, to })
        }
    }
}

impl fmt::Display for ProtocolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolStatus {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN_PHASE1" => Ok(Self::OpenPhase1),
            "PHASE1_CLOSED" => Ok(Self::Phase1Closed),
            "SYNCHRONIZED" => Ok(Self::Synchronized),
            "CLOSED" => Ok(Self::Closed),
            other => Err(UnknownCode::new("protocol status", other)),
        }
    }
}

// ── Per-recipient sub-status ─────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubStatus {
    Started,
    Fit,
    Unfit,
    /// A fit recipient that has since received an embryo.
    Used,
}

impl SubStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Fit => "FIT",
            Self::Unfit => "UNFIT",
            Self::Used => "USED",
        }
    }

    /// Rows in this state count against global enrollment exclusivity.
    #[must_use]
    pub const fn holds_enrollment(self) -> bool {
        matches!(self, Self::Started | Self::Fit)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Unfit | Self::Used)
    }
}

impl fmt::Display for SubStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubStatus {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(Self::Started),
            "FIT" => Ok(Self::Fit),
            "UNFIT" => Ok(Self::Unfit),
            "USED" => Ok(Self::Used),
            other => Err(UnknownCode::new("protocol sub-status", other)),
        }
    }
}

/// Phase-2 review decision for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Fit,
    Unfit { reason: Option<String> },
    /// Undo a previous decision; the row goes back to `Started`.
    Reset,
}

impl Verdict {
    #[must_use]
    pub fn sub_status(&self) -> SubStatus {
        match self {
            Self::Fit => SubStatus::Fit,
            Self::Unfit { .. } => SubStatus::Unfit,
            Self::Reset => SubStatus::Started,
        }
    }

    /// The unfit reason, trimmed; blank reasons are dropped.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Unfit { reason } => reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(ToString::to_string),
            Self::Fit | Self::Reset => None,
        }
    }
}

// ── Enrollment attributes ────────────────────────────────────

/// Ovarian cycling classification recorded at enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CyclingClass {
    /// Not cycling.
    N,
    /// Corpus luteum present.
    CL,
}

impl CyclingClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::N => "N",
            Self::CL => "CL",
        }
    }
}

impl FromStr for CyclingClass {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "N" => Ok(Self::N),
            "CL" => Ok(Self::CL),
            other => Err(UnknownCode::new("cycling class", other)),
        }
    }
}

/// Traffic-light quality tier, 1 (best) to 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct QualityTier(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("quality tier must be 1, 2 or 3 (got {0})")]
pub struct QualityTierError(pub u8);

impl QualityTier {
    pub fn try_new(value: u8) -> Result<Self, QualityTierError> {
        if (1..=3).contains(&value) {
            Ok(Self(value))
        } else {
            Err(QualityTierError(value))
        }
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for QualityTier {
    type Error = QualityTierError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<QualityTier> for u8 {
    fn from(value: QualityTier) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentDetails {
    pub cycling: Option<CyclingClass>,
    pub quality: Option<QualityTier>,
    pub notes: Option<String>,
}

// ── Records ──────────────────────────────────────────────────

/// Fields required to open a protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolHeader {
    pub farm_id: FarmId,
    pub started_on: NaiveDate,
    pub responsible: NonEmptyString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub id: ProtocolId,
    pub farm_id: FarmId,
    pub started_on: NaiveDate,
    pub responsible: String,
    pub status: ProtocolStatus,
    pub closed_on: Option<NaiveDate>,
    pub closed_by: Option<String>,
}

impl Protocol {
    /// The header is complete when the responsible party is not blank.
    #[must_use]
    pub fn header_complete(&self) -> bool {
        !self.responsible.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolRecipient {
    pub id: ProtocolRecipientId,
    pub protocol_id: ProtocolId,
    pub recipient_id: RecipientId,
    pub sub_status: SubStatus,
    pub unfit_reason: Option<String>,
    pub details: EnrollmentDetails,
}
