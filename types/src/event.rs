//! Ledger events and the canonical per-recipient event stream.
//!
//! The ledger keeps enrollment rows, transfers, diagnoses and calvings in
//! separate record sets. [`RecipientEvent`] is the single shape they are
//! projected into before the status reducer folds them.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    DiagnosisId, EmbryoId, ProtocolId, ProtocolRecipientId, ProtocolStatus, RecipientId,
    SubStatus, TransferId, UnknownCode,
};

// ── Transfers ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferOutcome {
    Performed,
    NotPerformed,
}

impl TransferOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Performed => "PERFORMED",
            Self::NotPerformed => "NOT_PERFORMED",
        }
    }
}

impl FromStr for TransferOutcome {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERFORMED" => Ok(Self::Performed),
            "NOT_PERFORMED" => Ok(Self::NotPerformed),
            other => Err(UnknownCode::new("transfer outcome", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub id: TransferId,
    pub recipient_id: RecipientId,
    pub embryo_id: EmbryoId,
    pub protocol_recipient_id: Option<ProtocolRecipientId>,
    pub performed_on: NaiveDate,
    pub outcome: TransferOutcome,
}

// ── Diagnoses ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosisKind {
    PregnancyCheck,
    Sexing,
}

impl DiagnosisKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PregnancyCheck => "PREGNANCY_CHECK",
            Self::Sexing => "SEXING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PregnancyResult {
    Pregnant,
    /// Pregnant, but flagged for a confirmation check.
    Retouch,
    Empty,
}

impl PregnancyResult {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pregnant => "PREGNANT",
            Self::Retouch => "RETOUCH",
            Self::Empty => "EMPTY",
        }
    }
}

/// Sex observed for one fetus at sexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetalSex {
    Female,
    Male,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SexingResult {
    Female,
    Male,
    NoSex,
    TwoSexes,
    Empty,
}

impl SexingResult {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Female => "FEMALE",
            Self::Male => "MALE",
            Self::NoSex => "NO_SEX",
            Self::TwoSexes => "TWO_SEXES",
            Self::Empty => "EMPTY",
        }
    }

    /// Collapse per-fetus observations into one sexing result.
    ///
    /// No fetuses means the recipient lost the pregnancy.
    #[must_use]
    pub fn from_fetuses(fetuses: &[FetalSex]) -> Self {
        if fetuses.is_empty() {
            return Self::Empty;
        }
        let female = fetuses.contains(&FetalSex::Female);
        let male = fetuses.contains(&FetalSex::Male);
        let unknown = fetuses.contains(&FetalSex::Unknown);

        match (female, male, unknown) {
            (true, true, _) => Self::TwoSexes,
            (true, false, false) => Self::Female,
            (false, true, false) => Self::Male,
            _ => Self::NoSex,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosisResult {
    Pregnancy(PregnancyResult),
    Sexing(SexingResult),
}

impl DiagnosisResult {
    #[must_use]
    pub const fn kind(self) -> DiagnosisKind {
        match self {
            Self::Pregnancy(_) => DiagnosisKind::PregnancyCheck,
            Self::Sexing(_) => DiagnosisKind::Sexing,
        }
    }

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Pregnancy(result) => result.as_str(),
            Self::Sexing(result) => result.as_str(),
        }
    }

    /// Rebuild a result from its stored `(kind, code)` pair.
    pub fn from_codes(kind: &str, code: &str) -> Result<Self, UnknownCode> {
        match (kind, code) {
            ("PREGNANCY_CHECK", "PREGNANT") => Ok(Self::Pregnancy(PregnancyResult::Pregnant)),
            ("PREGNANCY_CHECK", "RETOUCH") => Ok(Self::Pregnancy(PregnancyResult::Retouch)),
            ("PREGNANCY_CHECK", "EMPTY") => Ok(Self::Pregnancy(PregnancyResult::Empty)),
            ("SEXING", "FEMALE") => Ok(Self::Sexing(SexingResult::Female)),
            ("SEXING", "MALE") => Ok(Self::Sexing(SexingResult::Male)),
            ("SEXING", "NO_SEX") => Ok(Self::Sexing(SexingResult::NoSex)),
            ("SEXING", "TWO_SEXES") => Ok(Self::Sexing(SexingResult::TwoSexes)),
            ("SEXING", "EMPTY") => Ok(Self::Sexing(SexingResult::Empty)),
            _ => Err(UnknownCode::new("diagnosis result", &format!("{kind}/{code}"))),
        }
    }
}

impl fmt::Display for DiagnosisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub id: DiagnosisId,
    pub recipient_id: RecipientId,
    pub diagnosed_on: NaiveDate,
    pub result: DiagnosisResult,
    /// Number of fetuses seen; zero for empty results.
    pub fetus_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalvingEvent {
    pub recipient_id: RecipientId,
    pub calved_on: NaiveDate,
    pub notes: Option<String>,
}

// ── Canonical stream ─────────────────────────────────────────

/// What happened to a recipient, projected from whichever record set holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Protocol {
        protocol_id: ProtocolId,
        sub_status: SubStatus,
        protocol_status: ProtocolStatus,
    },
    Transfer(TransferOutcome),
    PregnancyCheck(PregnancyResult),
    Sexing(SexingResult),
    Calving,
}

impl EventKind {
    /// Tie-break rank for events sharing a date; higher ranks apply later
    /// and therefore win.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Protocol { .. } => 1,
            Self::Transfer(_) => 2,
            Self::Sexing(_) => 3,
            Self::PregnancyCheck(_) => 4,
            Self::Calving => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientEvent {
    pub recipient_id: RecipientId,
    pub occurred_on: NaiveDate,
    /// Ledger insertion order within the source record set; last tie-break.
    pub seq: i64,
    pub kind: EventKind,
}

impl RecipientEvent {
    /// Sort key used by the status reducer.
    #[must_use]
    pub fn order_key(&self) -> (NaiveDate, u8, i64) {
        (self.occurred_on, self.kind.precedence(), self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::{DiagnosisResult, FetalSex, PregnancyResult, SexingResult};

    #[test]
    fn sexing_collapses_like_the_field_sheet() {
        use FetalSex::{Female, Male, Unknown};

        assert_eq!(SexingResult::from_fetuses(&[]), SexingResult::Empty);
        assert_eq!(SexingResult::from_fetuses(&[Female]), SexingResult::Female);
        assert_eq!(SexingResult::from_fetuses(&[Male, Male]), SexingResult::Male);
        assert_eq!(SexingResult::from_fetuses(&[Female, Male]), SexingResult::TwoSexes);
        assert_eq!(
            SexingResult::from_fetuses(&[Female, Male, Unknown]),
            SexingResult::TwoSexes
        );
        assert_eq!(SexingResult::from_fetuses(&[Female, Unknown]), SexingResult::NoSex);
        assert_eq!(SexingResult::from_fetuses(&[Unknown]), SexingResult::NoSex);
    }

    #[test]
    fn diagnosis_codes_round_trip() {
        let results = [
            DiagnosisResult::Pregnancy(PregnancyResult::Retouch),
            DiagnosisResult::Sexing(SexingResult::TwoSexes),
        ];
        for result in results {
            let back = DiagnosisResult::from_codes(result.kind().as_str(), result.code()).unwrap();
            assert_eq!(back, result);
        }
        assert!(DiagnosisResult::from_codes("SEXING", "RETOUCH").is_err());
    }
}
