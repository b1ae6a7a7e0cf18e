//! Reproductive status labels and the per-stage action gate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::UnknownCode;

/// Derived reproductive status of a recipient.
///
/// Never stored as the authority; always recomputed from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReproductiveStatus {
    #[default]
    Empty,
    Synchronizing,
    Synchronized,
    Served,
    Pregnant,
    PregnantRetouch,
    PregnantFemale,
    PregnantMale,
    PregnantNoSex,
    PregnantTwoSexes,
}

impl ReproductiveStatus {
    pub const ALL: [Self; 10] = [
        Self::Empty,
        Self::Synchronizing,
        Self::Synchronized,
        Self::Served,
        Self::Pregnant,
        Self::PregnantRetouch,
        Self::PregnantFemale,
        Self::PregnantMale,
        Self::PregnantNoSex,
        Self::PregnantTwoSexes,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::Synchronizing => "SYNCHRONIZING",
            Self::Synchronized => "SYNCHRONIZED",
            Self::Served => "SERVED",
            Self::Pregnant => "PREGNANT",
            Self::PregnantRetouch => "PREGNANT_RETOUCH",
            Self::PregnantFemale => "PREGNANT_FEMALE",
            Self::PregnantMale => "PREGNANT_MALE",
            Self::PregnantNoSex => "PREGNANT_NO_SEX",
            Self::PregnantTwoSexes => "PREGNANT_TWO_SEXES",
        }
    }

    /// Human-readable label for tables and badges.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Synchronizing => "Synchronizing",
            Self::Synchronized => "Synchronized",
            Self::Served => "Served",
            Self::Pregnant => "Pregnant",
            Self::PregnantRetouch => "Pregnant (retouch)",
            Self::PregnantFemale => "Pregnant with female",
            Self::PregnantMale => "Pregnant with male",
            Self::PregnantNoSex => "Pregnant (sex unknown)",
            Self::PregnantTwoSexes => "Pregnant with both sexes",
        }
    }

    #[must_use]
    pub const fn is_pregnant(self) -> bool {
        matches!(
            self,
            Self::Pregnant
                | Self::PregnantRetouch
                | Self::PregnantFemale
                | Self::PregnantMale
                | Self::PregnantNoSex
                | Self::PregnantTwoSexes
        )
    }

    /// Whether a recipient in this status may undergo `action`.
    #[must_use]
    pub const fn allows(self, action: StageAction) -> bool {
        match action {
            StageAction::EnterProtocol => matches!(self, Self::Empty),
            StageAction::Transfer => matches!(self, Self::Synchronized),
            StageAction::PregnancyCheck => matches!(self, Self::Served),
            StageAction::Sexing => matches!(self, Self::Pregnant | Self::PregnantRetouch),
            StageAction::Calving => self.is_pregnant(),
        }
    }
}

impl fmt::Display for ReproductiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReproductiveStatus {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownCode::new("reproductive status", s))
    }
}

/// A lifecycle step a recipient can be put through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAction {
    EnterProtocol,
    Transfer,
    PregnancyCheck,
    Sexing,
    Calving,
}

#[cfg(test)]
mod tests {
    use super::{ReproductiveStatus, StageAction};

    #[test]
    fn codes_round_trip_through_from_str() {
        for status in ReproductiveStatus::ALL {
            assert_eq!(status.as_str().parse::<ReproductiveStatus>().unwrap(), status);
        }
        assert!("VAZIA".parse::<ReproductiveStatus>().is_err());
    }

    #[test]
    fn only_empty_recipients_enter_a_protocol() {
        assert!(ReproductiveStatus::Empty.allows(StageAction::EnterProtocol));
        assert!(!ReproductiveStatus::Synchronizing.allows(StageAction::EnterProtocol));
        assert!(!ReproductiveStatus::Pregnant.allows(StageAction::EnterProtocol));
    }

    #[test]
    fn sexing_requires_a_confirmed_pregnancy() {
        assert!(ReproductiveStatus::Pregnant.allows(StageAction::Sexing));
        assert!(ReproductiveStatus::PregnantRetouch.allows(StageAction::Sexing));
        assert!(!ReproductiveStatus::PregnantFemale.allows(StageAction::Sexing));
        assert!(!ReproductiveStatus::Served.allows(StageAction::Sexing));
    }

    #[test]
    fn labels_are_distinct() {
        let labels: std::collections::HashSet<_> =
            ReproductiveStatus::ALL.into_iter().map(ReproductiveStatus::label).collect();
        assert_eq!(labels.len(), ReproductiveStatus::ALL.len());
        assert_eq!(ReproductiveStatus::PregnantRetouch.label(), "Pregnant (retouch)");
    }
}
