//! Embryos, fertilization batches and the derived package view.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{BatchId, ClientId, EmbryoId, FarmId, UnknownCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    Fresh,
    Frozen,
    Discarded,
    Transferred,
}

impl Disposition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "FRESH",
            Self::Frozen => "FROZEN",
            Self::Discarded => "DISCARDED",
            Self::Transferred => "TRANSFERRED",
        }
    }

    /// Transferred and discarded embryos take no further action.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Discarded | Self::Transferred)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Disposition {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FRESH" => Ok(Self::Fresh),
            "FROZEN" => Ok(Self::Frozen),
            "DISCARDED" => Ok(Self::Discarded),
            "TRANSFERRED" => Ok(Self::Transferred),
            other => Err(UnknownCode::new("embryo disposition", other)),
        }
    }
}

/// Morphological grade assigned at classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    /// Expanded blastocyst.
    BE,
    /// Blastocyst.
    BN,
    /// Degenerating blastocyst.
    BX,
    /// Early blastocyst.
    BL,
    /// Hatched blastocyst.
    BI,
}

impl Grade {
    pub const ALL: [Self; 5] = [Self::BE, Self::BN, Self::BX, Self::BL, Self::BI];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BE => "BE",
            Self::BN => "BN",
            Self::BX => "BX",
            Self::BL => "BL",
            Self::BI => "BI",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Self::ALL
            .into_iter()
            .find(|grade| grade.as_str().eq_ignore_ascii_case(code))
            .ok_or_else(|| UnknownCode::new("embryo grade", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embryo {
    pub id: EmbryoId,
    pub batch_id: BatchId,
    pub dispatched_on: NaiveDate,
    pub disposition: Disposition,
    pub grade: Option<Grade>,
    pub destination_farm_id: Option<FarmId>,
    pub client_id: Option<ClientId>,
    /// Storage location (tank/canister) once frozen.
    pub location: Option<String>,
}

impl Embryo {
    /// Embryos that still belong to the lab's transferable stock.
    #[must_use]
    pub fn in_stock(&self) -> bool {
        self.disposition != Disposition::Discarded && self.client_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FertilizationBatch {
    pub id: BatchId,
    pub fertilized_on: NaiveDate,
    /// Set upstream once the batch has been released for transfer.
    pub eligible_for_transfer: bool,
    pub destination_farm_ids: Vec<FarmId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmbryoOperation {
    Classification,
    Freeze,
    Discard,
    Destination,
    Transfer,
}

impl EmbryoOperation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Classification => "CLASSIFICATION",
            Self::Freeze => "FREEZE",
            Self::Discard => "DISCARD",
            Self::Destination => "DESTINATION",
            Self::Transfer => "TRANSFER",
        }
    }
}

impl FromStr for EmbryoOperation {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLASSIFICATION" => Ok(Self::Classification),
            "FREEZE" => Ok(Self::Freeze),
            "DISCARD" => Ok(Self::Discard),
            "DESTINATION" => Ok(Self::Destination),
            "TRANSFER" => Ok(Self::Transfer),
            other => Err(UnknownCode::new("embryo operation", other)),
        }
    }
}

/// Immutable change-log row for one embryo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbryoHistoryEntry {
    pub embryo_id: EmbryoId,
    pub operation: EmbryoOperation,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub recorded_on: NaiveDate,
    pub notes: Option<String>,
}

// ── Packages ─────────────────────────────────────────────────

/// Embryos leaving the lab from one batch on one day form a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageKey {
    pub batch_id: BatchId,
    pub dispatched_on: NaiveDate,
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.batch_id, self.dispatched_on)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionCounts {
    pub fresh: u32,
    pub frozen: u32,
    pub discarded: u32,
    pub transferred: u32,
}

impl DispositionCounts {
    pub fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Fresh => self.fresh += 1,
            Disposition::Frozen => self.frozen += 1,
            Disposition::Discarded => self.discarded += 1,
            Disposition::Transferred => self.transferred += 1,
        }
    }

    #[must_use]
    pub const fn sum(&self) -> u32 {
        self.fresh + self.frozen + self.discarded + self.transferred
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeCounts {
    pub be: u32,
    pub bn: u32,
    pub bx: u32,
    pub bl: u32,
    pub bi: u32,
}

impl GradeCounts {
    pub fn record(&mut self, grade: Grade) {
        match grade {
            Grade::BE => self.be += 1,
            Grade::BN => self.bn += 1,
            Grade::BX => self.bx += 1,
            Grade::BL => self.bl += 1,
            Grade::BI => self.bi += 1,
        }
    }

    #[must_use]
    pub const fn get(&self, grade: Grade) -> u32 {
        match grade {
            Grade::BE => self.be,
            Grade::BN => self.bn,
            Grade::BX => self.bx,
            Grade::BL => self.bl,
            Grade::BI => self.bi,
        }
    }

    #[must_use]
    pub const fn sum(&self) -> u32 {
        self.be + self.bn + self.bx + self.bl + self.bi
    }
}

/// Derived view over the in-stock embryos of one [`PackageKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbryoPackage {
    pub key: PackageKey,
    pub total: u32,
    pub dispositions: DispositionCounts,
    pub unclassified: u32,
    pub grades: GradeCounts,
    pub all_classified: bool,
    pub eligible_for_transfer: bool,
    pub destination_farm_ids: BTreeSet<FarmId>,
}

impl EmbryoPackage {
    #[must_use]
    pub const fn classified(&self) -> u32 {
        self.total.saturating_sub(self.unclassified)
    }

    /// Whether the package ships to `farm`, either directly or via its batch.
    #[must_use]
    pub fn serves_farm(&self, farm: FarmId) -> bool {
        self.destination_farm_ids.contains(&farm)
    }
}
