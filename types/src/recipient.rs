//! Recipients, their farm residency, and the append-only rename log.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{FarmId, RecipientId, ReproductiveStatus, UnknownCode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Farm {
    pub id: FarmId,
    pub name: String,
}

/// A recipient cow. The current farm is not a field: it is the farm of the
/// single open [`FarmHistoryEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub ear_tag: String,
    pub name: Option<String>,
}

impl Recipient {
    /// The name, if it carries anything besides whitespace.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmHistoryEntry {
    pub recipient_id: RecipientId,
    pub farm_id: FarmId,
    pub started_on: NaiveDate,
    /// `None` while the recipient still lives on this farm.
    pub ended_on: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl FarmHistoryEntry {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ended_on.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenameReason {
    FarmChange,
    Manual,
}

impl RenameReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FarmChange => "FARM_CHANGE",
            Self::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for RenameReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenameReason {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FARM_CHANGE" => Ok(Self::FarmChange),
            "MANUAL" => Ok(Self::Manual),
            other => Err(UnknownCode::new("rename reason", other)),
        }
    }
}

/// One ear-tag change. Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRecord {
    pub recipient_id: RecipientId,
    pub old_tag: String,
    pub new_tag: String,
    pub renamed_on: NaiveDate,
    pub reason: RenameReason,
    pub notes: Option<String>,
}

/// A denormalized status write, kept as an audit trail only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub recipient_id: RecipientId,
    pub status: ReproductiveStatus,
    pub recorded_on: NaiveDate,
    pub source: String,
}
