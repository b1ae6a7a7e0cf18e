//! Persisted drafts of an in-progress transfer session.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ClientId, FarmId, PackageKey, ProtocolId, ProtocolRecipientId, SessionId, TransferId,
    UnknownCode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Open,
    Closed,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => Err(UnknownCode::new("session status", other)),
        }
    }
}

/// Where the embryos of a session come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmbryoOrigin {
    /// Fresh embryos from a dispatched package.
    #[default]
    Package,
    /// Frozen stock.
    Frozen,
}

impl EmbryoOrigin {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Package => "PACKAGE",
            Self::Frozen => "FROZEN",
        }
    }
}

impl FromStr for EmbryoOrigin {
    type Err = UnknownCode;

    // Unknown origins fall back to packages, matching how old rows were written.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FROZEN" => Ok(Self::Frozen),
            _ => Ok(Self::Package),
        }
    }
}

/// Workflow parameters chosen on the first step of a transfer session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    pub origin: EmbryoOrigin,
    pub transfer_date: Option<NaiveDate>,
    pub phase2_date: Option<NaiveDate>,
    pub veterinarian: Option<String>,
    pub technician: Option<String>,
    pub client_filter: Option<ClientId>,
    pub breed_filter: Option<String>,
    /// Offer recipients that came into heat outside a protocol.
    pub include_free_heat: bool,
    /// Allow two embryos into the same recipient.
    pub allow_pairs: bool,
}

/// Everything a caller persists on each session step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDraft {
    pub farm_id: FarmId,
    pub package: Option<PackageKey>,
    pub protocol_id: Option<ProtocolId>,
    pub transfer_ids: Vec<TransferId>,
    pub protocol_recipient_ids: Vec<ProtocolRecipientId>,
    pub params: SessionParams,
}

impl SessionDraft {
    #[must_use]
    pub fn new(farm_id: FarmId) -> Self {
        Self {
            farm_id,
            package: None,
            protocol_id: None,
            transfer_ids: Vec::new(),
            protocol_recipient_ids: Vec::new(),
            params: SessionParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSession {
    pub id: SessionId,
    pub draft: SessionDraft,
    pub status: SessionStatus,
    pub updated_at: DateTime<Utc>,
}

impl TransferSession {
    #[must_use]
    pub fn farm_id(&self) -> FarmId {
        self.draft.farm_id
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}
