//! Reproduction tracking core.
//!
//! Services over a [`Ledger`]: derived recipient status, the two-phase
//! protocol workflow, farm moves with tag conflict resolution, embryo
//! packages and grading, transfer sessions, gestation stages and the daily
//! embryo expiry. [`Reprotrack`] wires them to one shared ledger and one
//! in-flight token registry.

mod classification;
pub mod errors;
mod farm_transfer;
mod gestation;
mod guard;
mod maintenance;
mod packages;
mod protocol;
#[cfg(test)]
mod refusing_ledger;
mod settings;
pub mod status;
mod transfer_session;

use std::sync::Arc;

use anyhow::Context;

use reprotrack_config::ReprotrackConfig;
use reprotrack_ledger::{Ledger, SqliteLedger};

pub use classification::{EmbryoService, StagedClassifications};
pub use errors::{CoreError, CoreResult, ErrorKind, ItemOutcome};
pub use farm_transfer::{FarmTransferResolver, MoveOutcome, MovePlan, generate_unique_tag};
pub use gestation::{GESTATION_DAYS, GestationService, expected_calving};
pub use guard::{InFlightToken, OperationGuards, OperationKind};
pub use maintenance::DailyMaintenance;
pub use packages::{EmbryoPackageAggregator, aggregate, verify};
pub use protocol::{HeaderInput, Phase1Draft, Phase2Report, Phase2Review, ProtocolService};
pub use settings::CoreSettings;
pub use status::StatusResolver;
pub use transfer_session::{TransferRequest, TransferSessionManager};

/// Every service, sharing one ledger and one guard registry.
pub struct Reprotrack<L> {
    ledger: Arc<L>,
    pub status: StatusResolver<L>,
    pub protocols: ProtocolService<L>,
    pub farms: FarmTransferResolver<L>,
    pub packages: EmbryoPackageAggregator<L>,
    pub embryos: EmbryoService<L>,
    pub sessions: TransferSessionManager<L>,
    pub gestation: GestationService<L>,
    pub maintenance: DailyMaintenance<L>,
}

impl<L: Ledger> Reprotrack<L> {
    pub fn new(ledger: L, settings: CoreSettings) -> Self {
        let ledger = Arc::new(ledger);
        let guards = OperationGuards::new();
        Self {
            status: StatusResolver::new(Arc::clone(&ledger)),
            protocols: ProtocolService::new(Arc::clone(&ledger), guards.clone()),
            farms: FarmTransferResolver::new(
                Arc::clone(&ledger),
                guards.clone(),
                settings.tag_probe_attempts,
            ),
            packages: EmbryoPackageAggregator::new(Arc::clone(&ledger)),
            embryos: EmbryoService::new(Arc::clone(&ledger), guards.clone()),
            sessions: TransferSessionManager::new(
                Arc::clone(&ledger),
                guards.clone(),
                settings.auto_restore_session,
            ),
            gestation: GestationService::new(Arc::clone(&ledger), guards),
            maintenance: DailyMaintenance::new(Arc::clone(&ledger), &settings),
            ledger,
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}

impl Reprotrack<SqliteLedger> {
    /// Opens the configured SQLite ledger.
    pub fn open(config: &ReprotrackConfig) -> anyhow::Result<Self> {
        let path = config
            .ledger_path()
            .context("No ledger path configured and no home directory found")?;
        let ledger = SqliteLedger::open_with(&path, config.busy_timeout())
            .with_context(|| format!("Failed to open ledger at {}", path.display()))?;
        tracing::info!(path = %path.display(), "Opened ledger");
        Ok(Self::new(ledger, CoreSettings::from(config)))
    }
}
