//! Shared test utilities and fixtures
//!
//! Every scenario runs against a fresh in-memory ledger.

#![allow(dead_code)]

use chrono::NaiveDate;

use reprotrack_core::{CoreSettings, HeaderInput, Phase1Draft, Phase2Review, Reprotrack};
use reprotrack_ledger::{NewBatch, NewEmbryo, NewRecipient, SqliteLedger};
use reprotrack_types::{
    BatchId, Disposition, EmbryoId, EnrollmentDetails, FarmId, Grade, ProtocolId, RecipientId,
    Verdict,
};

pub type Core = Reprotrack<SqliteLedger>;

pub fn core() -> Core {
    Reprotrack::new(
        SqliteLedger::open_in_memory().expect("open ledger"),
        CoreSettings::default(),
    )
}

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, month, day).expect("valid date")
}

pub fn farm(core: &Core, name: &str) -> FarmId {
    core.ledger().insert_farm(name).expect("insert farm")
}

pub fn cow(core: &Core, farm: FarmId, tag: &str, name: Option<&str>) -> RecipientId {
    core.ledger()
        .insert_recipient(&NewRecipient {
            ear_tag: tag.to_string(),
            name: name.map(ToString::to_string),
            farm_id: farm,
            since: date(1, 1),
        })
        .expect("insert recipient")
}

pub fn header(farm: FarmId, started_on: NaiveDate) -> HeaderInput {
    HeaderInput {
        farm_id: Some(farm),
        started_on: Some(started_on),
        responsible: Some("Dr. Lima".to_string()),
    }
}

/// Runs a full protocol: wizard commit, one verdict per recipient, phase-2 close.
pub async fn run_protocol(
    core: &Core,
    farm: FarmId,
    verdicts: &[(RecipientId, Verdict)],
) -> ProtocolId {
    let mut draft = Phase1Draft::new(header(farm, date(2, 1)));
    for (recipient, _) in verdicts {
        draft
            .add(*recipient, EnrollmentDetails::default())
            .expect("add candidate");
    }
    let protocol = core
        .protocols
        .commit_phase1(&draft)
        .await
        .expect("commit phase 1");

    let mut review = Phase2Review::new(protocol.id);
    for (recipient, verdict) in verdicts {
        review.set(*recipient, verdict.clone());
    }
    core.protocols
        .submit_phase2(&review, Some(date(2, 10)), Some("Dr. Lima"))
        .await
        .expect("close phase 2");
    protocol.id
}

pub fn batch(core: &Core, fertilized_on: NaiveDate, eligible: bool, farms: &[FarmId]) -> BatchId {
    core.ledger()
        .insert_batch(&NewBatch {
            fertilized_on,
            eligible_for_transfer: eligible,
            destination_farm_ids: farms.to_vec(),
        })
        .expect("insert batch")
}

pub fn embryo(
    core: &Core,
    batch: BatchId,
    dispatched_on: NaiveDate,
    grade: Option<Grade>,
) -> EmbryoId {
    core.ledger()
        .insert_embryo(&NewEmbryo {
            batch_id: batch,
            dispatched_on,
            disposition: Disposition::Fresh,
            grade,
            destination_farm_id: None,
        })
        .expect("insert embryo")
}
