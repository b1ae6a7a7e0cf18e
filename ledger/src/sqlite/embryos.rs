//! Fertilization batches, embryos and the embryo change log.

use anyhow::{Context, Result, bail};
use chrono::{Days, NaiveDate};
use rusqlite::{OptionalExtension, Row, Transaction, params, params_from_iter};
use std::collections::BTreeMap;

use reprotrack_types::{
    BatchId, ClientId, Disposition, Embryo, EmbryoHistoryEntry, EmbryoId, EmbryoOperation,
    FarmId, FertilizationBatch, Grade,
};

use super::SqliteLedger;
use crate::sqlite_util::{parse_code, placeholders};
use crate::{EmbryoAssignment, NewBatch, NewEmbryo};

const EMBRYO_COLUMNS: &str =
    "id, batch_id, dispatched_on, disposition, grade, destination_farm_id, client_id, location";

fn embryo_from_row(row: &Row<'_>) -> rusqlite::Result<Embryo> {
    let grade = row
        .get::<_, Option<String>>(4)?
        .map(|code| parse_code::<Grade>(4, &code))
        .transpose()?;
    Ok(Embryo {
        id: EmbryoId::new(row.get(0)?),
        batch_id: BatchId::new(row.get(1)?),
        dispatched_on: row.get(2)?,
        disposition: parse_code(3, &row.get::<_, String>(3)?)?,
        grade,
        destination_farm_id: row.get::<_, Option<i64>>(5)?.map(FarmId::new),
        client_id: row.get::<_, Option<i64>>(6)?.map(ClientId::new),
        location: row.get(7)?,
    })
}

pub(super) fn append_embryo_history(
    tx: &Transaction<'_>,
    embryo: EmbryoId,
    operation: EmbryoOperation,
    old_value: Option<&str>,
    new_value: Option<&str>,
    on: NaiveDate,
    notes: Option<&str>,
) -> Result<()> {
    tx.execute(
        "INSERT INTO embryo_history (embryo_id, operation, old_value, new_value, recorded_on, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![embryo.value(), operation.as_str(), old_value, new_value, on, notes],
    )
    .with_context(|| format!("Failed to append history for embryo {embryo}"))?;
    Ok(())
}

fn load_embryo(tx: &Transaction<'_>, id: EmbryoId) -> Result<Embryo> {
    let sql = format!("SELECT {EMBRYO_COLUMNS} FROM embryos WHERE id = ?1");
    let embryo = tx
        .query_row(&sql, params![id.value()], embryo_from_row)
        .optional()
        .context("Failed to load embryo")?;
    match embryo {
        Some(embryo) => Ok(embryo),
        None => bail!("Embryo {id} not found"),
    }
}

fn set_disposition(tx: &Transaction<'_>, id: EmbryoId, disposition: Disposition) -> Result<()> {
    tx.execute(
        "UPDATE embryos SET disposition = ?2 WHERE id = ?1",
        params![id.value(), disposition.as_str()],
    )
    .context("Failed to update embryo disposition")?;
    Ok(())
}

impl SqliteLedger {
    pub fn insert_batch(&self, batch: &NewBatch) -> Result<BatchId> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start batch transaction")?;

        tx.execute(
            "INSERT INTO batches (fertilized_on, eligible_for_transfer) VALUES (?1, ?2)",
            params![batch.fertilized_on, batch.eligible_for_transfer],
        )
        .context("Failed to insert batch")?;
        let id = tx.last_insert_rowid();

        for farm in &batch.destination_farm_ids {
            tx.execute(
                "INSERT OR IGNORE INTO batch_destinations (batch_id, farm_id) VALUES (?1, ?2)",
                params![id, farm.value()],
            )
            .context("Failed to insert batch destination")?;
        }

        tx.commit().context("Failed to commit batch")?;
        Ok(BatchId::new(id))
    }

    pub fn batches(&self, ids: &[BatchId]) -> Result<Vec<FertilizationBatch>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let db = self.conn()?;
        let list = placeholders(ids.len());

        let mut destinations: BTreeMap<i64, Vec<FarmId>> = BTreeMap::new();
        {
            let sql = format!(
                "SELECT batch_id, farm_id FROM batch_destinations
                 WHERE batch_id IN ({list}) ORDER BY batch_id, farm_id"
            );
            let mut stmt = db
                .prepare(&sql)
                .context("Failed to prepare batch destination query")?;
            let rows = stmt
                .query_map(params_from_iter(ids.iter().map(|id| id.value())), |row| {
                    Ok((row.get::<_, i64>(0)?, FarmId::new(row.get(1)?)))
                })
                .context("Failed to query batch destinations")?;
            for row in rows {
                let (batch, farm) = row.context("Failed to read batch destination")?;
                destinations.entry(batch).or_default().push(farm);
            }
        }

        let sql = format!(
            "SELECT id, fertilized_on, eligible_for_transfer FROM batches
             WHERE id IN ({list}) ORDER BY id"
        );
        let mut stmt = db.prepare(&sql).context("Failed to prepare batch query")?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter().map(|id| id.value())), |row| {
                let id: i64 = row.get(0)?;
                Ok(FertilizationBatch {
                    id: BatchId::new(id),
                    fertilized_on: row.get(1)?,
                    eligible_for_transfer: row.get(2)?,
                    destination_farm_ids: destinations.get(&id).cloned().unwrap_or_default(),
                })
            })
            .context("Failed to query batches")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read batches")
    }

    pub fn set_batch_eligibility(&self, id: BatchId, eligible: bool) -> Result<()> {
        let db = self.conn()?;
        let updated = db
            .execute(
                "UPDATE batches SET eligible_for_transfer = ?2 WHERE id = ?1",
                params![id.value(), eligible],
            )
            .context("Failed to update batch eligibility")?;
        if updated == 0 {
            bail!("Batch {id} not found");
        }
        Ok(())
    }

    pub fn insert_embryo(&self, embryo: &NewEmbryo) -> Result<EmbryoId> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO embryos (batch_id, dispatched_on, disposition, grade, destination_farm_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                embryo.batch_id.value(),
                embryo.dispatched_on,
                embryo.disposition.as_str(),
                embryo.grade.map(Grade::as_str),
                embryo.destination_farm_id.map(FarmId::value),
            ],
        )
        .context("Failed to insert embryo")?;
        Ok(EmbryoId::new(db.last_insert_rowid()))
    }

    pub fn embryo(&self, id: EmbryoId) -> Result<Option<Embryo>> {
        let db = self.conn()?;
        let sql = format!("SELECT {EMBRYO_COLUMNS} FROM embryos WHERE id = ?1");
        db.query_row(&sql, params![id.value()], embryo_from_row)
            .optional()
            .context("Failed to load embryo")
    }

    pub fn stock_embryos(&self) -> Result<Vec<Embryo>> {
        let db = self.conn()?;
        let sql = format!(
            "SELECT {EMBRYO_COLUMNS} FROM embryos
             WHERE disposition <> '{}' AND client_id IS NULL
             ORDER BY id",
            Disposition::Discarded.as_str()
        );
        let mut stmt = db
            .prepare(&sql)
            .context("Failed to prepare stock query")?;
        let rows = stmt
            .query_map([], embryo_from_row)
            .context("Failed to query stock embryos")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read stock embryos")
    }

    pub fn classify_embryo(
        &self,
        id: EmbryoId,
        grade: Option<Grade>,
        on: NaiveDate,
    ) -> Result<Option<Grade>> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start classification transaction")?;

        let previous = load_embryo(&tx, id)?.grade;
        tx.execute(
            "UPDATE embryos SET grade = ?2 WHERE id = ?1",
            params![id.value(), grade.map(Grade::as_str)],
        )
        .context("Failed to update embryo grade")?;
        append_embryo_history(
            &tx,
            id,
            EmbryoOperation::Classification,
            previous.map(Grade::as_str),
            grade.map(Grade::as_str),
            on,
            None,
        )?;

        tx.commit().context("Failed to commit classification")?;
        Ok(previous)
    }

    pub fn freeze_embryo(&self, id: EmbryoId, location: &str, on: NaiveDate) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start freeze transaction")?;

        let embryo = load_embryo(&tx, id)?;
        if embryo.disposition != Disposition::Fresh {
            bail!("Embryo {id} cannot be frozen: it is {}", embryo.disposition);
        }
        set_disposition(&tx, id, Disposition::Frozen)?;
        tx.execute(
            "UPDATE embryos SET location = ?2 WHERE id = ?1",
            params![id.value(), location],
        )
        .context("Failed to set embryo location")?;
        append_embryo_history(
            &tx,
            id,
            EmbryoOperation::Freeze,
            Some(embryo.disposition.as_str()),
            Some(location),
            on,
            None,
        )?;

        tx.commit().context("Failed to commit freeze")?;
        Ok(())
    }

    pub fn discard_embryo(&self, id: EmbryoId, on: NaiveDate, notes: Option<&str>) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start discard transaction")?;

        let embryo = load_embryo(&tx, id)?;
        if embryo.disposition.is_terminal() {
            bail!("Embryo {id} cannot be discarded: it is {}", embryo.disposition);
        }
        set_disposition(&tx, id, Disposition::Discarded)?;
        append_embryo_history(
            &tx,
            id,
            EmbryoOperation::Discard,
            Some(embryo.disposition.as_str()),
            Some(Disposition::Discarded.as_str()),
            on,
            notes,
        )?;

        tx.commit().context("Failed to commit discard")?;
        Ok(())
    }

    pub fn assign_embryo(
        &self,
        id: EmbryoId,
        assignment: EmbryoAssignment,
        on: NaiveDate,
    ) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start assignment transaction")?;

        let embryo = load_embryo(&tx, id)?;
        tx.execute(
            "UPDATE embryos SET client_id = ?2, destination_farm_id = ?3 WHERE id = ?1",
            params![
                id.value(),
                assignment.client_id.map(ClientId::value),
                assignment.farm_id.map(FarmId::value),
            ],
        )
        .context("Failed to update embryo destination")?;
        append_embryo_history(
            &tx,
            id,
            EmbryoOperation::Destination,
            Some(&describe_destination(embryo.client_id, embryo.destination_farm_id)),
            Some(&describe_destination(assignment.client_id, assignment.farm_id)),
            on,
            None,
        )?;

        tx.commit().context("Failed to commit assignment")?;
        Ok(())
    }

    pub fn embryo_history(&self, id: EmbryoId) -> Result<Vec<EmbryoHistoryEntry>> {
        let db = self.conn()?;
        let mut stmt = db
            .prepare(
                "SELECT embryo_id, operation, old_value, new_value, recorded_on, notes
                 FROM embryo_history WHERE embryo_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare embryo history query")?;
        let rows = stmt
            .query_map(params![id.value()], |row| {
                Ok(EmbryoHistoryEntry {
                    embryo_id: EmbryoId::new(row.get(0)?),
                    operation: parse_code(1, &row.get::<_, String>(1)?)?,
                    old_value: row.get(2)?,
                    new_value: row.get(3)?,
                    recorded_on: row.get(4)?,
                    notes: row.get(5)?,
                })
            })
            .context("Failed to query embryo history")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read embryo history")
    }

    pub fn expire_overdue_embryos(
        &self,
        today: NaiveDate,
        shelf_life_days: u32,
    ) -> Result<Vec<EmbryoId>> {
        let Some(cutoff) = today.checked_sub_days(Days::new(u64::from(shelf_life_days))) else {
            return Ok(Vec::new());
        };

        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start expiry transaction")?;

        let overdue = {
            let mut stmt = tx
                .prepare(
                    "SELECT e.id FROM embryos e
                     JOIN batches b ON b.id = e.batch_id
                     WHERE e.disposition = ?1 AND b.fertilized_on < ?2
                     ORDER BY e.id",
                )
                .context("Failed to prepare expiry query")?;
            let rows = stmt
                .query_map(params![Disposition::Fresh.as_str(), cutoff], |row| {
                    row.get::<_, i64>(0).map(EmbryoId::new)
                })
                .context("Failed to query overdue embryos")?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read overdue embryos")?
        };

        let note = format!("shelf life of {shelf_life_days} days exceeded");
        for id in &overdue {
            set_disposition(&tx, *id, Disposition::Discarded)?;
            append_embryo_history(
                &tx,
                *id,
                EmbryoOperation::Discard,
                Some(Disposition::Fresh.as_str()),
                Some(Disposition::Discarded.as_str()),
                today,
                Some(&note),
            )?;
        }

        tx.commit().context("Failed to commit embryo expiry")?;
        if !overdue.is_empty() {
            tracing::info!(count = overdue.len(), %today, "Discarded overdue fresh embryos");
        }
        Ok(overdue)
    }
}

fn describe_destination(client: Option<ClientId>, farm: Option<FarmId>) -> String {
    match (client, farm) {
        (Some(client), Some(farm)) => format!("client {client} / farm {farm}"),
        (Some(client), None) => format!("client {client}"),
        (None, Some(farm)) => format!("farm {farm}"),
        (None, None) => "unassigned".to_string(),
    }
}
