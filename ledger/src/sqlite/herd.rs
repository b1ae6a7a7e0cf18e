//! Farms, recipients, farm residency, renames and the status audit log.

use anyhow::{Context, Result, bail};
use rusqlite::{OptionalExtension, Row, params};

use reprotrack_types::{
    Farm, FarmHistoryEntry, FarmId, Recipient, RecipientId, RenameRecord, StatusHistoryEntry,
};

use super::SqliteLedger;
use crate::sqlite_util::parse_code;
use crate::{FarmMove, NewRecipient};

fn recipient_from_row(row: &Row<'_>) -> rusqlite::Result<Recipient> {
    Ok(Recipient {
        id: RecipientId::new(row.get(0)?),
        ear_tag: row.get(1)?,
        name: row.get(2)?,
    })
}

impl SqliteLedger {
    pub fn insert_farm(&self, name: &str) -> Result<FarmId> {
        let db = self.conn()?;
        db.execute("INSERT INTO farms (name) VALUES (?1)", params![name])
            .context("Failed to insert farm")?;
        Ok(FarmId::new(db.last_insert_rowid()))
    }

    pub fn farm(&self, id: FarmId) -> Result<Option<Farm>> {
        let db = self.conn()?;
        db.query_row(
            "SELECT id, name FROM farms WHERE id = ?1",
            params![id.value()],
            |row| {
                Ok(Farm {
                    id: FarmId::new(row.get(0)?),
                    name: row.get(1)?,
                })
            },
        )
        .optional()
        .context("Failed to load farm")
    }

    pub fn insert_recipient(&self, recipient: &NewRecipient) -> Result<RecipientId> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start recipient transaction")?;

        tx.execute(
            "INSERT INTO recipients (ear_tag, name) VALUES (?1, ?2)",
            params![recipient.ear_tag, recipient.name],
        )
        .context("Failed to insert recipient")?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO farm_history (recipient_id, farm_id, started_on) VALUES (?1, ?2, ?3)",
            params![id, recipient.farm_id.value(), recipient.since],
        )
        .context("Failed to insert initial farm history")?;

        tx.commit()
            .context("Failed to commit recipient transaction")?;
        Ok(RecipientId::new(id))
    }

    pub fn recipient(&self, id: RecipientId) -> Result<Option<Recipient>> {
        let db = self.conn()?;
        db.query_row(
            "SELECT id, ear_tag, name FROM recipients WHERE id = ?1",
            params![id.value()],
            recipient_from_row,
        )
        .optional()
        .context("Failed to load recipient")
    }

    pub fn active_farm(&self, id: RecipientId) -> Result<Option<FarmId>> {
        let db = self.conn()?;
        db.query_row(
            "SELECT farm_id FROM farm_history WHERE recipient_id = ?1 AND ended_on IS NULL",
            params![id.value()],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map(|farm| farm.map(FarmId::new))
        .context("Failed to load active farm")
    }

    pub fn active_residents(&self, farm: FarmId) -> Result<Vec<Recipient>> {
        let db = self.conn()?;
        let mut stmt = db
            .prepare(
                "SELECT r.id, r.ear_tag, r.name
                 FROM recipients r
                 JOIN farm_history h ON h.recipient_id = r.id
                 WHERE h.farm_id = ?1 AND h.ended_on IS NULL
                 ORDER BY r.id",
            )
            .context("Failed to prepare resident query")?;
        let rows = stmt
            .query_map(params![farm.value()], recipient_from_row)
            .context("Failed to query residents")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read residents")
    }

    pub fn farm_history(&self, id: RecipientId) -> Result<Vec<FarmHistoryEntry>> {
        let db = self.conn()?;
        let mut stmt = db
            .prepare(
                "SELECT recipient_id, farm_id, started_on, ended_on, notes
                 FROM farm_history WHERE recipient_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare farm history query")?;
        let rows = stmt
            .query_map(params![id.value()], |row| {
                Ok(FarmHistoryEntry {
                    recipient_id: RecipientId::new(row.get(0)?),
                    farm_id: FarmId::new(row.get(1)?),
                    started_on: row.get(2)?,
                    ended_on: row.get(3)?,
                    notes: row.get(4)?,
                })
            })
            .context("Failed to query farm history")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read farm history")
    }

    pub fn rename_recipient(&self, rename: &RenameRecord) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start rename transaction")?;

        let updated = tx
            .execute(
                "UPDATE recipients SET ear_tag = ?2 WHERE id = ?1",
                params![rename.recipient_id.value(), rename.new_tag],
            )
            .context("Failed to update ear tag")?;
        if updated == 0 {
            bail!("Cannot rename: recipient {} not found", rename.recipient_id);
        }

        tx.execute(
            "INSERT INTO rename_history (recipient_id, old_tag, new_tag, renamed_on, reason, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rename.recipient_id.value(),
                rename.old_tag,
                rename.new_tag,
                rename.renamed_on,
                rename.reason.as_str(),
                rename.notes,
            ],
        )
        .context("Failed to insert rename record")?;

        tx.commit().context("Failed to commit rename")?;
        Ok(())
    }

    pub fn rename_history(&self, id: RecipientId) -> Result<Vec<RenameRecord>> {
        let db = self.conn()?;
        let mut stmt = db
            .prepare(
                "SELECT recipient_id, old_tag, new_tag, renamed_on, reason, notes
                 FROM rename_history WHERE recipient_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare rename history query")?;
        let rows = stmt
            .query_map(params![id.value()], |row| {
                Ok(RenameRecord {
                    recipient_id: RecipientId::new(row.get(0)?),
                    old_tag: row.get(1)?,
                    new_tag: row.get(2)?,
                    renamed_on: row.get(3)?,
                    reason: parse_code(4, &row.get::<_, String>(4)?)?,
                    notes: row.get(5)?,
                })
            })
            .context("Failed to query rename history")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read rename history")
    }

    pub fn move_recipient(&self, request: &FarmMove) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start farm move transaction")?;

        let closed = tx
            .execute(
                "UPDATE farm_history SET ended_on = ?2
                 WHERE recipient_id = ?1 AND ended_on IS NULL",
                params![request.recipient_id.value(), request.moved_on],
            )
            .context("Failed to close active farm history")?;
        if closed != 1 {
            bail!(
                "Cannot move recipient {}: expected one active farm row, found {closed}",
                request.recipient_id
            );
        }

        tx.execute(
            "INSERT INTO farm_history (recipient_id, farm_id, started_on, notes)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                request.recipient_id.value(),
                request.target_farm_id.value(),
                request.moved_on,
                request.notes,
            ],
        )
        .context("Failed to open farm history on target farm")?;

        tx.commit().context("Failed to commit farm move")?;
        Ok(())
    }

    pub fn append_status_history(&self, entry: &StatusHistoryEntry) -> Result<()> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO status_history (recipient_id, status, recorded_on, source)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.recipient_id.value(),
                entry.status.as_str(),
                entry.recorded_on,
                entry.source,
            ],
        )
        .context("Failed to append status history")?;
        Ok(())
    }

    pub fn status_history(&self, id: RecipientId) -> Result<Vec<StatusHistoryEntry>> {
        let db = self.conn()?;
        let mut stmt = db
            .prepare(
                "SELECT recipient_id, status, recorded_on, source
                 FROM status_history WHERE recipient_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare status history query")?;
        let rows = stmt
            .query_map(params![id.value()], |row| {
                Ok(StatusHistoryEntry {
                    recipient_id: RecipientId::new(row.get(0)?),
                    status: parse_code(1, &row.get::<_, String>(1)?)?,
                    recorded_on: row.get(2)?,
                    source: row.get(3)?,
                })
            })
            .context("Failed to query status history")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read status history")
    }
}
