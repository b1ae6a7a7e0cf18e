//! Protocols and their recipient rows.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use rusqlite::{OptionalExtension, Row, Transaction, params, params_from_iter};

use reprotrack_types::{
    CyclingClass, EnrollmentDetails, FarmId, Protocol, ProtocolId, ProtocolRecipient,
    ProtocolRecipientId, ProtocolStatus, QualityTier, RecipientId, SubStatus,
};

use super::SqliteLedger;
use crate::NewProtocol;
use crate::sqlite_util::{parse_code, placeholders};

const PROTOCOL_RECIPIENT_COLUMNS: &str =
    "pr.id, pr.protocol_id, pr.recipient_id, pr.sub_status, pr.unfit_reason, pr.cycling, pr.quality, pr.notes";

fn protocol_from_row(row: &Row<'_>) -> rusqlite::Result<Protocol> {
    Ok(Protocol {
        id: ProtocolId::new(row.get(0)?),
        farm_id: FarmId::new(row.get(1)?),
        started_on: row.get(2)?,
        responsible: row.get(3)?,
        status: parse_code(4, &row.get::<_, String>(4)?)?,
        closed_on: row.get(5)?,
        closed_by: row.get(6)?,
    })
}

fn protocol_recipient_from_row(row: &Row<'_>) -> rusqlite::Result<ProtocolRecipient> {
    let cycling = row
        .get::<_, Option<String>>(5)?
        .map(|code| parse_code::<CyclingClass>(5, &code))
        .transpose()?;
    let quality = row
        .get::<_, Option<u8>>(6)?
        .map(|tier| {
            QualityTier::try_new(tier).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    6,
                    rusqlite::types::Type::Integer,
                    Box::new(e),
                )
            })
        })
        .transpose()?;

    Ok(ProtocolRecipient {
        id: ProtocolRecipientId::new(row.get(0)?),
        protocol_id: ProtocolId::new(row.get(1)?),
        recipient_id: RecipientId::new(row.get(2)?),
        sub_status: parse_code(3, &row.get::<_, String>(3)?)?,
        unfit_reason: row.get(4)?,
        details: EnrollmentDetails {
            cycling,
            quality,
            notes: row.get(7)?,
        },
    })
}

fn insert_protocol_row(tx: &Transaction<'_>, protocol: &NewProtocol) -> Result<i64> {
    tx.execute(
        "INSERT INTO protocols (farm_id, started_on, responsible, status) VALUES (?1, ?2, ?3, ?4)",
        params![
            protocol.farm_id.value(),
            protocol.started_on,
            protocol.responsible,
            protocol.status.as_str(),
        ],
    )
    .context("Failed to insert protocol")?;
    Ok(tx.last_insert_rowid())
}

fn insert_enrollment_row(
    tx: &Transaction<'_>,
    protocol: i64,
    recipient: RecipientId,
    details: &EnrollmentDetails,
) -> Result<i64> {
    tx.execute(
        "INSERT INTO protocol_recipients
            (protocol_id, recipient_id, sub_status, cycling, quality, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            protocol,
            recipient.value(),
            SubStatus::Started.as_str(),
            details.cycling.map(CyclingClass::as_str),
            details.quality.map(QualityTier::value),
            details.notes,
        ],
    )
    .with_context(|| format!("Failed to enroll recipient {recipient}"))?;
    Ok(tx.last_insert_rowid())
}

impl SqliteLedger {
    pub fn insert_protocol(&self, protocol: &NewProtocol) -> Result<ProtocolId> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start protocol transaction")?;
        let id = insert_protocol_row(&tx, protocol)?;
        tx.commit().context("Failed to commit protocol")?;
        Ok(ProtocolId::new(id))
    }

    pub fn create_protocol_atomic(
        &self,
        protocol: &NewProtocol,
        enrollments: &[(RecipientId, EnrollmentDetails)],
    ) -> Result<ProtocolId> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start protocol creation transaction")?;

        let id = insert_protocol_row(&tx, protocol)?;
        for (recipient, details) in enrollments {
            insert_enrollment_row(&tx, id, *recipient, details)?;
        }

        tx.commit()
            .context("Failed to commit protocol creation")?;
        Ok(ProtocolId::new(id))
    }

    pub fn protocol(&self, id: ProtocolId) -> Result<Option<Protocol>> {
        let db = self.conn()?;
        db.query_row(
            "SELECT id, farm_id, started_on, responsible, status, closed_on, closed_by
             FROM protocols WHERE id = ?1",
            params![id.value()],
            protocol_from_row,
        )
        .optional()
        .context("Failed to load protocol")
    }

    pub fn enroll(
        &self,
        protocol: ProtocolId,
        recipient: RecipientId,
        details: &EnrollmentDetails,
    ) -> Result<ProtocolRecipientId> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start enrollment transaction")?;
        let id = insert_enrollment_row(&tx, protocol.value(), recipient, details)?;
        tx.commit().context("Failed to commit enrollment")?;
        Ok(ProtocolRecipientId::new(id))
    }

    pub fn protocol_recipients(&self, protocol: ProtocolId) -> Result<Vec<ProtocolRecipient>> {
        let db = self.conn()?;
        let sql = format!(
            "SELECT {PROTOCOL_RECIPIENT_COLUMNS} FROM protocol_recipients pr
             WHERE pr.protocol_id = ?1 ORDER BY pr.id"
        );
        let mut stmt = db
            .prepare(&sql)
            .context("Failed to prepare protocol recipients query")?;
        let rows = stmt
            .query_map(params![protocol.value()], protocol_recipient_from_row)
            .context("Failed to query protocol recipients")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read protocol recipients")
    }

    pub fn protocol_recipient_rows(
        &self,
        ids: &[ProtocolRecipientId],
    ) -> Result<Vec<ProtocolRecipient>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let db = self.conn()?;
        let sql = format!(
            "SELECT {PROTOCOL_RECIPIENT_COLUMNS} FROM protocol_recipients pr
             WHERE pr.id IN ({}) ORDER BY pr.id",
            placeholders(ids.len())
        );
        let mut stmt = db
            .prepare(&sql)
            .context("Failed to prepare protocol row query")?;
        let rows = stmt
            .query_map(
                params_from_iter(ids.iter().map(|id| id.value())),
                protocol_recipient_from_row,
            )
            .context("Failed to query protocol rows")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read protocol rows")
    }

    pub fn open_enrollments(&self, recipients: &[RecipientId]) -> Result<Vec<ProtocolRecipient>> {
        if recipients.is_empty() {
            return Ok(Vec::new());
        }
        let db = self.conn()?;
        let sql = format!(
            "SELECT {PROTOCOL_RECIPIENT_COLUMNS} FROM protocol_recipients pr
             JOIN protocols p ON p.id = pr.protocol_id
             WHERE pr.recipient_id IN ({})
               AND pr.sub_status IN ('{}', '{}')
               AND p.status <> '{}'
             ORDER BY pr.id",
            placeholders(recipients.len()),
            SubStatus::Started.as_str(),
            SubStatus::Fit.as_str(),
            ProtocolStatus::Closed.as_str(),
        );
        let mut stmt = db
            .prepare(&sql)
            .context("Failed to prepare open enrollment query")?;
        let rows = stmt
            .query_map(
                params_from_iter(recipients.iter().map(|id| id.value())),
                protocol_recipient_from_row,
            )
            .context("Failed to query open enrollments")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read open enrollments")
    }

    pub fn set_protocol_status(&self, id: ProtocolId, status: ProtocolStatus) -> Result<()> {
        let db = self.conn()?;
        let updated = db
            .execute(
                "UPDATE protocols SET status = ?2 WHERE id = ?1",
                params![id.value(), status.as_str()],
            )
            .context("Failed to update protocol status")?;
        if updated == 0 {
            bail!("Protocol {id} not found");
        }
        Ok(())
    }

    pub fn record_phase2_close(
        &self,
        id: ProtocolId,
        status: ProtocolStatus,
        closed_on: NaiveDate,
        closed_by: &str,
    ) -> Result<()> {
        let db = self.conn()?;
        let updated = db
            .execute(
                "UPDATE protocols SET status = ?2, closed_on = ?3, closed_by = ?4 WHERE id = ?1",
                params![id.value(), status.as_str(), closed_on, closed_by],
            )
            .context("Failed to close protocol phase 2")?;
        if updated == 0 {
            bail!("Protocol {id} not found");
        }
        Ok(())
    }

    pub fn set_sub_status(
        &self,
        row: ProtocolRecipientId,
        sub_status: SubStatus,
        unfit_reason: Option<&str>,
    ) -> Result<()> {
        let db = self.conn()?;
        let updated = db
            .execute(
                "UPDATE protocol_recipients SET sub_status = ?2, unfit_reason = ?3 WHERE id = ?1",
                params![row.value(), sub_status.as_str(), unfit_reason],
            )
            .context("Failed to update protocol sub-status")?;
        if updated == 0 {
            bail!("Protocol row {row} not found");
        }
        Ok(())
    }
}
