//! Transfers, diagnoses, calvings, and the canonical per-recipient stream.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use rusqlite::{Connection, params, params_from_iter};

use reprotrack_types::{
    CalvingEvent, Diagnosis, DiagnosisId, DiagnosisResult, Disposition, EmbryoId,
    EmbryoOperation, EventKind, ProtocolId, ProtocolRecipientId, ProtocolStatus, RecipientEvent,
    RecipientId, SubStatus, TransferEvent, TransferId, TransferOutcome,
};

use super::SqliteLedger;
use super::embryos::append_embryo_history;
use crate::sqlite_util::{parse_code, placeholders};
use crate::{NewDiagnosis, NewTransfer};

impl SqliteLedger {
    pub fn record_transfer(&self, transfer: &NewTransfer) -> Result<TransferId> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start transfer transaction")?;

        tx.execute(
            "INSERT INTO transfers
                (recipient_id, embryo_id, protocol_recipient_id, performed_on, outcome,
                 veterinarian, technician)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                transfer.recipient_id.value(),
                transfer.embryo_id.value(),
                transfer.protocol_recipient_id.map(ProtocolRecipientId::value),
                transfer.performed_on,
                transfer.outcome.as_str(),
                transfer.veterinarian,
                transfer.technician,
            ],
        )
        .context("Failed to insert transfer")?;
        let id = tx.last_insert_rowid();

        if transfer.outcome == TransferOutcome::Performed {
            if let Some(row) = transfer.protocol_recipient_id {
                tx.execute(
                    "UPDATE protocol_recipients SET sub_status = ?2 WHERE id = ?1",
                    params![row.value(), SubStatus::Used.as_str()],
                )
                .context("Failed to mark protocol row used")?;
            }

            let previous: String = tx
                .query_row(
                    "SELECT disposition FROM embryos WHERE id = ?1",
                    params![transfer.embryo_id.value()],
                    |row| row.get(0),
                )
                .with_context(|| format!("Embryo {} not found", transfer.embryo_id))?;
            let previous: Disposition = parse_code(0, &previous)?;
            if previous.is_terminal() {
                bail!(
                    "Embryo {} cannot be transferred: already {previous}",
                    transfer.embryo_id
                );
            }

            tx.execute(
                "UPDATE embryos SET disposition = ?2 WHERE id = ?1",
                params![transfer.embryo_id.value(), Disposition::Transferred.as_str()],
            )
            .context("Failed to mark embryo transferred")?;
            append_embryo_history(
                &tx,
                transfer.embryo_id,
                EmbryoOperation::Transfer,
                Some(previous.as_str()),
                Some(&format!("recipient {}", transfer.recipient_id)),
                transfer.performed_on,
                None,
            )?;
        }

        tx.commit().context("Failed to commit transfer")?;
        tracing::debug!(transfer = id, recipient = %transfer.recipient_id, "Recorded transfer");
        Ok(TransferId::new(id))
    }

    pub fn transfers(&self, id: RecipientId) -> Result<Vec<TransferEvent>> {
        let db = self.conn()?;
        let mut stmt = db
            .prepare(
                "SELECT id, recipient_id, embryo_id, protocol_recipient_id, performed_on, outcome
                 FROM transfers WHERE recipient_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare transfer query")?;
        let rows = stmt
            .query_map(params![id.value()], |row| {
                Ok(TransferEvent {
                    id: TransferId::new(row.get(0)?),
                    recipient_id: RecipientId::new(row.get(1)?),
                    embryo_id: EmbryoId::new(row.get(2)?),
                    protocol_recipient_id: row
                        .get::<_, Option<i64>>(3)?
                        .map(ProtocolRecipientId::new),
                    performed_on: row.get(4)?,
                    outcome: parse_code(5, &row.get::<_, String>(5)?)?,
                })
            })
            .context("Failed to query transfers")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read transfers")
    }

    pub fn record_diagnosis(&self, diagnosis: &NewDiagnosis) -> Result<DiagnosisId> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO diagnoses (recipient_id, diagnosed_on, kind, result, fetus_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                diagnosis.recipient_id.value(),
                diagnosis.diagnosed_on,
                diagnosis.result.kind().as_str(),
                diagnosis.result.code(),
                diagnosis.fetus_count,
            ],
        )
        .context("Failed to insert diagnosis")?;
        Ok(DiagnosisId::new(db.last_insert_rowid()))
    }

    pub fn diagnoses(&self, id: RecipientId) -> Result<Vec<Diagnosis>> {
        let db = self.conn()?;
        let mut stmt = db
            .prepare(
                "SELECT id, recipient_id, diagnosed_on, kind, result, fetus_count
                 FROM diagnoses WHERE recipient_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare diagnosis query")?;
        let rows = stmt
            .query_map(params![id.value()], |row| {
                let kind: String = row.get(3)?;
                let code: String = row.get(4)?;
                Ok(Diagnosis {
                    id: DiagnosisId::new(row.get(0)?),
                    recipient_id: RecipientId::new(row.get(1)?),
                    diagnosed_on: row.get(2)?,
                    result: diagnosis_result(4, &kind, &code)?,
                    fetus_count: row.get(5)?,
                })
            })
            .context("Failed to query diagnoses")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read diagnoses")
    }

    pub fn record_calving(&self, calving: &CalvingEvent) -> Result<()> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO calvings (recipient_id, calved_on, notes) VALUES (?1, ?2, ?3)",
            params![calving.recipient_id.value(), calving.calved_on, calving.notes],
        )
        .context("Failed to insert calving")?;
        Ok(())
    }

    /// Project every record set touching the given recipients into one stream.
    pub fn recipient_events(&self, recipients: &[RecipientId]) -> Result<Vec<RecipientEvent>> {
        if recipients.is_empty() {
            return Ok(Vec::new());
        }
        let db = self.conn()?;
        let mut events = Vec::new();
        protocol_events(&db, recipients, &mut events)?;
        transfer_events(&db, recipients, &mut events)?;
        diagnosis_events(&db, recipients, &mut events)?;
        calving_events(&db, recipients, &mut events)?;
        tracing::debug!(
            recipients = recipients.len(),
            events = events.len(),
            "Loaded recipient events"
        );
        Ok(events)
    }
}

fn diagnosis_result(idx: usize, kind: &str, code: &str) -> rusqlite::Result<DiagnosisResult> {
    DiagnosisResult::from_codes(kind, code).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn ids(recipients: &[RecipientId]) -> impl Iterator<Item = i64> + '_ {
    recipients.iter().map(|id| id.value())
}

/// Protocol rows are dated by the phase-2 closing date once the protocol has
/// one, and by the protocol start otherwise.
fn protocol_events(
    db: &Connection,
    recipients: &[RecipientId],
    out: &mut Vec<RecipientEvent>,
) -> Result<()> {
    let sql = format!(
        "SELECT pr.id, pr.recipient_id, pr.sub_status, p.id, p.status,
                COALESCE(p.closed_on, p.started_on)
         FROM protocol_recipients pr
         JOIN protocols p ON p.id = pr.protocol_id
         WHERE pr.recipient_id IN ({})",
        placeholders(recipients.len())
    );
    let mut stmt = db
        .prepare(&sql)
        .context("Failed to prepare protocol event query")?;
    let rows = stmt
        .query_map(params_from_iter(ids(recipients)), |row| {
            let sub_status: SubStatus = parse_code(2, &row.get::<_, String>(2)?)?;
            let protocol_status: ProtocolStatus = parse_code(4, &row.get::<_, String>(4)?)?;
            Ok(RecipientEvent {
                recipient_id: RecipientId::new(row.get(1)?),
                occurred_on: row.get::<_, NaiveDate>(5)?,
                seq: row.get(0)?,
                kind: EventKind::Protocol {
                    protocol_id: ProtocolId::new(row.get(3)?),
                    sub_status,
                    protocol_status,
                },
            })
        })
        .context("Failed to query protocol events")?;
    for row in rows {
        out.push(row.context("Failed to read protocol event")?);
    }
    Ok(())
}

fn transfer_events(
    db: &Connection,
    recipients: &[RecipientId],
    out: &mut Vec<RecipientEvent>,
) -> Result<()> {
    let sql = format!(
        "SELECT id, recipient_id, performed_on, outcome FROM transfers
         WHERE recipient_id IN ({})",
        placeholders(recipients.len())
    );
    let mut stmt = db
        .prepare(&sql)
        .context("Failed to prepare transfer event query")?;
    let rows = stmt
        .query_map(params_from_iter(ids(recipients)), |row| {
            Ok(RecipientEvent {
                recipient_id: RecipientId::new(row.get(1)?),
                occurred_on: row.get(2)?,
                seq: row.get(0)?,
                kind: EventKind::Transfer(parse_code(3, &row.get::<_, String>(3)?)?),
            })
        })
        .context("Failed to query transfer events")?;
    for row in rows {
        out.push(row.context("Failed to read transfer event")?);
    }
    Ok(())
}

fn diagnosis_events(
    db: &Connection,
    recipients: &[RecipientId],
    out: &mut Vec<RecipientEvent>,
) -> Result<()> {
    let sql = format!(
        "SELECT id, recipient_id, diagnosed_on, kind, result FROM diagnoses
         WHERE recipient_id IN ({})",
        placeholders(recipients.len())
    );
    let mut stmt = db
        .prepare(&sql)
        .context("Failed to prepare diagnosis event query")?;
    let rows = stmt
        .query_map(params_from_iter(ids(recipients)), |row| {
            let kind: String = row.get(3)?;
            let code: String = row.get(4)?;
            let kind = match diagnosis_result(4, &kind, &code)? {
                DiagnosisResult::Pregnancy(result) => EventKind::PregnancyCheck(result),
                DiagnosisResult::Sexing(result) => EventKind::Sexing(result),
            };
            Ok(RecipientEvent {
                recipient_id: RecipientId::new(row.get(1)?),
                occurred_on: row.get(2)?,
                seq: row.get(0)?,
                kind,
            })
        })
        .context("Failed to query diagnosis events")?;
    for row in rows {
        out.push(row.context("Failed to read diagnosis event")?);
    }
    Ok(())
}

fn calving_events(
    db: &Connection,
    recipients: &[RecipientId],
    out: &mut Vec<RecipientEvent>,
) -> Result<()> {
    let sql = format!(
        "SELECT id, recipient_id, calved_on FROM calvings WHERE recipient_id IN ({})",
        placeholders(recipients.len())
    );
    let mut stmt = db
        .prepare(&sql)
        .context("Failed to prepare calving event query")?;
    let rows = stmt
        .query_map(params_from_iter(ids(recipients)), |row| {
            Ok(RecipientEvent {
                recipient_id: RecipientId::new(row.get(1)?),
                occurred_on: row.get(2)?,
                seq: row.get(0)?,
                kind: EventKind::Calving,
            })
        })
        .context("Failed to query calving events")?;
    for row in rows {
        out.push(row.context("Failed to read calving event")?);
    }
    Ok(())
}
