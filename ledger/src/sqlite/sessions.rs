//! Transfer session drafts.
//!
//! A partial unique index keeps at most one OPEN row per farm; the upsert
//! targets that index, so repeated saves update the same row. Closed rows
//! are kept.

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, Row, params};

use reprotrack_types::{
    BatchId, FarmId, PackageKey, ProtocolId, SessionDraft, SessionId, SessionParams,
    SessionStatus, TransferSession,
};

use super::SqliteLedger;
use crate::sqlite_util::{parse_code, parse_json, parse_timestamp, timestamp};

const SESSION_COLUMNS: &str = "id, farm_id, package_batch_id, package_dispatched_on, protocol_id,
     transfer_ids, protocol_recipient_ids, params, status, updated_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<TransferSession> {
    let batch: Option<i64> = row.get(2)?;
    let dispatched_on: Option<NaiveDate> = row.get(3)?;
    let package = match (batch, dispatched_on) {
        (Some(batch), Some(dispatched_on)) => Some(PackageKey {
            batch_id: BatchId::new(batch),
            dispatched_on,
        }),
        _ => None,
    };
    let params: SessionParams = parse_json(7, &row.get::<_, String>(7)?)?;

    Ok(TransferSession {
        id: SessionId::new(row.get(0)?),
        draft: SessionDraft {
            farm_id: FarmId::new(row.get(1)?),
            package,
            protocol_id: row.get::<_, Option<i64>>(4)?.map(ProtocolId::new),
            transfer_ids: parse_json(5, &row.get::<_, String>(5)?)?,
            protocol_recipient_ids: parse_json(6, &row.get::<_, String>(6)?)?,
            params,
        },
        status: parse_code(8, &row.get::<_, String>(8)?)?,
        updated_at: parse_timestamp(9, &row.get::<_, String>(9)?)?,
    })
}

fn query_sessions(
    db: &Connection,
    filter: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<TransferSession>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM transfer_sessions {filter}");
    let mut stmt = db
        .prepare(&sql)
        .context("Failed to prepare session query")?;
    let rows = stmt
        .query_map(args, session_from_row)
        .context("Failed to query sessions")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read sessions")
}

impl SqliteLedger {
    pub fn upsert_open_session(&self, draft: &SessionDraft) -> Result<TransferSession> {
        let transfer_ids =
            serde_json::to_string(&draft.transfer_ids).context("Failed to encode transfer ids")?;
        let row_ids = serde_json::to_string(&draft.protocol_recipient_ids)
            .context("Failed to encode protocol row ids")?;
        let session_params =
            serde_json::to_string(&draft.params).context("Failed to encode session params")?;
        let now = timestamp(Utc::now());

        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start session transaction")?;

        tx.execute(
            "INSERT INTO transfer_sessions
                (farm_id, package_batch_id, package_dispatched_on, protocol_id, transfer_ids,
                 protocol_recipient_ids, params, status, created_at, updated_at, touched)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9,
                     (SELECT COALESCE(MAX(touched), 0) + 1 FROM transfer_sessions))
             ON CONFLICT (farm_id) WHERE status = 'OPEN' DO UPDATE SET
                package_batch_id = excluded.package_batch_id,
                package_dispatched_on = excluded.package_dispatched_on,
                protocol_id = excluded.protocol_id,
                transfer_ids = excluded.transfer_ids,
                protocol_recipient_ids = excluded.protocol_recipient_ids,
                params = excluded.params,
                updated_at = excluded.updated_at,
                touched = excluded.touched",
            params![
                draft.farm_id.value(),
                draft.package.map(|p| p.batch_id.value()),
                draft.package.map(|p| p.dispatched_on),
                draft.protocol_id.map(ProtocolId::value),
                transfer_ids,
                row_ids,
                session_params,
                SessionStatus::Open.as_str(),
                now,
            ],
        )
        .context("Failed to upsert transfer session")?;

        let mut sessions = query_sessions(
            &tx,
            "WHERE farm_id = ?1 AND status = 'OPEN'",
            params![draft.farm_id.value()],
        )?;
        let Some(session) = sessions.pop() else {
            bail!("Open session for farm {} vanished after upsert", draft.farm_id);
        };

        tx.commit().context("Failed to commit transfer session")?;
        Ok(session)
    }

    pub fn open_session_for_farm(&self, farm: FarmId) -> Result<Option<TransferSession>> {
        let db = self.conn()?;
        let mut sessions = query_sessions(
            &db,
            "WHERE farm_id = ?1 AND status = 'OPEN'",
            params![farm.value()],
        )?;
        Ok(sessions.pop())
    }

    pub fn latest_open_session(&self) -> Result<Option<TransferSession>> {
        let db = self.conn()?;
        let mut sessions = query_sessions(
            &db,
            "WHERE status = 'OPEN' ORDER BY touched DESC LIMIT 1",
            [],
        )?;
        Ok(sessions.pop())
    }

    pub fn close_session(&self, id: SessionId) -> Result<()> {
        let now = timestamp(Utc::now());
        let db = self.conn()?;
        let updated = db
            .execute(
                "UPDATE transfer_sessions
                 SET status = ?2, updated_at = ?3,
                     touched = (SELECT COALESCE(MAX(touched), 0) + 1 FROM transfer_sessions)
                 WHERE id = ?1",
                params![id.value(), SessionStatus::Closed.as_str(), now],
            )
            .context("Failed to close transfer session")?;
        if updated == 0 {
            bail!("Transfer session {id} not found");
        }
        Ok(())
    }

    pub fn farm_sessions(&self, farm: FarmId) -> Result<Vec<TransferSession>> {
        let db = self.conn()?;
        query_sessions(
            &db,
            "WHERE farm_id = ?1 ORDER BY touched DESC",
            params![farm.value()],
        )
    }
}
