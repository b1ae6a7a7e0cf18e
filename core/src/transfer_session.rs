//! Multi-recipient transfer sessions that survive reloads.
//!
//! The draft is upserted on every step under the farm's single OPEN row.
//! On startup the most recently touched OPEN session is offered back only
//! while a row it references, listed in the draft or belonging to its
//! protocol, can still receive an embryo; otherwise it is closed without
//! asking.

use std::sync::Arc;

use reprotrack_ledger::{Ledger, NewTransfer};
use reprotrack_types::{
    Disposition, Embryo, EmbryoId, EmbryoOrigin, FarmId, ProtocolRecipient, ProtocolRecipientId,
    ProtocolStatus, RecipientId, ReproductiveStatus, SessionDraft, SessionId, StageAction,
    SubStatus, TransferId, TransferOutcome, TransferSession,
};

use crate::errors::{CoreError, CoreResult};
use crate::guard::{OperationGuards, OperationKind};
use crate::status::StatusResolver;

/// One embryo going into one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub recipient: RecipientId,
    pub embryo: EmbryoId,
    /// Protocol row to consume; defaults to the recipient's open FIT row.
    pub protocol_recipient: Option<ProtocolRecipientId>,
}

pub struct TransferSessionManager<L> {
    ledger: Arc<L>,
    guards: OperationGuards,
    status: StatusResolver<L>,
    auto_restore: bool,
}

impl<L: Ledger> TransferSessionManager<L> {
    pub fn new(ledger: Arc<L>, guards: OperationGuards, auto_restore: bool) -> Self {
        let status = StatusResolver::new(Arc::clone(&ledger));
        Self {
            ledger,
            guards,
            status,
            auto_restore,
        }
    }

    pub async fn persist(&self, draft: &SessionDraft) -> CoreResult<TransferSession> {
        let _token = self
            .guards
            .acquire(OperationKind::PersistSession, draft.farm_id.value())?;
        let session = self.ledger.upsert_open_session(draft).await?;
        tracing::debug!(session = %session.id, farm = %draft.farm_id, "Persisted transfer session");
        Ok(session)
    }

    pub async fn open_for_farm(&self, farm: FarmId) -> CoreResult<Option<TransferSession>> {
        Ok(self.ledger.open_session_for_farm(farm).await?)
    }

    /// The session to offer back after a reload, if any.
    pub async fn restore(&self) -> CoreResult<Option<TransferSession>> {
        if !self.auto_restore {
            return Ok(None);
        }
        let Some(session) = self.ledger.latest_open_session().await? else {
            return Ok(None);
        };

        if self.has_open_rows(&session.draft).await? {
            tracing::info!(
                session = %session.id,
                farm = %session.farm_id(),
                "Restoring transfer session"
            );
            return Ok(Some(session));
        }

        self.ledger.close_session(session.id).await?;
        tracing::warn!(
            session = %session.id,
            farm = %session.farm_id(),
            "Closed stale transfer session with no open protocol rows"
        );
        Ok(None)
    }

    /// Whether a row the draft points at, directly or through its protocol,
    /// is still STARTED or FIT.
    async fn has_open_rows(&self, draft: &SessionDraft) -> CoreResult<bool> {
        let listed = self
            .ledger
            .protocol_recipient_rows(&draft.protocol_recipient_ids)
            .await?;
        if listed.iter().any(|row| row.sub_status.holds_enrollment()) {
            return Ok(true);
        }
        let Some(protocol_id) = draft.protocol_id else {
            return Ok(false);
        };
        match self.ledger.protocol(protocol_id).await? {
            Some(protocol) if protocol.status != ProtocolStatus::Closed => {}
            _ => return Ok(false),
        }
        let rows = self.ledger.protocol_recipients(protocol_id).await?;
        Ok(rows.iter().any(|row| row.sub_status.holds_enrollment()))
    }

    pub async fn cancel(&self, id: SessionId) -> CoreResult<()> {
        self.ledger.close_session(id).await?;
        tracing::info!(session = %id, "Cancelled transfer session");
        Ok(())
    }

    pub async fn complete(&self, id: SessionId) -> CoreResult<()> {
        self.ledger.close_session(id).await?;
        tracing::info!(session = %id, "Completed transfer session");
        Ok(())
    }

    /// Records a performed transfer and saves its id into the session right
    /// away. If that save fails the transfer itself stays recorded and the
    /// error is returned.
    pub async fn record_transfer(
        &self,
        session: &mut TransferSession,
        request: TransferRequest,
    ) -> CoreResult<TransferId> {
        if !session.is_open() {
            return Err(CoreError::Precondition(format!(
                "transfer session {} is closed",
                session.id
            )));
        }
        let params = &session.draft.params;
        let performed_on = params.transfer_date.ok_or(CoreError::MissingField {
            field: "transfer date",
        })?;
        let recipient = request.recipient;
        let _token = self
            .guards
            .acquire(OperationKind::RecordTransfer, recipient.value())?;

        if self.ledger.recipient(recipient).await?.is_none() {
            return Err(CoreError::not_found("recipient", recipient.value()));
        }
        if self.ledger.active_farm(recipient).await? != Some(session.farm_id()) {
            return Err(CoreError::Precondition(format!(
                "recipient {recipient} is not on farm {}",
                session.farm_id()
            )));
        }

        let status = self.status.resolve_one(recipient).await?;
        let served_here = self.served_in_session(session, recipient).await?;
        match status {
            ReproductiveStatus::Synchronized => {}
            ReproductiveStatus::Empty if params.include_free_heat => {}
            ReproductiveStatus::Served if served_here && params.allow_pairs => {}
            ReproductiveStatus::Served if served_here => {
                return Err(CoreError::AlreadyServed { recipient });
            }
            _ => {
                return Err(CoreError::StageNotAllowed {
                    recipient,
                    status,
                    action: StageAction::Transfer,
                });
            }
        }

        let row = self.protocol_row(recipient, request.protocol_recipient).await?;
        let embryo = self
            .ledger
            .embryo(request.embryo)
            .await?
            .ok_or_else(|| CoreError::not_found("embryo", request.embryo.value()))?;
        check_embryo(session, &embryo)?;

        let id = self
            .ledger
            .record_transfer(&NewTransfer {
                recipient_id: recipient,
                embryo_id: embryo.id,
                protocol_recipient_id: row.as_ref().map(|row| row.id),
                performed_on,
                outcome: TransferOutcome::Performed,
                veterinarian: params.veterinarian.clone(),
                technician: params.technician.clone(),
            })
            .await?;
        tracing::info!(transfer = %id, %recipient, embryo = %embryo.id, "Recorded transfer");

        session.draft.transfer_ids.push(id);
        if let Some(row) = row
            && !session.draft.protocol_recipient_ids.contains(&row.id)
        {
            session.draft.protocol_recipient_ids.push(row.id);
        }
        *session = self.persist(&session.draft).await?;
        Ok(id)
    }

    async fn served_in_session(
        &self,
        session: &TransferSession,
        recipient: RecipientId,
    ) -> CoreResult<bool> {
        if session.draft.transfer_ids.is_empty() {
            return Ok(false);
        }
        let transfers = self.ledger.transfers(recipient).await?;
        Ok(transfers.iter().any(|transfer| {
            transfer.outcome == TransferOutcome::Performed
                && session.draft.transfer_ids.contains(&transfer.id)
        }))
    }

    /// The protocol row a transfer consumes. An explicit row must belong to
    /// the recipient and be FIT (or USED when a second embryo goes in).
    async fn protocol_row(
        &self,
        recipient: RecipientId,
        requested: Option<ProtocolRecipientId>,
    ) -> CoreResult<Option<ProtocolRecipient>> {
        let Some(id) = requested else {
            let open = self.ledger.open_enrollments(&[recipient]).await?;
            return Ok(open.into_iter().find(|row| row.sub_status == SubStatus::Fit));
        };

        let row = self
            .ledger
            .protocol_recipient_rows(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found("protocol recipient", id.value()))?;
        if row.recipient_id != recipient {
            return Err(CoreError::Validation(format!(
                "protocol row {id} belongs to recipient {}",
                row.recipient_id
            )));
        }
        if !matches!(row.sub_status, SubStatus::Fit | SubStatus::Used) {
            return Err(CoreError::Precondition(format!(
                "protocol row {id} is {}; only FIT rows receive embryos",
                row.sub_status
            )));
        }
        Ok(Some(row))
    }
}

fn check_embryo(session: &TransferSession, embryo: &Embryo) -> CoreResult<()> {
    let id = embryo.id;
    if embryo.client_id.is_some() {
        return Err(CoreError::Precondition(format!(
            "embryo {id} is assigned to a client"
        )));
    }
    let expected = match session.draft.params.origin {
        EmbryoOrigin::Package => Disposition::Fresh,
        EmbryoOrigin::Frozen => Disposition::Frozen,
    };
    if embryo.disposition != expected {
        return Err(CoreError::Precondition(format!(
            "embryo {id} is {}; this session transfers {expected} embryos",
            embryo.disposition
        )));
    }
    if let Some(package) = session.draft.package
        && session.draft.params.origin == EmbryoOrigin::Package
        && (embryo.batch_id != package.batch_id || embryo.dispatched_on != package.dispatched_on)
    {
        return Err(CoreError::Validation(format!(
            "embryo {id} is not part of package {package}"
        )));
    }
    Ok(())
}
