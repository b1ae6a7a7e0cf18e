//! Reproductive status, derived on every read.
//!
//! No record stores a recipient's status. The ledger projects protocol rows,
//! transfers, diagnoses and calvings into one event stream per recipient and
//! [`fold_status`] replays that stream in `(date, precedence, sequence)` order.
//! The status history table is an audit trail only and is never read here.

use std::collections::BTreeMap;
use std::sync::Arc;

use reprotrack_ledger::Ledger;
use reprotrack_types::{
    EventKind, PregnancyResult, ProtocolStatus, RecipientEvent, RecipientId, ReproductiveStatus,
    SexingResult, StageAction, SubStatus, TransferOutcome,
};

use crate::errors::{CoreError, CoreResult};

/// Status after applying one event to `current`.
#[must_use]
pub fn apply_event(current: ReproductiveStatus, kind: EventKind) -> ReproductiveStatus {
    match kind {
        EventKind::Protocol {
            sub_status,
            protocol_status,
            ..
        } => match sub_status {
            SubStatus::Started | SubStatus::Fit if protocol_status == ProtocolStatus::Closed => {
                ReproductiveStatus::Empty
            }
            SubStatus::Started => ReproductiveStatus::Synchronizing,
            SubStatus::Fit | SubStatus::Used => ReproductiveStatus::Synchronized,
            SubStatus::Unfit => ReproductiveStatus::Empty,
        },
        EventKind::Transfer(TransferOutcome::Performed) => ReproductiveStatus::Served,
        EventKind::Transfer(TransferOutcome::NotPerformed) => current,
        EventKind::PregnancyCheck(result) => match result {
            PregnancyResult::Pregnant => ReproductiveStatus::Pregnant,
            PregnancyResult::Retouch => ReproductiveStatus::PregnantRetouch,
            PregnancyResult::Empty => ReproductiveStatus::Empty,
        },
        EventKind::Sexing(result) => match result {
            SexingResult::Female => ReproductiveStatus::PregnantFemale,
            SexingResult::Male => ReproductiveStatus::PregnantMale,
            SexingResult::NoSex => ReproductiveStatus::PregnantNoSex,
            SexingResult::TwoSexes => ReproductiveStatus::PregnantTwoSexes,
            SexingResult::Empty => ReproductiveStatus::Empty,
        },
        EventKind::Calving => ReproductiveStatus::Empty,
    }
}

/// Replay one recipient's events. Input order does not matter.
#[must_use]
pub fn fold_status<'a, I>(events: I) -> ReproductiveStatus
where
    I: IntoIterator<Item = &'a RecipientEvent>,
{
    let mut ordered: Vec<&RecipientEvent> = events.into_iter().collect();
    ordered.sort_by_key(|event| event.order_key());
    ordered
        .into_iter()
        .fold(ReproductiveStatus::Empty, |status, event| {
            apply_event(status, event.kind)
        })
}

/// Statuses for `ids` from a mixed stream. Ids without events resolve to
/// EMPTY; events of recipients not in `ids` are ignored.
#[must_use]
pub fn resolve_from_events(
    ids: &[RecipientId],
    events: &[RecipientEvent],
) -> BTreeMap<RecipientId, ReproductiveStatus> {
    let mut grouped: BTreeMap<RecipientId, Vec<&RecipientEvent>> =
        ids.iter().map(|id| (*id, Vec::new())).collect();
    for event in events {
        if let Some(stream) = grouped.get_mut(&event.recipient_id) {
            stream.push(event);
        }
    }
    grouped
        .into_iter()
        .map(|(id, stream)| (id, fold_status(stream)))
        .collect()
}

pub struct StatusResolver<L> {
    ledger: Arc<L>,
}

impl<L> Clone for StatusResolver<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<L: Ledger> StatusResolver<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// One ledger read for the whole id set.
    pub async fn resolve(
        &self,
        ids: &[RecipientId],
    ) -> CoreResult<BTreeMap<RecipientId, ReproductiveStatus>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let events = self.ledger.recipient_events(ids).await?;
        tracing::debug!(recipients = ids.len(), events = events.len(), "Resolving statuses");
        Ok(resolve_from_events(ids, &events))
    }

    pub async fn resolve_one(&self, id: RecipientId) -> CoreResult<ReproductiveStatus> {
        let events = self.ledger.recipient_events(&[id]).await?;
        Ok(fold_status(&events))
    }

    /// Fails with [`CoreError::StageNotAllowed`] unless the current status
    /// admits `action`. Returns the status that was checked.
    pub async fn ensure_allows(
        &self,
        id: RecipientId,
        action: StageAction,
    ) -> CoreResult<ReproductiveStatus> {
        let status = self.resolve_one(id).await?;
        if status.allows(action) {
            Ok(status)
        } else {
            Err(CoreError::StageNotAllowed {
                recipient: id,
                status,
                action,
            })
        }
    }
}
