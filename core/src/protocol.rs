//! Two-phase synchronization protocols.
//!
//! Phase 1 enrolls recipients (OPEN_PHASE1, then PHASE1_CLOSED). Phase 2
//! records a FIT/UNFIT verdict per recipient and closes the protocol as
//! SYNCHRONIZED when anything is FIT, CLOSED otherwise. A recipient holds at
//! most one STARTED/FIT row across every protocol that is not CLOSED.
//!
//! Gates are re-read from the ledger right before each write; the in-flight
//! tokens only stop duplicate triggers of the same operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::future::join_all;

use reprotrack_ledger::{Ledger, NewProtocol};
use reprotrack_types::{
    EnrollmentDetails, FarmId, NonEmptyString, Protocol, ProtocolHeader, ProtocolId,
    ProtocolRecipient, ProtocolRecipientId, ProtocolStatus, RecipientId, ReproductiveStatus,
    StageAction, StatusHistoryEntry, SubStatus, Verdict,
};

use crate::errors::{CoreError, CoreResult, ItemOutcome};
use crate::guard::{OperationGuards, OperationKind};
use crate::status::StatusResolver;

const PHASE2_SOURCE: &str = "PHASE2_CLOSE";

/// Header fields as typed into the form; all optional until validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderInput {
    pub farm_id: Option<FarmId>,
    pub started_on: Option<NaiveDate>,
    pub responsible: Option<String>,
}

impl HeaderInput {
    pub fn validate(&self) -> CoreResult<ProtocolHeader> {
        let farm_id = self
            .farm_id
            .ok_or(CoreError::MissingField { field: "farm" })?;
        let started_on = self
            .started_on
            .ok_or(CoreError::MissingField { field: "start date" })?;
        let responsible = NonEmptyString::from_optional(self.responsible.as_deref())
            .map_err(|_| CoreError::MissingField {
                field: "responsible",
            })?;
        Ok(ProtocolHeader {
            farm_id,
            started_on,
            responsible,
        })
    }
}

/// Phase-1 wizard state. Nothing touches the ledger until
/// [`ProtocolService::commit_phase1`]; dropping the draft cancels it.
#[derive(Debug, Clone, Default)]
pub struct Phase1Draft {
    pub header: HeaderInput,
    candidates: Vec<(RecipientId, EnrollmentDetails)>,
}

impl Phase1Draft {
    #[must_use]
    pub fn new(header: HeaderInput) -> Self {
        Self {
            header,
            candidates: Vec::new(),
        }
    }

    pub fn add(&mut self, recipient: RecipientId, details: EnrollmentDetails) -> CoreResult<()> {
        if self.contains(recipient) {
            return Err(CoreError::Validation(format!(
                "recipient {recipient} is already in this protocol"
            )));
        }
        self.candidates.push((recipient, details));
        Ok(())
    }

    pub fn remove(&mut self, recipient: RecipientId) -> bool {
        let before = self.candidates.len();
        self.candidates.retain(|(id, _)| *id != recipient);
        self.candidates.len() != before
    }

    #[must_use]
    pub fn contains(&self, recipient: RecipientId) -> bool {
        self.candidates.iter().any(|(id, _)| *id == recipient)
    }

    #[must_use]
    pub fn candidates(&self) -> &[(RecipientId, EnrollmentDetails)] {
        &self.candidates
    }

    #[must_use]
    pub fn recipient_ids(&self) -> Vec<RecipientId> {
        self.candidates.iter().map(|(id, _)| *id).collect()
    }
}

/// Phase-2 verdicts collected before submission.
#[derive(Debug, Clone)]
pub struct Phase2Review {
    protocol: ProtocolId,
    verdicts: BTreeMap<RecipientId, Verdict>,
}

impl Phase2Review {
    #[must_use]
    pub fn new(protocol: ProtocolId) -> Self {
        Self {
            protocol,
            verdicts: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    pub fn set(&mut self, recipient: RecipientId, verdict: Verdict) {
        self.verdicts.insert(recipient, verdict);
    }

    pub fn clear(&mut self, recipient: RecipientId) -> Option<Verdict> {
        self.verdicts.remove(&recipient)
    }

    #[must_use]
    pub fn verdict(&self, recipient: RecipientId) -> Option<&Verdict> {
        self.verdicts.get(&recipient)
    }

    /// Rows of `rows` still lacking a FIT or UNFIT verdict.
    #[must_use]
    pub fn pending<'a>(&self, rows: &'a [ProtocolRecipient]) -> Vec<&'a ProtocolRecipient> {
        rows.iter()
            .filter(|row| row.sub_status == SubStatus::Started)
            .filter(|row| {
                self.verdicts
                    .get(&row.recipient_id)
                    .is_none_or(|verdict| *verdict == Verdict::Reset)
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct Phase2Report {
    pub protocol: ProtocolId,
    pub status: ProtocolStatus,
    /// One entry per status-history write.
    pub outcomes: Vec<ItemOutcome<RecipientId>>,
}

impl Phase2Report {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_ok()).count()
    }
}

pub struct ProtocolService<L> {
    ledger: Arc<L>,
    guards: OperationGuards,
    status: StatusResolver<L>,
}

impl<L: Ledger> ProtocolService<L> {
    pub fn new(ledger: Arc<L>, guards: OperationGuards) -> Self {
        let status = StatusResolver::new(Arc::clone(&ledger));
        Self {
            ledger,
            guards,
            status,
        }
    }

    pub async fn load(&self, id: ProtocolId) -> CoreResult<Protocol> {
        self.ledger
            .protocol(id)
            .await?
            .ok_or_else(|| CoreError::not_found("protocol", id.value()))
    }

    pub async fn recipients(&self, id: ProtocolId) -> CoreResult<Vec<ProtocolRecipient>> {
        Ok(self.ledger.protocol_recipients(id).await?)
    }

    /// Inserts an empty OPEN_PHASE1 protocol.
    pub async fn create(&self, input: &HeaderInput) -> CoreResult<Protocol> {
        let header = input.validate()?;
        self.require_farm(header.farm_id).await?;

        let id = self
            .ledger
            .insert_protocol(&NewProtocol {
                farm_id: header.farm_id,
                started_on: header.started_on,
                responsible: header.responsible.into_inner(),
                status: ProtocolStatus::OpenPhase1,
            })
            .await?;
        tracing::info!(protocol = %id, farm = %header.farm_id, "Created protocol");
        self.load(id).await
    }

    pub async fn enroll(
        &self,
        protocol: ProtocolId,
        recipient: RecipientId,
        details: &EnrollmentDetails,
    ) -> CoreResult<ProtocolRecipientId> {
        let _token = self
            .guards
            .acquire(OperationKind::Enroll, recipient.value())?;

        let current = self.load(protocol).await?;
        expect_state(&current, ProtocolStatus::OpenPhase1)?;
        self.require_resident(recipient, current.farm_id).await?;
        self.require_unenrolled(&[recipient]).await?;
        self.status
            .ensure_allows(recipient, StageAction::EnterProtocol)
            .await?;

        let row = self.ledger.enroll(protocol, recipient, details).await?;
        tracing::info!(%protocol, %recipient, "Enrolled recipient");
        Ok(row)
    }

    pub async fn close_phase1(&self, id: ProtocolId) -> CoreResult<Protocol> {
        let _token = self.guards.acquire(OperationKind::ClosePhase1, id.value())?;

        let protocol = self.load(id).await?;
        if !protocol.header_complete() {
            return Err(CoreError::HeaderIncomplete(id));
        }
        let rows = self.ledger.protocol_recipients(id).await?;
        if rows.is_empty() {
            return Err(CoreError::NoRecipientsEnrolled(id));
        }
        let next = protocol.status.transition(ProtocolStatus::Phase1Closed)?;

        self.ledger.set_protocol_status(id, next).await?;
        tracing::info!(protocol = %id, enrolled = rows.len(), "Closed phase 1");
        self.load(id).await
    }

    pub async fn evaluate(
        &self,
        protocol: ProtocolId,
        recipient: RecipientId,
        verdict: &Verdict,
    ) -> CoreResult<()> {
        let _token = self
            .guards
            .acquire(OperationKind::Evaluate, recipient.value())?;

        let current = self.load(protocol).await?;
        expect_state(&current, ProtocolStatus::Phase1Closed)?;
        let rows = self.ledger.protocol_recipients(protocol).await?;
        let row = rows
            .iter()
            .find(|row| row.recipient_id == recipient)
            .ok_or_else(|| CoreError::not_found("protocol recipient", recipient.value()))?;
        if row.sub_status == SubStatus::Used {
            return Err(CoreError::Precondition(format!(
                "recipient {recipient} already received an embryo"
            )));
        }

        let sub_status = verdict.sub_status();
        let reason = verdict.reason();
        self.ledger
            .set_sub_status(row.id, sub_status, reason.as_deref())
            .await?;
        tracing::info!(%protocol, %recipient, %sub_status, "Recorded verdict");
        Ok(())
    }

    /// Closes phase 2 and pushes the resulting statuses into the status
    /// history. The history writes are best-effort: the protocol stays closed
    /// even if some of them fail, and the report lists each outcome.
    pub async fn close_phase2(
        &self,
        id: ProtocolId,
        closed_on: Option<NaiveDate>,
        responsible: Option<&str>,
    ) -> CoreResult<Phase2Report> {
        let _token = self.guards.acquire(OperationKind::ClosePhase2, id.value())?;

        let closed_on = closed_on.ok_or(CoreError::MissingField {
            field: "closing date",
        })?;
        let responsible = NonEmptyString::from_optional(responsible).map_err(|_| {
            CoreError::MissingField {
                field: "closing responsible",
            }
        })?;

        let protocol = self.load(id).await?;
        expect_state(&protocol, ProtocolStatus::Phase1Closed)?;
        let rows = self.ledger.protocol_recipients(id).await?;
        let unresolved = rows
            .iter()
            .filter(|row| row.sub_status == SubStatus::Started)
            .count();
        if unresolved > 0 {
            return Err(CoreError::UnresolvedRecipients {
                protocol: id,
                count: unresolved,
            });
        }

        let any_fit = rows.iter().any(|row| row.sub_status == SubStatus::Fit);
        let target = if any_fit {
            ProtocolStatus::Synchronized
        } else {
            ProtocolStatus::Closed
        };
        let status = protocol.status.transition(target)?;

        self.ledger
            .record_phase2_close(id, status, closed_on, responsible.as_str())
            .await?;
        tracing::info!(protocol = %id, %status, "Closed phase 2");

        let entries: Vec<StatusHistoryEntry> = rows
            .iter()
            .filter_map(|row| {
                let resolved = match row.sub_status {
                    SubStatus::Fit => ReproductiveStatus::Synchronized,
                    SubStatus::Unfit => ReproductiveStatus::Empty,
                    SubStatus::Started | SubStatus::Used => return None,
                };
                Some(StatusHistoryEntry {
                    recipient_id: row.recipient_id,
                    status: resolved,
                    recorded_on: closed_on,
                    source: PHASE2_SOURCE.to_string(),
                })
            })
            .collect();

        let results = join_all(
            entries
                .iter()
                .map(|entry| self.ledger.append_status_history(entry)),
        )
        .await;

        let outcomes = entries
            .iter()
            .zip(results)
            .map(|(entry, result)| match result {
                Ok(()) => ItemOutcome::ok(entry.recipient_id),
                Err(err) => {
                    tracing::warn!(
                        protocol = %id,
                        recipient = %entry.recipient_id,
                        "Status history write failed: {err:#}"
                    );
                    ItemOutcome::failed(entry.recipient_id, err.into())
                }
            })
            .collect();

        Ok(Phase2Report {
            protocol: id,
            status,
            outcomes,
        })
    }

    /// Creates the protocol with every candidate in one ledger transaction.
    /// Wizard protocols leave phase 1 immediately, so the result is
    /// PHASE1_CLOSED.
    pub async fn commit_phase1(&self, draft: &Phase1Draft) -> CoreResult<Protocol> {
        let header = draft.header.validate()?;
        let _token = self
            .guards
            .acquire(OperationKind::CommitPhase1, header.farm_id.value())?;

        if draft.candidates.is_empty() {
            return Err(CoreError::MissingField {
                field: "recipients",
            });
        }
        self.require_farm(header.farm_id).await?;

        let ids = draft.recipient_ids();
        for id in &ids {
            self.require_resident(*id, header.farm_id).await?;
        }
        self.require_unenrolled(&ids).await?;
        let statuses = self.status.resolve(&ids).await?;
        if let Some((recipient, status)) = statuses
            .iter()
            .find(|(_, status)| !status.allows(StageAction::EnterProtocol))
        {
            return Err(CoreError::StageNotAllowed {
                recipient: *recipient,
                status: *status,
                action: StageAction::EnterProtocol,
            });
        }

        let status = ProtocolStatus::OpenPhase1.transition(ProtocolStatus::Phase1Closed)?;
        let id = self
            .ledger
            .create_protocol_atomic(
                &NewProtocol {
                    farm_id: header.farm_id,
                    started_on: header.started_on,
                    responsible: header.responsible.into_inner(),
                    status,
                },
                &draft.candidates,
            )
            .await?;

        tracing::info!(
            protocol = %id,
            farm = %header.farm_id,
            enrolled = ids.len(),
            "Created protocol from wizard"
        );
        self.load(id).await
    }

    /// Applies every collected verdict, then closes phase 2.
    pub async fn submit_phase2(
        &self,
        review: &Phase2Review,
        closed_on: Option<NaiveDate>,
        responsible: Option<&str>,
    ) -> CoreResult<Phase2Report> {
        if closed_on.is_none() {
            return Err(CoreError::MissingField {
                field: "closing date",
            });
        }
        if NonEmptyString::from_optional(responsible).is_err() {
            return Err(CoreError::MissingField {
                field: "closing responsible",
            });
        }
        for (recipient, verdict) in &review.verdicts {
            self.evaluate(review.protocol, *recipient, verdict).await?;
        }
        self.close_phase2(review.protocol, closed_on, responsible)
            .await
    }

    async fn require_farm(&self, farm: FarmId) -> CoreResult<()> {
        match self.ledger.farm(farm).await? {
            Some(_) => Ok(()),
            None => Err(CoreError::not_found("farm", farm.value())),
        }
    }

    async fn require_resident(&self, recipient: RecipientId, farm: FarmId) -> CoreResult<()> {
        if self.ledger.recipient(recipient).await?.is_none() {
            return Err(CoreError::not_found("recipient", recipient.value()));
        }
        match self.ledger.active_farm(recipient).await? {
            Some(active) if active == farm => Ok(()),
            Some(active) => Err(CoreError::Precondition(format!(
                "recipient {recipient} lives on farm {active}, not {farm}"
            ))),
            None => Err(CoreError::Invariant(format!(
                "recipient {recipient} has no active farm"
            ))),
        }
    }

    async fn require_unenrolled(&self, recipients: &[RecipientId]) -> CoreResult<()> {
        let held = self.ledger.open_enrollments(recipients).await?;
        match held.first() {
            Some(row) => Err(CoreError::RecipientAlreadyEnrolled {
                recipient: row.recipient_id,
                protocol: row.protocol_id,
            }),
            None => Ok(()),
        }
    }
}

fn expect_state(protocol: &Protocol, expected: ProtocolStatus) -> CoreResult<()> {
    if protocol.status == expected {
        Ok(())
    } else {
        Err(CoreError::WrongProtocolState {
            protocol: protocol.id,
            expected,
            actual: protocol.status,
        })
    }
}
