//! Moving recipients between farms.
//!
//! Ear tags are unique per farm and names must not clash among a farm's active
//! residents. A clashing name stops the move. A clashing tag is resolved by
//! renaming the moving recipient to `{tag}-MOV{ddmm}`, then
//! `{tag}-MOV{ddmm}-{n}`, before the farm-history rows change. Protocol rows
//! and past events stay attached to the recipient id and are not touched.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;

use reprotrack_ledger::{FarmMove, Ledger};
use reprotrack_types::{Farm, FarmId, Recipient, RecipientId, RenameReason, RenameRecord};

use crate::errors::{CoreError, CoreResult};
use crate::guard::{OperationGuards, OperationKind};

/// First free tag derived from `tag` and the move date, or `None` once
/// `attempts` numbered suffixes are taken. `taken` holds lowercase tags.
#[must_use]
pub fn generate_unique_tag(
    tag: &str,
    moved_on: NaiveDate,
    taken: &HashSet<String>,
    attempts: u32,
) -> Option<String> {
    let base = format!("{}-MOV{}", tag.trim(), moved_on.format("%d%m"));
    if !taken.contains(&base.to_lowercase()) {
        return Some(base);
    }
    (1..=attempts)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(&candidate.to_lowercase()))
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// What a move would do, computed without writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub recipient: Recipient,
    pub from_farm: Farm,
    pub target_farm: Farm,
    /// Active resident of the target farm with the same name.
    pub name_conflict: Option<RecipientId>,
    /// Active resident of the target farm with the same ear tag.
    pub tag_conflict: Option<RecipientId>,
    /// Tag the recipient will carry on the target farm when it must change.
    pub new_tag: Option<String>,
}

impl MovePlan {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.name_conflict.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub recipient: RecipientId,
    pub from_farm: FarmId,
    pub target_farm: FarmId,
    pub rename: Option<RenameRecord>,
}

pub struct FarmTransferResolver<L> {
    ledger: Arc<L>,
    guards: OperationGuards,
    tag_attempts: u32,
}

impl<L: Ledger> FarmTransferResolver<L> {
    pub fn new(ledger: Arc<L>, guards: OperationGuards, tag_attempts: u32) -> Self {
        Self {
            ledger,
            guards,
            tag_attempts,
        }
    }

    pub async fn plan_move(
        &self,
        recipient: RecipientId,
        target: FarmId,
        moved_on: NaiveDate,
    ) -> CoreResult<MovePlan> {
        let moving = self
            .ledger
            .recipient(recipient)
            .await?
            .ok_or_else(|| CoreError::not_found("recipient", recipient.value()))?;
        let current = self.ledger.active_farm(recipient).await?.ok_or_else(|| {
            CoreError::Invariant(format!("recipient {recipient} has no active farm"))
        })?;
        if current == target {
            return Err(CoreError::Validation(format!(
                "recipient {recipient} already lives on farm {target}"
            )));
        }
        let from_farm = self.farm(current).await?;
        let target_farm = self.farm(target).await?;

        let residents = self.ledger.active_residents(target).await?;

        let name_conflict = moving.display_name().and_then(|name| {
            residents
                .iter()
                .find(|other| other.display_name().is_some_and(|n| same_name(n, name)))
                .map(|other| other.id)
        });

        let tag_conflict = residents
            .iter()
            .find(|other| same_name(&other.ear_tag, &moving.ear_tag))
            .map(|other| other.id);

        let new_tag = match tag_conflict {
            None => None,
            Some(_) => {
                let taken: HashSet<String> = residents
                    .iter()
                    .map(|other| other.ear_tag.trim().to_lowercase())
                    .collect();
                let tag =
                    generate_unique_tag(&moving.ear_tag, moved_on, &taken, self.tag_attempts)
                        .ok_or_else(|| CoreError::TagGenerationExhausted {
                            farm: target,
                            tag: moving.ear_tag.clone(),
                            attempts: self.tag_attempts,
                        })?;
                Some(tag)
            }
        };

        tracing::debug!(
            %recipient,
            from = %current,
            to = %target,
            name_conflict = name_conflict.is_some(),
            tag_conflict = tag_conflict.is_some(),
            "Planned farm move"
        );

        Ok(MovePlan {
            recipient: moving,
            from_farm,
            target_farm,
            name_conflict,
            tag_conflict,
            new_tag,
        })
    }

    /// Relocates `recipient`, renaming it first when its tag is taken on the
    /// target farm. The rename and the move are separate ledger transactions;
    /// the rename is applied first.
    pub async fn move_recipient(
        &self,
        recipient: RecipientId,
        target: FarmId,
        moved_on: NaiveDate,
        notes: Option<&str>,
    ) -> CoreResult<MoveOutcome> {
        let _token = self
            .guards
            .acquire(OperationKind::MoveRecipient, recipient.value())?;

        let plan = self.plan_move(recipient, target, moved_on).await?;
        if let Some(existing) = plan.name_conflict {
            return Err(CoreError::NameConflict {
                farm: target,
                name: plan
                    .recipient
                    .display_name()
                    .unwrap_or_default()
                    .to_string(),
                existing,
            });
        }

        let rename = match plan.new_tag {
            Some(new_tag) => {
                let record = RenameRecord {
                    recipient_id: recipient,
                    old_tag: plan.recipient.ear_tag.clone(),
                    new_tag,
                    renamed_on: moved_on,
                    reason: RenameReason::FarmChange,
                    notes: Some(format!(
                        "Moved from {} to {}",
                        plan.from_farm.name, plan.target_farm.name
                    )),
                };
                self.ledger.rename_recipient(&record).await?;
                tracing::info!(
                    %recipient,
                    old = %record.old_tag,
                    new = %record.new_tag,
                    "Renamed recipient for farm move"
                );
                Some(record)
            }
            None => None,
        };

        self.ledger
            .move_recipient(&FarmMove {
                recipient_id: recipient,
                target_farm_id: target,
                moved_on,
                notes: notes
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(ToString::to_string),
            })
            .await?;
        tracing::info!(%recipient, from = %plan.from_farm.id, to = %target, "Moved recipient");

        Ok(MoveOutcome {
            recipient,
            from_farm: plan.from_farm.id,
            target_farm: target,
            rename,
        })
    }

    async fn farm(&self, id: FarmId) -> CoreResult<Farm> {
        self.ledger
            .farm(id)
            .await?
            .ok_or_else(|| CoreError::not_found("farm", id.value()))
    }
}
