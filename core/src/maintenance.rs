//! Once-a-day embryo expiry.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Local, NaiveDate};

use reprotrack_ledger::Ledger;
use reprotrack_types::EmbryoId;

use crate::errors::CoreResult;
use crate::settings::CoreSettings;

/// Discards FRESH embryos past their shelf life at most once per local
/// calendar day. A failed run does not count, so the next trigger retries.
pub struct DailyMaintenance<L> {
    ledger: Arc<L>,
    shelf_life_days: u32,
    enabled: bool,
    last_run: Mutex<Option<NaiveDate>>,
}

impl<L: Ledger> DailyMaintenance<L> {
    pub fn new(ledger: Arc<L>, settings: &CoreSettings) -> Self {
        Self {
            ledger,
            shelf_life_days: settings.embryo_shelf_life_days,
            enabled: settings.run_daily_expiry,
            last_run: Mutex::new(None),
        }
    }

    pub async fn run_if_due_now(&self) -> CoreResult<Option<Vec<EmbryoId>>> {
        self.run_if_due(Local::now().date_naive()).await
    }

    /// `None` when expiry already ran for `today` or is disabled.
    pub async fn run_if_due(&self, today: NaiveDate) -> CoreResult<Option<Vec<EmbryoId>>> {
        if !self.enabled {
            return Ok(None);
        }
        let previous = {
            let mut last_run = self.last_run.lock().unwrap_or_else(PoisonError::into_inner);
            if *last_run == Some(today) {
                return Ok(None);
            }
            last_run.replace(today)
        };

        match self
            .ledger
            .expire_overdue_embryos(today, self.shelf_life_days)
            .await
        {
            Ok(discarded) => {
                tracing::info!(%today, discarded = discarded.len(), "Daily embryo expiry finished");
                Ok(Some(discarded))
            }
            Err(err) => {
                *self.last_run.lock().unwrap_or_else(PoisonError::into_inner) = previous;
                Err(err.into())
            }
        }
    }

    #[must_use]
    pub fn last_run(&self) -> Option<NaiveDate> {
        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
