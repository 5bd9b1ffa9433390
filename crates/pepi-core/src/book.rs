//! PEPI books: one ledger per funding period.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, money::MoneyCents};

/// Inclusive range of accepted book years.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 2000..=2100;

/// The phrase an admin must type to confirm [`crate::books::BookManager::reset_active_book`].
pub const RESET_CONFIRMATION_PHRASE: &str = "RESET PEPI BOOK";

/// A funding period's ledger.
///
/// At most one book is active system-wide. A closed book is never active and
/// its `closing_balance` never changes after close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PepiBook {
  pub id:              Uuid,
  pub year:            i32,
  pub starting_amount: MoneyCents,
  pub is_active:       bool,
  pub is_closed:       bool,
  pub closing_balance: Option<MoneyCents>,
  pub closed_at:       Option<DateTime<Utc>>,
  pub created_at:      DateTime<Utc>,
}

impl PepiBook {
  pub(crate) fn ensure_open(&self) -> Result<()> {
    if self.is_closed {
      return Err(Error::InvalidState(format!(
        "book {} ({}) is closed",
        self.id, self.year
      )));
    }
    Ok(())
  }
}

/// Input to [`crate::store::PepiStore::create_book`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewBook {
  pub year:            i32,
  pub starting_amount: MoneyCents,
  /// Activate immediately, deactivating whichever book is currently active.
  #[serde(default)]
  pub activate:        bool,
}

impl NewBook {
  pub fn validate(&self) -> Result<()> {
    if !YEAR_RANGE.contains(&self.year) {
      return Err(Error::Validation(format!(
        "year {} is outside {}..={}",
        self.year,
        YEAR_RANGE.start(),
        YEAR_RANGE.end()
      )));
    }
    if !self.starting_amount.is_positive() {
      return Err(Error::Validation(
        "starting amount must be greater than zero".into(),
      ));
    }
    if self.starting_amount > MoneyCents::MAX_AMOUNT {
      return Err(Error::Validation(format!(
        "starting amount may not exceed {}",
        MoneyCents::MAX_AMOUNT
      )));
    }
    Ok(())
  }
}

/// Rows removed by a book reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetCounts {
  pub transactions:  u64,
  pub ci_payments:   u64,
  pub fund_requests: u64,
}
