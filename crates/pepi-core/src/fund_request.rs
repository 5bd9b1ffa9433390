//! Fund requests: an agent asking for an issuance before it happens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result, money::MoneyCents, review::ReviewFields,
  transaction::validate_amount,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundRequest {
  pub id:           Uuid,
  pub pepi_book_id: Uuid,
  pub agent_id:     Uuid,
  pub amount:       MoneyCents,
  pub purpose:      String,
  /// `review_notes` holds the rejection reason.
  #[serde(flatten)]
  pub review:       ReviewFields,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundRequestInput {
  pub amount:  MoneyCents,
  pub purpose: String,
}

impl FundRequestInput {
  pub fn validate(&self) -> Result<()> {
    validate_amount(self.amount)?;
    if self.purpose.trim().is_empty() {
      return Err(Error::Validation("purpose is required".into()));
    }
    Ok(())
  }
}

/// Input to [`crate::store::PepiStore::create_fund_request`].
#[derive(Debug, Clone)]
pub struct NewFundRequest {
  pub pepi_book_id: Uuid,
  pub agent_id:     Uuid,
  pub amount:       MoneyCents,
  pub purpose:      String,
}
