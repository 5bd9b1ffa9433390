//! Confidential-informant payments.
//!
//! Reviewed through the same cycle as transactions, with one extra rule: an
//! approval must carry the commander's sign-off.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result, money::MoneyCents, review::ReviewFields,
  transaction::validate_amount,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiPayment {
  pub id:                     Uuid,
  pub pepi_book_id:           Uuid,
  pub paying_agent_id:        Uuid,
  /// Opaque code identifying the informant; never a real name.
  pub informant_code:         String,
  pub case_number:            Option<String>,
  pub purpose:                String,
  pub amount:                 MoneyCents,
  pub receipt_number:         Option<String>,
  pub payment_date:           NaiveDate,
  pub ci_signature:           Option<String>,
  pub paying_agent_signature: Option<String>,
  pub witness_signature:      Option<String>,
  pub commander_signature:    Option<String>,
  #[serde(flatten)]
  pub review:                 ReviewFields,
  pub created_by:             Uuid,
  pub created_at:             DateTime<Utc>,
  pub updated_at:             DateTime<Utc>,
}

/// Caller input for a CI payment. Submitted against the active book.
#[derive(Debug, Clone, Deserialize)]
pub struct CiPaymentInput {
  /// Defaults to the submitting agent.
  pub paying_agent_id:        Option<Uuid>,
  pub informant_code:         String,
  pub case_number:            Option<String>,
  pub purpose:                String,
  pub amount:                 MoneyCents,
  pub receipt_number:         Option<String>,
  pub payment_date:           NaiveDate,
  pub ci_signature:           Option<String>,
  pub paying_agent_signature: Option<String>,
  pub witness_signature:      Option<String>,
}

impl CiPaymentInput {
  pub fn validate(&self) -> Result<()> {
    validate_amount(self.amount)?;
    if self.informant_code.trim().is_empty() {
      return Err(Error::Validation("informant code is required".into()));
    }
    if self.purpose.trim().is_empty() {
      return Err(Error::Validation("purpose is required".into()));
    }
    Ok(())
  }
}

/// Input to [`crate::store::PepiStore::create_ci_payment`].
#[derive(Debug, Clone)]
pub struct NewCiPayment {
  pub pepi_book_id:    Uuid,
  pub paying_agent_id: Uuid,
  pub input:           CiPaymentInput,
  pub created_by:      Uuid,
}

/// Validate the commander sign-off supplied with an approval.
pub fn require_commander_signature(signature: Option<&str>) -> Result<String> {
  signature
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
    .ok_or_else(|| {
      Error::Validation(
        "commander signature is required to approve a CI payment".into(),
      )
    })
}
