//! Ledger transactions and their submission rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  Error, Result,
  agent::Agent,
  money::MoneyCents,
  review::{ReviewFields, ReviewStatus},
};

/// The kind of movement a transaction records.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionType {
  /// Funds put into circulation; increases the balance.
  Issuance,
  /// Funds expended; decreases the balance.
  Spending,
  /// Funds handed back by an agent; increases the balance.
  Return,
}

impl TransactionType {
  /// The signed effect of `amount` on a book balance.
  pub fn signed(self, amount: MoneyCents) -> MoneyCents {
    match self {
      Self::Issuance | Self::Return => amount,
      Self::Spending => -amount,
    }
  }
}

/// A single ledger movement within one book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
  pub id:                 Uuid,
  pub pepi_book_id:       Uuid,
  pub transaction_type:   TransactionType,
  pub amount:             MoneyCents,
  pub receipt_number:     Option<String>,
  pub description:        String,
  /// The spender or recipient; `None` for book-level entries.
  pub agent_id:           Option<Uuid>,
  /// Marks the issuance that seeded the book. Excluded from the
  /// additional-funds figure.
  pub is_initial_funding: bool,
  #[serde(flatten)]
  pub review:             ReviewFields,
  pub created_by:         Uuid,
  pub created_at:         DateTime<Utc>,
  pub updated_at:         DateTime<Utc>,
}

impl Transaction {
  pub fn status(&self) -> ReviewStatus { self.review.status }

  pub fn is_approved(&self) -> bool {
    self.review.status == ReviewStatus::Approved
  }

  /// The signed effect on the book balance once approved.
  pub fn signed_amount(&self) -> MoneyCents {
    self.transaction_type.signed(self.amount)
  }

  /// Whether `agent` created this transaction or is the agent it concerns.
  pub fn is_owned_by(&self, agent: &Agent) -> bool {
    self.created_by == agent.user_id || self.agent_id == Some(agent.id)
  }
}

/// Legacy rule for spotting the seeding issuance by its description.
///
/// Only consulted when the submitter does not say explicitly.
pub fn describes_initial_funding(description: &str) -> bool {
  description.to_lowercase().contains("initial funding")
}

/// Caller input for a new transaction. The book is always the active one.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionInput {
  pub transaction_type:   TransactionType,
  pub amount:             MoneyCents,
  pub receipt_number:     Option<String>,
  pub description:        String,
  pub agent_id:           Option<Uuid>,
  #[serde(default)]
  pub is_initial_funding: Option<bool>,
}

impl TransactionInput {
  pub fn validate(&self) -> Result<()> {
    validate_amount(self.amount)?;
    if self.description.trim().is_empty() {
      return Err(Error::Validation("description is required".into()));
    }
    Ok(())
  }
}

/// Input to [`crate::store::PepiStore::create_transaction`]: a validated
/// submission bound to a book and a creator.
#[derive(Debug, Clone)]
pub struct NewTransaction {
  pub pepi_book_id:       Uuid,
  pub transaction_type:   TransactionType,
  pub amount:             MoneyCents,
  pub receipt_number:     Option<String>,
  pub description:        String,
  pub agent_id:           Option<Uuid>,
  pub is_initial_funding: bool,
  pub created_by:         Uuid,
}

impl NewTransaction {
  pub fn from_input(
    input: TransactionInput,
    pepi_book_id: Uuid,
    created_by: Uuid,
  ) -> Self {
    let is_initial_funding = input.is_initial_funding.unwrap_or_else(|| {
      input.transaction_type == TransactionType::Issuance
        && describes_initial_funding(&input.description)
    });
    Self {
      pepi_book_id,
      transaction_type: input.transaction_type,
      amount: input.amount,
      receipt_number: normalize(input.receipt_number),
      description: input.description.trim().to_owned(),
      agent_id: input.agent_id,
      is_initial_funding,
      created_by,
    }
  }
}

/// Replacement content for an edit. Applying it always restarts review.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionEdit {
  pub transaction_type: TransactionType,
  pub amount:           MoneyCents,
  pub receipt_number:   Option<String>,
  pub description:      String,
  pub agent_id:         Option<Uuid>,
}

impl TransactionEdit {
  pub fn validate(&self) -> Result<()> {
    validate_amount(self.amount)?;
    if self.description.trim().is_empty() {
      return Err(Error::Validation("description is required".into()));
    }
    Ok(())
  }

  /// Apply the edit to `tx`, resetting it to pending and clearing every
  /// review field.
  pub fn apply_to(self, tx: &mut Transaction, at: DateTime<Utc>) {
    tx.transaction_type = self.transaction_type;
    tx.amount = self.amount;
    tx.receipt_number = normalize(self.receipt_number);
    tx.description = self.description.trim().to_owned();
    tx.agent_id = self.agent_id;
    tx.review.reset();
    tx.updated_at = at;
  }
}

/// Filters for [`crate::store::PepiStore::list_transactions`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionQuery {
  pub book_id:          Option<Uuid>,
  pub agent_id:         Option<Uuid>,
  pub status:           Option<ReviewStatus>,
  pub transaction_type: Option<TransactionType>,
}

/// Which transaction kinds a review workflow accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TypeScope {
  #[default]
  Any,
  Only(TransactionType),
}

impl TypeScope {
  pub fn check(self, tx: &Transaction) -> Result<()> {
    match self {
      Self::Only(expected) if expected != tx.transaction_type => {
        Err(Error::TypeMismatch {
          expected: expected.to_string(),
          found:    tx.transaction_type.to_string(),
        })
      }
      _ => Ok(()),
    }
  }
}

pub(crate) fn validate_amount(amount: MoneyCents) -> Result<()> {
  if !amount.is_positive() {
    return Err(Error::Validation("amount must be greater than zero".into()));
  }
  if amount > MoneyCents::MAX_AMOUNT {
    return Err(Error::Validation(format!(
      "amount may not exceed {}",
      MoneyCents::MAX_AMOUNT
    )));
  }
  Ok(())
}

fn normalize(s: Option<String>) -> Option<String> {
  s.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

#[cfg(test)]
pub(crate) mod fixtures {
  use super::*;

  pub fn tx(
    transaction_type: TransactionType,
    dollars: i64,
    status: ReviewStatus,
  ) -> Transaction {
    let now = Utc::now();
    Transaction {
      id: Uuid::new_v4(),
      pepi_book_id: Uuid::nil(),
      transaction_type,
      amount: MoneyCents::dollars(dollars),
      receipt_number: None,
      description: format!("{transaction_type} of {dollars}"),
      agent_id: None,
      is_initial_funding: false,
      review: ReviewFields { status, ..ReviewFields::default() },
      created_by: Uuid::nil(),
      created_at: now,
      updated_at: now,
    }
  }
}
