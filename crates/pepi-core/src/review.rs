//! The review state machine shared by transactions, CI payments and fund
//! requests.
//!
//! ```text
//!            approve
//!   pending ─────────▶ approved
//!      │  ▲
//!      │  └──── edit (from any state, book open)
//!      │ reject
//!      ▼
//!   rejected
//! ```
//!
//! `approved` and `rejected` are terminal for a review cycle; only an edit
//! starts a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReviewStatus {
  #[default]
  Pending,
  Approved,
  Rejected,
}

impl ReviewStatus {
  pub fn is_terminal(self) -> bool { !matches!(self, Self::Pending) }

  /// Whether a review may move an entity from `self` to `to`.
  ///
  /// Edits are not reviews and are handled by [`ReviewFields::reset`].
  pub fn can_review_to(self, to: ReviewStatus) -> bool {
    matches!(
      (self, to),
      (Self::Pending, Self::Approved) | (Self::Pending, Self::Rejected)
    )
  }
}

/// An admin's verdict on a pending item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
  Approve,
  Reject { reason: Option<String> },
}

impl Decision {
  pub fn target_status(&self) -> ReviewStatus {
    match self {
      Self::Approve => ReviewStatus::Approved,
      Self::Reject { .. } => ReviewStatus::Rejected,
    }
  }

  pub fn verb(&self) -> &'static str {
    match self {
      Self::Approve => "approved",
      Self::Reject { .. } => "rejected",
    }
  }

  /// Build the review record written by the conditional update.
  pub fn into_review(self, reviewer: Uuid, at: DateTime<Utc>) -> Review {
    let status = self.target_status();
    let notes = match self {
      Self::Approve => None,
      Self::Reject { reason } => {
        reason.map(|r| r.trim().to_owned()).filter(|r| !r.is_empty())
      }
    };
    Review { status, reviewed_by: reviewer, reviewed_at: at, notes }
  }
}

/// The fields a successful review writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
  pub status:      ReviewStatus,
  pub reviewed_by: Uuid,
  pub reviewed_at: DateTime<Utc>,
  pub notes:       Option<String>,
}

/// Review metadata as carried on an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFields {
  pub status:              ReviewStatus,
  pub review_notes:        Option<String>,
  pub reviewed_by_user_id: Option<Uuid>,
  pub reviewed_at:         Option<DateTime<Utc>>,
}

impl ReviewFields {
  /// Start a new review cycle: back to pending with no prior verdict.
  pub fn reset(&mut self) { *self = Self::default(); }

  pub fn apply(&mut self, review: &Review) {
    self.status = review.status;
    self.review_notes = review.notes.clone();
    self.reviewed_by_user_id = Some(review.reviewed_by);
    self.reviewed_at = Some(review.reviewed_at);
  }
}

/// Guard for every review: the entity must still be pending.
pub fn ensure_pending(
  entity: &'static str,
  id: Uuid,
  status: ReviewStatus,
) -> Result<()> {
  if status.is_terminal() {
    return Err(Error::InvalidState(format!(
      "{entity} {id} already processed ({status})"
    )));
  }
  Ok(())
}
