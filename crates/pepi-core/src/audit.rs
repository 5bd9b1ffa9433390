//! Append-only audit log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// The event an audit entry records. The string form is the stored tag.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
  AgentRegistered,
  AgentRoleChanged,
  BookCreated,
  BookActivated,
  BookDeactivated,
  BookClosed,
  BookReset,
  TransactionCreated,
  TransactionEdited,
  TransactionDeleted,
  TransactionApproved,
  TransactionRejected,
  CiPaymentCreated,
  CiPaymentApproved,
  CiPaymentRejected,
  FundRequestCreated,
  FundRequestApproved,
  FundRequestRejected,
}

/// A persisted audit record. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
  pub id:          Uuid,
  /// `None` for system events.
  pub user_id:     Option<Uuid>,
  pub ip_address:  Option<String>,
  pub action:      AuditAction,
  pub entity_type: Option<String>,
  pub entity_id:   Option<Uuid>,
  pub details:     serde_json::Value,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::PepiStore::append_audit`].
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
  pub user_id:     Option<Uuid>,
  pub ip_address:  Option<String>,
  pub action:      AuditAction,
  pub entity_type: Option<String>,
  pub entity_id:   Option<Uuid>,
  pub details:     serde_json::Value,
}

impl NewAuditEntry {
  pub fn new(action: AuditAction, entity_type: &str, entity_id: Uuid) -> Self {
    Self {
      user_id: None,
      ip_address: None,
      action,
      entity_type: Some(entity_type.to_owned()),
      entity_id: Some(entity_id),
      details: serde_json::Value::Null,
    }
  }

  pub fn by(mut self, user_id: Uuid, ip_address: Option<String>) -> Self {
    self.user_id = Some(user_id);
    self.ip_address = ip_address;
    self
  }

  pub fn details(mut self, details: serde_json::Value) -> Self {
    self.details = details;
    self
  }
}

/// Filters for [`crate::store::PepiStore::list_audit`]; newest first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
  pub action:      Option<AuditAction>,
  pub entity_type: Option<String>,
  pub entity_id:   Option<Uuid>,
  pub user_id:     Option<Uuid>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}
