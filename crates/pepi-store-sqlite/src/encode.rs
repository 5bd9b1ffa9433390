//! Encoding and decoding helpers between domain types and the plain values
//! stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 UTC strings, dates are `YYYY-MM-DD`,
//! money is integer cents, and enum tags are their `strum` string forms.
//! UUIDs are stored as hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use pepi_core::{
  MoneyCents,
  agent::Agent,
  audit::AuditLogEntry,
  book::PepiBook,
  ci_payment::CiPayment,
  fund_request::FundRequest,
  review::ReviewFields,
  transaction::Transaction,
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Parse a stored `strum` tag back into its enum.
fn decode_tag<T: FromStr>(column: &'static str, value: String) -> Result<T> {
  T::from_str(&value).map_err(|_| Error::UnknownTag { column, value })
}

fn review_fields(
  status: String,
  review_notes: Option<String>,
  reviewed_by_user_id: Option<String>,
  reviewed_at: Option<String>,
) -> Result<ReviewFields> {
  Ok(ReviewFields {
    status: decode_tag("status", status)?,
    review_notes,
    reviewed_by_user_id: decode_opt_uuid(reviewed_by_user_id)?,
    reviewed_at: decode_opt_dt(reviewed_at)?,
  })
}

// ─── Agents ──────────────────────────────────────────────────────────────────

pub const AGENT_COLUMNS: &str =
  "id, name, badge_number, email, role, user_id, created_at";

/// Raw values read directly from an `agents` row.
pub struct RawAgent {
  pub id:           String,
  pub name:         String,
  pub badge_number: String,
  pub email:        Option<String>,
  pub role:         String,
  pub user_id:      String,
  pub created_at:   String,
}

impl RawAgent {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      name:         row.get(1)?,
      badge_number: row.get(2)?,
      email:        row.get(3)?,
      role:         row.get(4)?,
      user_id:      row.get(5)?,
      created_at:   row.get(6)?,
    })
  }

  pub fn into_agent(self) -> Result<Agent> {
    Ok(Agent {
      id:           decode_uuid(&self.id)?,
      name:         self.name,
      badge_number: self.badge_number,
      email:        self.email,
      role:         decode_tag("role", self.role)?,
      user_id:      decode_uuid(&self.user_id)?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

// ─── Books ───────────────────────────────────────────────────────────────────

pub const BOOK_COLUMNS: &str = "id, year, starting_amount, is_active, is_closed, \
                                closing_balance, closed_at, created_at";

pub struct RawBook {
  pub id:              String,
  pub year:            i32,
  pub starting_amount: i64,
  pub is_active:       bool,
  pub is_closed:       bool,
  pub closing_balance: Option<i64>,
  pub closed_at:       Option<String>,
  pub created_at:      String,
}

impl RawBook {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      year:            row.get(1)?,
      starting_amount: row.get(2)?,
      is_active:       row.get(3)?,
      is_closed:       row.get(4)?,
      closing_balance: row.get(5)?,
      closed_at:       row.get(6)?,
      created_at:      row.get(7)?,
    })
  }

  pub fn into_book(self) -> Result<PepiBook> {
    Ok(PepiBook {
      id:              decode_uuid(&self.id)?,
      year:            self.year,
      starting_amount: MoneyCents::new(self.starting_amount),
      is_active:       self.is_active,
      is_closed:       self.is_closed,
      closing_balance: self.closing_balance.map(MoneyCents::new),
      closed_at:       decode_opt_dt(self.closed_at)?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

// ─── Transactions ────────────────────────────────────────────────────────────

pub const TRANSACTION_COLUMNS: &str = "id, pepi_book_id, transaction_type, amount, \
                                       receipt_number, description, agent_id, \
                                       is_initial_funding, status, review_notes, \
                                       reviewed_by_user_id, reviewed_at, created_by, \
                                       created_at, updated_at";

pub struct RawTransaction {
  pub id:                  String,
  pub pepi_book_id:        String,
  pub transaction_type:    String,
  pub amount:              i64,
  pub receipt_number:      Option<String>,
  pub description:         String,
  pub agent_id:            Option<String>,
  pub is_initial_funding:  bool,
  pub status:              String,
  pub review_notes:        Option<String>,
  pub reviewed_by_user_id: Option<String>,
  pub reviewed_at:         Option<String>,
  pub created_by:          String,
  pub created_at:          String,
  pub updated_at:          String,
}

impl RawTransaction {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                  row.get(0)?,
      pepi_book_id:        row.get(1)?,
      transaction_type:    row.get(2)?,
      amount:              row.get(3)?,
      receipt_number:      row.get(4)?,
      description:         row.get(5)?,
      agent_id:            row.get(6)?,
      is_initial_funding:  row.get(7)?,
      status:              row.get(8)?,
      review_notes:        row.get(9)?,
      reviewed_by_user_id: row.get(10)?,
      reviewed_at:         row.get(11)?,
      created_by:          row.get(12)?,
      created_at:          row.get(13)?,
      updated_at:          row.get(14)?,
    })
  }

  pub fn into_transaction(self) -> Result<Transaction> {
    Ok(Transaction {
      id:                 decode_uuid(&self.id)?,
      pepi_book_id:       decode_uuid(&self.pepi_book_id)?,
      transaction_type:   decode_tag("transaction_type", self.transaction_type)?,
      amount:             MoneyCents::new(self.amount),
      receipt_number:     self.receipt_number,
      description:        self.description,
      agent_id:           decode_opt_uuid(self.agent_id)?,
      is_initial_funding: self.is_initial_funding,
      review:             review_fields(
        self.status,
        self.review_notes,
        self.reviewed_by_user_id,
        self.reviewed_at,
      )?,
      created_by:         decode_uuid(&self.created_by)?,
      created_at:         decode_dt(&self.created_at)?,
      updated_at:         decode_dt(&self.updated_at)?,
    })
  }
}

// ─── CI payments ─────────────────────────────────────────────────────────────

pub const CI_PAYMENT_COLUMNS: &str = "id, pepi_book_id, paying_agent_id, informant_code, \
                                      case_number, purpose, amount, receipt_number, \
                                      payment_date, ci_signature, paying_agent_signature, \
                                      witness_signature, commander_signature, status, \
                                      review_notes, reviewed_by_user_id, reviewed_at, \
                                      created_by, created_at, updated_at";

pub struct RawCiPayment {
  pub id:                     String,
  pub pepi_book_id:           String,
  pub paying_agent_id:        String,
  pub informant_code:         String,
  pub case_number:            Option<String>,
  pub purpose:                String,
  pub amount:                 i64,
  pub receipt_number:         Option<String>,
  pub payment_date:           String,
  pub ci_signature:           Option<String>,
  pub paying_agent_signature: Option<String>,
  pub witness_signature:      Option<String>,
  pub commander_signature:    Option<String>,
  pub status:                 String,
  pub review_notes:           Option<String>,
  pub reviewed_by_user_id:    Option<String>,
  pub reviewed_at:            Option<String>,
  pub created_by:             String,
  pub created_at:             String,
  pub updated_at:             String,
}

impl RawCiPayment {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                     row.get(0)?,
      pepi_book_id:           row.get(1)?,
      paying_agent_id:        row.get(2)?,
      informant_code:         row.get(3)?,
      case_number:            row.get(4)?,
      purpose:                row.get(5)?,
      amount:                 row.get(6)?,
      receipt_number:         row.get(7)?,
      payment_date:           row.get(8)?,
      ci_signature:           row.get(9)?,
      paying_agent_signature: row.get(10)?,
      witness_signature:      row.get(11)?,
      commander_signature:    row.get(12)?,
      status:                 row.get(13)?,
      review_notes:           row.get(14)?,
      reviewed_by_user_id:    row.get(15)?,
      reviewed_at:            row.get(16)?,
      created_by:             row.get(17)?,
      created_at:             row.get(18)?,
      updated_at:             row.get(19)?,
    })
  }

  pub fn into_ci_payment(self) -> Result<CiPayment> {
    Ok(CiPayment {
      id:                     decode_uuid(&self.id)?,
      pepi_book_id:           decode_uuid(&self.pepi_book_id)?,
      paying_agent_id:        decode_uuid(&self.paying_agent_id)?,
      informant_code:         self.informant_code,
      case_number:            self.case_number,
      purpose:                self.purpose,
      amount:                 MoneyCents::new(self.amount),
      receipt_number:         self.receipt_number,
      payment_date:           decode_date(&self.payment_date)?,
      ci_signature:           self.ci_signature,
      paying_agent_signature: self.paying_agent_signature,
      witness_signature:      self.witness_signature,
      commander_signature:    self.commander_signature,
      review:                 review_fields(
        self.status,
        self.review_notes,
        self.reviewed_by_user_id,
        self.reviewed_at,
      )?,
      created_by:             decode_uuid(&self.created_by)?,
      created_at:             decode_dt(&self.created_at)?,
      updated_at:             decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Fund requests ───────────────────────────────────────────────────────────

pub const FUND_REQUEST_COLUMNS: &str = "id, pepi_book_id, agent_id, amount, purpose, \
                                        status, review_notes, reviewed_by_user_id, \
                                        reviewed_at, created_at, updated_at";

pub struct RawFundRequest {
  pub id:                  String,
  pub pepi_book_id:        String,
  pub agent_id:            String,
  pub amount:              i64,
  pub purpose:             String,
  pub status:              String,
  pub review_notes:        Option<String>,
  pub reviewed_by_user_id: Option<String>,
  pub reviewed_at:         Option<String>,
  pub created_at:          String,
  pub updated_at:          String,
}

impl RawFundRequest {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                  row.get(0)?,
      pepi_book_id:        row.get(1)?,
      agent_id:            row.get(2)?,
      amount:              row.get(3)?,
      purpose:             row.get(4)?,
      status:              row.get(5)?,
      review_notes:        row.get(6)?,
      reviewed_by_user_id: row.get(7)?,
      reviewed_at:         row.get(8)?,
      created_at:          row.get(9)?,
      updated_at:          row.get(10)?,
    })
  }

  pub fn into_fund_request(self) -> Result<FundRequest> {
    Ok(FundRequest {
      id:           decode_uuid(&self.id)?,
      pepi_book_id: decode_uuid(&self.pepi_book_id)?,
      agent_id:     decode_uuid(&self.agent_id)?,
      amount:       MoneyCents::new(self.amount),
      purpose:      self.purpose,
      review:       review_fields(
        self.status,
        self.review_notes,
        self.reviewed_by_user_id,
        self.reviewed_at,
      )?,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Audit log ───────────────────────────────────────────────────────────────

pub const AUDIT_COLUMNS: &str =
  "id, user_id, ip_address, action, entity_type, entity_id, details, created_at";

pub struct RawAuditEntry {
  pub id:          String,
  pub user_id:     Option<String>,
  pub ip_address:  Option<String>,
  pub action:      String,
  pub entity_type: Option<String>,
  pub entity_id:   Option<String>,
  pub details:     String,
  pub created_at:  String,
}

impl RawAuditEntry {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      user_id:     row.get(1)?,
      ip_address:  row.get(2)?,
      action:      row.get(3)?,
      entity_type: row.get(4)?,
      entity_id:   row.get(5)?,
      details:     row.get(6)?,
      created_at:  row.get(7)?,
    })
  }

  pub fn into_entry(self) -> Result<AuditLogEntry> {
    Ok(AuditLogEntry {
      id:          decode_uuid(&self.id)?,
      user_id:     decode_opt_uuid(self.user_id)?,
      ip_address:  self.ip_address,
      action:      decode_tag("action", self.action)?,
      entity_type: self.entity_type,
      entity_id:   decode_opt_uuid(self.entity_id)?,
      details:     serde_json::from_str(&self.details)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = DateTime::parse_from_rfc3339("2025-03-01T09:00:00Z")
      .unwrap()
      .with_timezone(&Utc);
    let b = a + chrono::Duration::nanoseconds(1_500);
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(encode_dt(a).len(), encode_dt(b).len());
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn unknown_tags_are_reported_with_their_column() {
    let err = decode_tag::<pepi_core::review::ReviewStatus>("status", "limbo".into())
      .unwrap_err();
    assert!(matches!(err, Error::UnknownTag { column: "status", .. }));
  }
}
