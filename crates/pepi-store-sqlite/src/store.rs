//! [`SqliteStore`]: the SQLite implementation of [`PepiStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use pepi_core::{
  ledger,
  agent::{Agent, NewAgent, Role},
  audit::{AuditLogEntry, AuditQuery, NewAuditEntry},
  book::{NewBook, PepiBook, ResetCounts},
  ci_payment::{CiPayment, NewCiPayment},
  fund_request::{FundRequest, NewFundRequest},
  review::{Review, ReviewFields, ReviewStatus},
  store::PepiStore,
  transaction::{NewTransaction, Transaction, TransactionQuery},
};
use rusqlite::{OptionalExtension as _, Row, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    AGENT_COLUMNS, AUDIT_COLUMNS, BOOK_COLUMNS, CI_PAYMENT_COLUMNS,
    FUND_REQUEST_COLUMNS, RawAgent, RawAuditEntry, RawBook, RawCiPayment,
    RawFundRequest, RawTransaction, TRANSACTION_COLUMNS, encode_date, encode_dt,
    encode_uuid,
  },
  schema::SCHEMA,
};

const DEFAULT_AUDIT_LIMIT: usize = 100;

/// `WHERE` fragment: the row's book exists and is not closed.
fn book_open(table: &str) -> String {
  format!(
    "EXISTS (SELECT 1 FROM pepi_books b WHERE b.id = {table}.pepi_book_id AND b.is_closed = 0)"
  )
}

/// `WHERE` fragment for inserts: the book bound to `param` is active and not
/// closed.
fn book_accepts_entries(param: &str) -> String {
  format!(
    "EXISTS (SELECT 1 FROM pepi_books b WHERE b.id = {param} AND b.is_active = 1 AND b.is_closed = 0)"
  )
}

type RowMapper<R> = fn(&Row<'_>) -> rusqlite::Result<R>;

// ─── Synchronous helpers (run inside `Connection::call`) ─────────────────────

fn fetch_book(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<RawBook>> {
  conn
    .query_row(
      &format!("SELECT {BOOK_COLUMNS} FROM pepi_books WHERE id = ?1"),
      [id],
      RawBook::from_row,
    )
    .optional()
}

fn fetch_transaction(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<RawTransaction>> {
  conn
    .query_row(
      &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
      [id],
      RawTransaction::from_row,
    )
    .optional()
}

fn fetch_ci_payment(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<RawCiPayment>> {
  conn
    .query_row(
      &format!("SELECT {CI_PAYMENT_COLUMNS} FROM ci_payments WHERE id = ?1"),
      [id],
      RawCiPayment::from_row,
    )
    .optional()
}

fn fetch_fund_request(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<RawFundRequest>> {
  conn
    .query_row(
      &format!("SELECT {FUND_REQUEST_COLUMNS} FROM fund_requests WHERE id = ?1"),
      [id],
      RawFundRequest::from_row,
    )
    .optional()
}

/// Build `WHERE a = ?1 AND b = ?2 ...` from the filters that are set.
fn where_clause(filters: Vec<(&'static str, Option<String>)>) -> (String, Vec<String>) {
  let mut conds = Vec::new();
  let mut params = Vec::new();
  for (column, value) in filters {
    if let Some(value) = value {
      params.push(value);
      conds.push(format!("{column} = ?{}", params.len()));
    }
  }
  let clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };
  (clause, params)
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A PEPI store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_one<R: Send + 'static>(
    &self,
    sql: String,
    param: String,
    map: RowMapper<R>,
  ) -> Result<Option<R>> {
    Ok(
      self
        .conn
        .call(move |conn| Ok(conn.query_row(&sql, [param], map).optional()?))
        .await?,
    )
  }

  async fn fetch_all<R: Send + 'static>(
    &self,
    sql: String,
    params: Vec<String>,
    map: RowMapper<R>,
  ) -> Result<Vec<R>> {
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(&sql)?;
          let rows = stmt
            .query_map(rusqlite::params_from_iter(params), map)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }
}

// ─── PepiStore impl ──────────────────────────────────────────────────────────

impl PepiStore for SqliteStore {
  type Error = Error;

  // ── Agents ────────────────────────────────────────────────────────────────

  async fn add_agent(&self, input: NewAgent) -> Result<Agent> {
    let agent = Agent {
      id:           Uuid::new_v4(),
      name:         input.name,
      badge_number: input.badge_number,
      email:        input.email,
      role:         input.role,
      user_id:      input.user_id,
      created_at:   Utc::now(),
    };

    let id_str      = encode_uuid(agent.id);
    let name        = agent.name.clone();
    let badge       = agent.badge_number.clone();
    let email       = agent.email.clone();
    let role_str    = agent.role.as_ref().to_owned();
    let user_id_str = encode_uuid(agent.user_id);
    let at_str      = encode_dt(agent.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO agents (id, name, badge_number, email, role, user_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![id_str, name, badge, email, role_str, user_id_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(agent)
  }

  async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>> {
    self
      .fetch_one(
        format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
        encode_uuid(id),
        RawAgent::from_row,
      )
      .await?
      .map(RawAgent::into_agent)
      .transpose()
  }

  async fn get_agent_by_user(&self, user_id: Uuid) -> Result<Option<Agent>> {
    self
      .fetch_one(
        format!("SELECT {AGENT_COLUMNS} FROM agents WHERE user_id = ?1"),
        encode_uuid(user_id),
        RawAgent::from_row,
      )
      .await?
      .map(RawAgent::into_agent)
      .transpose()
  }

  async fn list_agents(&self) -> Result<Vec<Agent>> {
    self
      .fetch_all(
        format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY name, badge_number"),
        vec![],
        RawAgent::from_row,
      )
      .await?
      .into_iter()
      .map(RawAgent::into_agent)
      .collect()
  }

  async fn set_agent_role(&self, id: Uuid, role: Role) -> Result<Option<Agent>> {
    let id_str = encode_uuid(id);
    let role_str = role.as_ref().to_owned();

    let raw: Option<RawAgent> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE agents SET role = ?2 WHERE id = ?1",
          rusqlite::params![id_str, role_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(
          conn
            .query_row(
              &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
              [&id_str],
              RawAgent::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAgent::into_agent).transpose()
  }

  // ── Books ─────────────────────────────────────────────────────────────────

  async fn create_book(&self, input: NewBook) -> Result<PepiBook> {
    let book = PepiBook {
      id:              Uuid::new_v4(),
      year:            input.year,
      starting_amount: input.starting_amount,
      is_active:       input.activate,
      is_closed:       false,
      closing_balance: None,
      closed_at:       None,
      created_at:      Utc::now(),
    };

    let id_str   = encode_uuid(book.id);
    let year     = book.year;
    let starting = book.starting_amount.cents();
    let activate = book.is_active;
    let at_str   = encode_dt(book.created_at);

    self
      .conn
      .call(move |conn| {
        let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if activate {
          txn.execute("UPDATE pepi_books SET is_active = 0 WHERE is_active = 1", [])?;
        }
        txn.execute(
          "INSERT INTO pepi_books (id, year, starting_amount, is_active, is_closed, created_at)
           VALUES (?1, ?2, ?3, ?4, 0, ?5)",
          rusqlite::params![id_str, year, starting, activate, at_str],
        )?;
        txn.commit()?;
        Ok(())
      })
      .await?;

    Ok(book)
  }

  async fn get_book(&self, id: Uuid) -> Result<Option<PepiBook>> {
    self
      .fetch_one(
        format!("SELECT {BOOK_COLUMNS} FROM pepi_books WHERE id = ?1"),
        encode_uuid(id),
        RawBook::from_row,
      )
      .await?
      .map(RawBook::into_book)
      .transpose()
  }

  async fn list_books(&self) -> Result<Vec<PepiBook>> {
    self
      .fetch_all(
        format!("SELECT {BOOK_COLUMNS} FROM pepi_books ORDER BY year DESC, created_at DESC"),
        vec![],
        RawBook::from_row,
      )
      .await?
      .into_iter()
      .map(RawBook::into_book)
      .collect()
  }

  async fn active_book(&self) -> Result<Option<PepiBook>> {
    let raws = self
      .fetch_all(
        format!("SELECT {BOOK_COLUMNS} FROM pepi_books WHERE is_active = 1"),
        vec![],
        RawBook::from_row,
      )
      .await?;
    raws.into_iter().next().map(RawBook::into_book).transpose()
  }

  async fn activate_book(&self, id: Uuid) -> Result<Option<PepiBook>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawBook> = self
      .conn
      .call(move |conn| {
        let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let is_closed: Option<bool> = txn
          .query_row(
            "SELECT is_closed FROM pepi_books WHERE id = ?1",
            [&id_str],
            |r| r.get(0),
          )
          .optional()?;
        if is_closed != Some(false) {
          return Ok(None);
        }
        txn.execute(
          "UPDATE pepi_books SET is_active = 0 WHERE is_active = 1 AND id != ?1",
          [&id_str],
        )?;
        txn.execute(
          "UPDATE pepi_books SET is_active = 1 WHERE id = ?1 AND is_closed = 0",
          [&id_str],
        )?;
        let raw = fetch_book(&txn, &id_str)?;
        txn.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawBook::into_book).transpose()
  }

  async fn deactivate_book(&self, id: Uuid) -> Result<Option<PepiBook>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawBook> = self
      .conn
      .call(move |conn| {
        conn.execute("UPDATE pepi_books SET is_active = 0 WHERE id = ?1", [&id_str])?;
        Ok(fetch_book(conn, &id_str)?)
      })
      .await?;

    raw.map(RawBook::into_book).transpose()
  }

  async fn close_book(
    &self,
    id: Uuid,
    closed_at: DateTime<Utc>,
  ) -> Result<Option<PepiBook>> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(closed_at);

    let raw: Option<RawBook> = self
      .conn
      .call(move |conn| {
        // Immediate: no review can commit between the balance and the freeze.
        let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(raw) = fetch_book(&txn, &id_str)? else {
          return Ok(None);
        };
        if !raw.is_active || raw.is_closed {
          return Ok(None);
        }
        let book = raw.into_book().map_err(Error::into_call)?;

        let mut stmt = txn.prepare(&format!(
          "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE pepi_book_id = ?1"
        ))?;
        let txs = stmt
          .query_map([&id_str], RawTransaction::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?
          .into_iter()
          .map(RawTransaction::into_transaction)
          .collect::<Result<Vec<_>>>()
          .map_err(Error::into_call)?;
        drop(stmt);

        let closing = ledger::balance(book.starting_amount, &txs);
        let changed = txn.execute(
          "UPDATE pepi_books
           SET is_closed = 1, is_active = 0, closing_balance = ?2, closed_at = ?3
           WHERE id = ?1 AND is_active = 1 AND is_closed = 0",
          rusqlite::params![id_str, closing.cents(), at_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        let raw = fetch_book(&txn, &id_str)?;
        txn.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawBook::into_book).transpose()
  }

  async fn reset_book(&self, id: Uuid) -> Result<Option<ResetCounts>> {
    let id_str = encode_uuid(id);

    let deleted = self
      .conn
      .call(move |conn| {
        let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let resettable = txn
          .query_row(
            "SELECT 1 FROM pepi_books WHERE id = ?1 AND is_active = 1 AND is_closed = 0",
            [&id_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !resettable {
          return Ok(None);
        }
        let transactions =
          txn.execute("DELETE FROM transactions WHERE pepi_book_id = ?1", [&id_str])?;
        let ci_payments =
          txn.execute("DELETE FROM ci_payments WHERE pepi_book_id = ?1", [&id_str])?;
        let fund_requests =
          txn.execute("DELETE FROM fund_requests WHERE pepi_book_id = ?1", [&id_str])?;
        txn.commit()?;
        Ok(Some((transactions, ci_payments, fund_requests)))
      })
      .await?;

    Ok(deleted.map(|(transactions, ci_payments, fund_requests)| ResetCounts {
      transactions:  transactions as u64,
      ci_payments:   ci_payments as u64,
      fund_requests: fund_requests as u64,
    }))
  }

  // ── Transactions ──────────────────────────────────────────────────────────

  async fn create_transaction(
    &self,
    input: NewTransaction,
  ) -> Result<Option<Transaction>> {
    let now = Utc::now();
    let tx = Transaction {
      id:                 Uuid::new_v4(),
      pepi_book_id:       input.pepi_book_id,
      transaction_type:   input.transaction_type,
      amount:             input.amount,
      receipt_number:     input.receipt_number,
      description:        input.description,
      agent_id:           input.agent_id,
      is_initial_funding: input.is_initial_funding,
      review:             ReviewFields::default(),
      created_by:         input.created_by,
      created_at:         now,
      updated_at:         now,
    };

    let id_str      = encode_uuid(tx.id);
    let book_str    = encode_uuid(tx.pepi_book_id);
    let kind        = tx.transaction_type.as_ref().to_owned();
    let amount      = tx.amount.cents();
    let receipt     = tx.receipt_number.clone();
    let description = tx.description.clone();
    let agent_str   = tx.agent_id.map(encode_uuid);
    let initial     = tx.is_initial_funding;
    let status      = tx.review.status.as_ref().to_owned();
    let creator     = encode_uuid(tx.created_by);
    let at_str      = encode_dt(now);

    let inserted = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          &format!(
            "INSERT INTO transactions (
               id, pepi_book_id, transaction_type, amount, receipt_number,
               description, agent_id, is_initial_funding, status,
               created_by, created_at, updated_at
             ) SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11
             WHERE {}",
            book_accepts_entries("?2")
          ),
          rusqlite::params![
            id_str,
            book_str,
            kind,
            amount,
            receipt,
            description,
            agent_str,
            initial,
            status,
            creator,
            at_str,
          ],
        )?;
        Ok(changed > 0)
      })
      .await?;

    Ok(inserted.then_some(tx))
  }

  async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
    self
      .fetch_one(
        format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
        encode_uuid(id),
        RawTransaction::from_row,
      )
      .await?
      .map(RawTransaction::into_transaction)
      .transpose()
  }

  async fn list_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>> {
    let (clause, params) = where_clause(vec![
      ("pepi_book_id", query.book_id.map(encode_uuid)),
      ("agent_id", query.agent_id.map(encode_uuid)),
      ("status", query.status.map(|s| s.as_ref().to_owned())),
      ("transaction_type", query.transaction_type.map(|t| t.as_ref().to_owned())),
    ]);

    self
      .fetch_all(
        format!(
          "SELECT {TRANSACTION_COLUMNS} FROM transactions {clause} ORDER BY created_at, id"
        ),
        params,
        RawTransaction::from_row,
      )
      .await?
      .into_iter()
      .map(RawTransaction::into_transaction)
      .collect()
  }

  async fn replace_transaction(&self, tx: Transaction) -> Result<Option<Transaction>> {
    let id_str      = encode_uuid(tx.id);
    let kind        = tx.transaction_type.as_ref().to_owned();
    let amount      = tx.amount.cents();
    let receipt     = tx.receipt_number;
    let description = tx.description;
    let agent_str   = tx.agent_id.map(encode_uuid);
    let status      = tx.review.status.as_ref().to_owned();
    let notes       = tx.review.review_notes;
    let reviewer    = tx.review.reviewed_by_user_id.map(encode_uuid);
    let reviewed_at = tx.review.reviewed_at.map(encode_dt);
    let updated_at  = encode_dt(tx.updated_at);
    let guard       = book_open("transactions");

    let raw: Option<RawTransaction> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          &format!(
            "UPDATE transactions
             SET transaction_type = ?2, amount = ?3, receipt_number = ?4,
                 description = ?5, agent_id = ?6, status = ?7, review_notes = ?8,
                 reviewed_by_user_id = ?9, reviewed_at = ?10, updated_at = ?11
             WHERE id = ?1 AND {guard}"
          ),
          rusqlite::params![
            id_str,
            kind,
            amount,
            receipt,
            description,
            agent_str,
            status,
            notes,
            reviewer,
            reviewed_at,
            updated_at,
          ],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(fetch_transaction(conn, &id_str)?)
      })
      .await?;

    raw.map(RawTransaction::into_transaction).transpose()
  }

  async fn delete_pending_transaction(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let guard = book_open("transactions");

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          &format!(
            "DELETE FROM transactions WHERE id = ?1 AND status = 'pending' AND {guard}"
          ),
          [&id_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  async fn review_transaction(&self, id: Uuid, review: Review) -> Result<Option<Transaction>> {
    let id_str   = encode_uuid(id);
    let status   = review.status.as_ref().to_owned();
    let notes    = review.notes;
    let reviewer = encode_uuid(review.reviewed_by);
    let at_str   = encode_dt(review.reviewed_at);
    let pending  = ReviewStatus::Pending.as_ref().to_owned();
    let guard    = book_open("transactions");

    let raw: Option<RawTransaction> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          &format!(
            "UPDATE transactions
             SET status = ?2, review_notes = ?3, reviewed_by_user_id = ?4,
                 reviewed_at = ?5, updated_at = ?5
             WHERE id = ?1 AND status = ?6 AND {guard}"
          ),
          rusqlite::params![id_str, status, notes, reviewer, at_str, pending],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(fetch_transaction(conn, &id_str)?)
      })
      .await?;

    raw.map(RawTransaction::into_transaction).transpose()
  }

  // ── CI payments ───────────────────────────────────────────────────────────

  async fn create_ci_payment(&self, input: NewCiPayment) -> Result<Option<CiPayment>> {
    let now = Utc::now();
    let NewCiPayment { pepi_book_id, paying_agent_id, input, created_by } = input;
    let payment = CiPayment {
      id: Uuid::new_v4(),
      pepi_book_id,
      paying_agent_id,
      informant_code: input.informant_code.trim().to_owned(),
      case_number: input.case_number,
      purpose: input.purpose.trim().to_owned(),
      amount: input.amount,
      receipt_number: input.receipt_number,
      payment_date: input.payment_date,
      ci_signature: input.ci_signature,
      paying_agent_signature: input.paying_agent_signature,
      witness_signature: input.witness_signature,
      commander_signature: None,
      review: ReviewFields::default(),
      created_by,
      created_at: now,
      updated_at: now,
    };

    let id_str    = encode_uuid(payment.id);
    let book_str  = encode_uuid(payment.pepi_book_id);
    let agent_str = encode_uuid(payment.paying_agent_id);
    let code      = payment.informant_code.clone();
    let case      = payment.case_number.clone();
    let purpose   = payment.purpose.clone();
    let amount    = payment.amount.cents();
    let receipt   = payment.receipt_number.clone();
    let date_str  = encode_date(payment.payment_date);
    let ci_sig    = payment.ci_signature.clone();
    let agent_sig = payment.paying_agent_signature.clone();
    let wit_sig   = payment.witness_signature.clone();
    let status    = payment.review.status.as_ref().to_owned();
    let creator   = encode_uuid(payment.created_by);
    let at_str    = encode_dt(now);

    let inserted = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          &format!(
            "INSERT INTO ci_payments (
               id, pepi_book_id, paying_agent_id, informant_code, case_number,
               purpose, amount, receipt_number, payment_date, ci_signature,
               paying_agent_signature, witness_signature, status,
               created_by, created_at, updated_at
             ) SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15
             WHERE {}",
            book_accepts_entries("?2")
          ),
          rusqlite::params![
            id_str, book_str, agent_str, code, case, purpose, amount, receipt,
            date_str, ci_sig, agent_sig, wit_sig, status, creator, at_str,
          ],
        )?;
        Ok(changed > 0)
      })
      .await?;

    Ok(inserted.then_some(payment))
  }

  async fn get_ci_payment(&self, id: Uuid) -> Result<Option<CiPayment>> {
    self
      .fetch_one(
        format!("SELECT {CI_PAYMENT_COLUMNS} FROM ci_payments WHERE id = ?1"),
        encode_uuid(id),
        RawCiPayment::from_row,
      )
      .await?
      .map(RawCiPayment::into_ci_payment)
      .transpose()
  }

  async fn list_ci_payments(&self, book_id: Option<Uuid>) -> Result<Vec<CiPayment>> {
    let (clause, params) = where_clause(vec![("pepi_book_id", book_id.map(encode_uuid))]);

    self
      .fetch_all(
        format!(
          "SELECT {CI_PAYMENT_COLUMNS} FROM ci_payments {clause}
           ORDER BY payment_date, created_at, id"
        ),
        params,
        RawCiPayment::from_row,
      )
      .await?
      .into_iter()
      .map(RawCiPayment::into_ci_payment)
      .collect()
  }

  async fn review_ci_payment(
    &self,
    id: Uuid,
    review: Review,
    commander_signature: Option<String>,
  ) -> Result<Option<CiPayment>> {
    let id_str   = encode_uuid(id);
    let status   = review.status.as_ref().to_owned();
    let notes    = review.notes;
    let reviewer = encode_uuid(review.reviewed_by);
    let at_str   = encode_dt(review.reviewed_at);
    let pending  = ReviewStatus::Pending.as_ref().to_owned();
    let guard    = book_open("ci_payments");

    let raw: Option<RawCiPayment> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          &format!(
            "UPDATE ci_payments
             SET status = ?2, review_notes = ?3, reviewed_by_user_id = ?4,
                 reviewed_at = ?5, updated_at = ?5,
                 commander_signature = COALESCE(?7, commander_signature)
             WHERE id = ?1 AND status = ?6 AND {guard}"
          ),
          rusqlite::params![
            id_str,
            status,
            notes,
            reviewer,
            at_str,
            pending,
            commander_signature,
          ],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(fetch_ci_payment(conn, &id_str)?)
      })
      .await?;

    raw.map(RawCiPayment::into_ci_payment).transpose()
  }

  // ── Fund requests ─────────────────────────────────────────────────────────

  async fn create_fund_request(
    &self,
    input: NewFundRequest,
  ) -> Result<Option<FundRequest>> {
    let now = Utc::now();
    let request = FundRequest {
      id:           Uuid::new_v4(),
      pepi_book_id: input.pepi_book_id,
      agent_id:     input.agent_id,
      amount:       input.amount,
      purpose:      input.purpose,
      review:       ReviewFields::default(),
      created_at:   now,
      updated_at:   now,
    };

    let id_str    = encode_uuid(request.id);
    let book_str  = encode_uuid(request.pepi_book_id);
    let agent_str = encode_uuid(request.agent_id);
    let amount    = request.amount.cents();
    let purpose   = request.purpose.clone();
    let status    = request.review.status.as_ref().to_owned();
    let at_str    = encode_dt(now);

    let inserted = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          &format!(
            "INSERT INTO fund_requests (
               id, pepi_book_id, agent_id, amount, purpose, status, created_at, updated_at
             ) SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7
             WHERE {}",
            book_accepts_entries("?2")
          ),
          rusqlite::params![id_str, book_str, agent_str, amount, purpose, status, at_str],
        )?;
        Ok(changed > 0)
      })
      .await?;

    Ok(inserted.then_some(request))
  }

  async fn get_fund_request(&self, id: Uuid) -> Result<Option<FundRequest>> {
    self
      .fetch_one(
        format!("SELECT {FUND_REQUEST_COLUMNS} FROM fund_requests WHERE id = ?1"),
        encode_uuid(id),
        RawFundRequest::from_row,
      )
      .await?
      .map(RawFundRequest::into_fund_request)
      .transpose()
  }

  async fn list_fund_requests(
    &self,
    book_id: Option<Uuid>,
    agent_id: Option<Uuid>,
  ) -> Result<Vec<FundRequest>> {
    let (clause, params) = where_clause(vec![
      ("pepi_book_id", book_id.map(encode_uuid)),
      ("agent_id", agent_id.map(encode_uuid)),
    ]);

    self
      .fetch_all(
        format!(
          "SELECT {FUND_REQUEST_COLUMNS} FROM fund_requests {clause} ORDER BY created_at, id"
        ),
        params,
        RawFundRequest::from_row,
      )
      .await?
      .into_iter()
      .map(RawFundRequest::into_fund_request)
      .collect()
  }

  async fn review_fund_request(
    &self,
    id: Uuid,
    review: Review,
  ) -> Result<Option<FundRequest>> {
    let id_str   = encode_uuid(id);
    let status   = review.status.as_ref().to_owned();
    let notes    = review.notes;
    let reviewer = encode_uuid(review.reviewed_by);
    let at_str   = encode_dt(review.reviewed_at);
    let pending  = ReviewStatus::Pending.as_ref().to_owned();
    let guard    = book_open("fund_requests");

    let raw: Option<RawFundRequest> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          &format!(
            "UPDATE fund_requests
             SET status = ?2, review_notes = ?3, reviewed_by_user_id = ?4,
                 reviewed_at = ?5, updated_at = ?5
             WHERE id = ?1 AND status = ?6 AND {guard}"
          ),
          rusqlite::params![id_str, status, notes, reviewer, at_str, pending],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(fetch_fund_request(conn, &id_str)?)
      })
      .await?;

    raw.map(RawFundRequest::into_fund_request).transpose()
  }

  // ── Audit log (append-only) ────────────────────────────────────────────

  async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
    let record = AuditLogEntry {
      id:          Uuid::new_v4(),
      user_id:     entry.user_id,
      ip_address:  entry.ip_address,
      action:      entry.action,
      entity_type: entry.entity_type,
      entity_id:   entry.entity_id,
      details:     entry.details,
      created_at:  Utc::now(),
    };

    let id_str      = encode_uuid(record.id);
    let user_str    = record.user_id.map(encode_uuid);
    let ip          = record.ip_address.clone();
    let action      = record.action.as_ref().to_owned();
    let entity_type = record.entity_type.clone();
    let entity_str  = record.entity_id.map(encode_uuid);
    let details     = serde_json::to_string(&record.details)?;
    let at_str      = encode_dt(record.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO audit_log (
             id, user_id, ip_address, action, entity_type, entity_id, details, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![id_str, user_str, ip, action, entity_type, entity_str, details, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>> {
    let (clause, params) = where_clause(vec![
      ("action", query.action.map(|a| a.as_ref().to_owned())),
      ("entity_type", query.entity_type.clone()),
      ("entity_id", query.entity_id.map(encode_uuid)),
      ("user_id", query.user_id.map(encode_uuid)),
    ]);
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    let offset = query.offset.unwrap_or(0);

    self
      .fetch_all(
        format!(
          "SELECT {AUDIT_COLUMNS} FROM audit_log {clause}
           ORDER BY created_at DESC, rowid DESC
           LIMIT {limit} OFFSET {offset}"
        ),
        params,
        RawAuditEntry::from_row,
      )
      .await?
      .into_iter()
      .map(RawAuditEntry::into_entry)
      .collect()
  }
}
