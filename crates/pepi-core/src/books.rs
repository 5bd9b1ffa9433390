//! Fund book lifecycle: create, activate, close and reset.
//!
//! Every transition is admin-only and lands as one atomic store write.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
  Error, Result,
  access::{self, Actor, Principal},
  agent::Role,
  audit::{AuditAction, NewAuditEntry},
  book::{NewBook, PepiBook, RESET_CONFIRMATION_PHRASE, ResetCounts},
  feed::{ChangeEvent, ChangeFeed, ChangeOp, Table},
  ledger::{self, BookSummary, MonthlyReconciliation, RunningBalance},
  pipeline::record_audit,
  store::PepiStore,
  transaction::{Transaction, TransactionQuery},
};

/// Recompute a book's summary from scratch.
pub async fn book_summary<S: PepiStore>(store: &S, book_id: Uuid) -> Result<BookSummary> {
  let book = load_book(store, book_id).await?;
  let txs = book_transactions(store, book_id).await?;
  let ci_payments = store
    .list_ci_payments(Some(book_id))
    .await
    .map_err(Error::store)?;
  Ok(ledger::summarize(&book, &txs, &ci_payments))
}

async fn load_book<S: PepiStore>(store: &S, id: Uuid) -> Result<PepiBook> {
  store
    .get_book(id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::not_found("book", id))
}

async fn book_transactions<S: PepiStore>(store: &S, book_id: Uuid) -> Result<Vec<Transaction>> {
  let query = TransactionQuery { book_id: Some(book_id), ..Default::default() };
  store.list_transactions(&query).await.map_err(Error::store)
}

pub struct BookManager<S> {
  store: Arc<S>,
  feed:  ChangeFeed,
}

impl<S> Clone for BookManager<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), feed: self.feed.clone() }
  }
}

impl<S: PepiStore> BookManager<S> {
  pub fn new(store: Arc<S>, feed: ChangeFeed) -> Self { Self { store, feed } }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// The one accessor for the active book. Callers should not cache it.
  pub async fn active_book(&self) -> Result<Option<PepiBook>> {
    self.store.active_book().await.map_err(Error::store)
  }

  pub async fn get_book(&self, id: Uuid) -> Result<PepiBook> {
    load_book(self.store.as_ref(), id).await
  }

  pub async fn list_books(&self) -> Result<Vec<PepiBook>> {
    self.store.list_books().await.map_err(Error::store)
  }

  pub async fn summary(&self, id: Uuid) -> Result<BookSummary> {
    book_summary(self.store.as_ref(), id).await
  }

  pub async fn running_balances(&self, id: Uuid) -> Result<Vec<RunningBalance>> {
    let book = self.get_book(id).await?;
    let txs = book_transactions(self.store.as_ref(), id).await?;
    Ok(ledger::running_balances(book.starting_amount, &txs))
  }

  pub async fn reconciliation(
    &self,
    id: Uuid,
    year: i32,
    month: u32,
  ) -> Result<MonthlyReconciliation> {
    let book = self.get_book(id).await?;
    let txs = book_transactions(self.store.as_ref(), id).await?;
    ledger::reconcile_month(&book, &txs, year, month)
  }

  // ── Transitions ───────────────────────────────────────────────────────────

  /// Create a book. It starts inactive unless `input.activate` is set.
  pub async fn create_book(&self, actor: &Actor, input: NewBook) -> Result<PepiBook> {
    let principal = self.admin(actor).await?;
    input.validate()?;

    let book = self.store.create_book(input).await.map_err(Error::store)?;
    tracing::info!(book_id = %book.id, year = book.year, starting_amount = %book.starting_amount, active = book.is_active, "book created");

    self
      .after(
        &principal,
        NewAuditEntry::new(AuditAction::BookCreated, "pepi_book", book.id).details(json!({
          "year": book.year,
          "starting_amount": book.starting_amount,
          "is_active": book.is_active,
        })),
        ChangeEvent::new(Table::Books, ChangeOp::Insert, book.id, Some(book.id)),
      )
      .await;
    Ok(book)
  }

  /// Make `id` the single active book.
  pub async fn activate_book(&self, actor: &Actor, id: Uuid) -> Result<PepiBook> {
    let principal = self.admin(actor).await?;
    let book = self.get_book(id).await?;
    book.ensure_open()?;
    let previous = self.active_book().await?.map(|b| b.id);

    let book = self
      .store
      .activate_book(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::Conflict(format!("book {id} changed while being activated")))?;
    tracing::info!(book_id = %id, previous = ?previous, "book activated");

    self
      .after(
        &principal,
        NewAuditEntry::new(AuditAction::BookActivated, "pepi_book", id)
          .details(json!({ "year": book.year, "previously_active": previous })),
        ChangeEvent::new(Table::Books, ChangeOp::Update, id, Some(id)),
      )
      .await;
    Ok(book)
  }

  pub async fn deactivate_book(&self, actor: &Actor, id: Uuid) -> Result<PepiBook> {
    let principal = self.admin(actor).await?;
    self.get_book(id).await?;

    let book = self
      .store
      .deactivate_book(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("book", id))?;
    tracing::info!(book_id = %id, "book deactivated");

    self
      .after(
        &principal,
        NewAuditEntry::new(AuditAction::BookDeactivated, "pepi_book", id)
          .details(json!({ "year": book.year })),
        ChangeEvent::new(Table::Books, ChangeOp::Update, id, Some(id)),
      )
      .await;
    Ok(book)
  }

  /// Close the active book, freezing its closing balance. Terminal.
  pub async fn close_book(&self, actor: &Actor, id: Uuid) -> Result<PepiBook> {
    let principal = self.admin(actor).await?;
    let book = self.get_book(id).await?;
    if book.is_closed {
      return Err(Error::InvalidState(format!("book {id} is already closed")));
    }
    if !book.is_active {
      return Err(Error::InvalidState(format!(
        "book {id} must be active to be closed"
      )));
    }

    let book = self
      .store
      .close_book(id, Utc::now())
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::Conflict(format!("book {id} changed while being closed")))?;
    tracing::info!(book_id = %id, closing_balance = ?book.closing_balance, "book closed");

    self
      .after(
        &principal,
        NewAuditEntry::new(AuditAction::BookClosed, "pepi_book", id).details(json!({
          "year": book.year,
          "closing_balance": book.closing_balance,
        })),
        ChangeEvent::new(Table::Books, ChangeOp::Update, id, Some(id)),
      )
      .await;
    Ok(book)
  }

  /// Delete every transaction, CI payment and fund request of the active
  /// book `id`, leaving the book itself in place.
  ///
  /// `confirmation` must equal [`RESET_CONFIRMATION_PHRASE`].
  pub async fn reset_active_book(
    &self,
    actor: &Actor,
    id: Uuid,
    confirmation: &str,
  ) -> Result<ResetCounts> {
    let principal = self.admin(actor).await?;
    if confirmation.trim() != RESET_CONFIRMATION_PHRASE {
      return Err(Error::Validation(format!(
        "type {RESET_CONFIRMATION_PHRASE:?} to confirm the reset"
      )));
    }
    let book = self.get_book(id).await?;
    if !book.is_active {
      return Err(Error::InvalidState(format!("book {id} is not the active book")));
    }
    book.ensure_open()?;

    let counts = self
      .store
      .reset_book(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::Conflict(format!("book {id} changed while being reset")))?;
    tracing::warn!(
      book_id = %id,
      transactions = counts.transactions,
      ci_payments = counts.ci_payments,
      fund_requests = counts.fund_requests,
      "book reset"
    );

    self
      .after(
        &principal,
        NewAuditEntry::new(AuditAction::BookReset, "pepi_book", id)
          .details(json!({ "year": book.year, "deleted": counts })),
        ChangeEvent::new(Table::Books, ChangeOp::Update, id, Some(id)),
      )
      .await;
    Ok(counts)
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn admin(&self, actor: &Actor) -> Result<Principal> {
    access::authorize(self.store.as_ref(), actor, Role::Admin).await
  }

  /// Book transitions are rare; their audit entry is written inline.
  async fn after(&self, principal: &Principal, entry: NewAuditEntry, change: ChangeEvent) {
    let entry = entry.by(principal.user_id(), principal.ip_address.clone());
    record_audit(self.store.as_ref(), entry).await;
    self.feed.publish(change);
  }
}
