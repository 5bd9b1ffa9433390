//! The `PepiStore` trait.
//!
//! Implemented by storage backends (e.g. `pepi-store-sqlite`). The workflow
//! and lifecycle layers depend on this abstraction, not on a concrete
//! backend.
//!
//! Every state transition is a conditional write: the method returns `None`
//! (or `false`) when no row matched the expected prior state, and callers
//! turn that into a conflict. Backends must never apply a transition whose
//! guard no longer holds at write time.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  agent::{Agent, NewAgent, Role},
  audit::{AuditLogEntry, AuditQuery, NewAuditEntry},
  book::{NewBook, PepiBook, ResetCounts},
  ci_payment::{CiPayment, NewCiPayment},
  fund_request::{FundRequest, NewFundRequest},
  review::Review,
  transaction::{NewTransaction, Transaction, TransactionQuery},
};

/// Abstraction over a PEPI persistence backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait PepiStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Agents ────────────────────────────────────────────────────────────

  /// Persist a new agent. Duplicate `badge_number` or `user_id` is an
  /// error.
  fn add_agent(
    &self,
    input: NewAgent,
  ) -> impl Future<Output = Result<Agent, Self::Error>> + Send + '_;

  fn get_agent(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Agent>, Self::Error>> + Send + '_;

  /// Look an agent up by their external identity.
  fn get_agent_by_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Agent>, Self::Error>> + Send + '_;

  fn list_agents(
    &self,
  ) -> impl Future<Output = Result<Vec<Agent>, Self::Error>> + Send + '_;

  fn set_agent_role(
    &self,
    id: Uuid,
    role: Role,
  ) -> impl Future<Output = Result<Option<Agent>, Self::Error>> + Send + '_;

  // ── Books ─────────────────────────────────────────────────────────────

  /// Create a book. When `input.activate` is set, every other book is
  /// deactivated in the same atomic write.
  fn create_book(
    &self,
    input: NewBook,
  ) -> impl Future<Output = Result<PepiBook, Self::Error>> + Send + '_;

  fn get_book(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<PepiBook>, Self::Error>> + Send + '_;

  /// All books, newest year first.
  fn list_books(
    &self,
  ) -> impl Future<Output = Result<Vec<PepiBook>, Self::Error>> + Send + '_;

  /// The single active book, if any.
  fn active_book(
    &self,
  ) -> impl Future<Output = Result<Option<PepiBook>, Self::Error>> + Send + '_;

  /// Deactivate whichever book is active and activate `id`, atomically.
  ///
  /// Returns `None` (and changes nothing) if `id` is missing or closed.
  fn activate_book(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<PepiBook>, Self::Error>> + Send + '_;

  /// Clear `is_active` on `id`. Returns `None` if the book is missing.
  fn deactivate_book(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<PepiBook>, Self::Error>> + Send + '_;

  /// Close `id` if it is active and open.
  ///
  /// The closing balance is computed with [`crate::ledger::balance`] inside
  /// the same atomic write that sets `is_closed`, so no transition can land
  /// between the computation and the freeze. Returns `None` if the guard
  /// failed.
  fn close_book(
    &self,
    id: Uuid,
    closed_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<PepiBook>, Self::Error>> + Send + '_;

  /// Delete every transaction, CI payment and fund request of `id` in one
  /// all-or-nothing write. The book row itself is kept.
  ///
  /// Guarded on `id` being active and open at the time of the write. Returns
  /// `None` if the guard failed, with nothing deleted.
  fn reset_book(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ResetCounts>, Self::Error>> + Send + '_;

  // ── Transactions ──────────────────────────────────────────────────────

  /// Persist a new transaction with status `pending`.
  ///
  /// Guarded on the target book being active and open. Returns `None` if the
  /// guard failed.
  fn create_transaction(
    &self,
    input: NewTransaction,
  ) -> impl Future<Output = Result<Option<Transaction>, Self::Error>> + Send + '_;

  fn get_transaction(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Transaction>, Self::Error>> + Send + '_;

  /// Transactions matching `query`, oldest first.
  fn list_transactions<'a>(
    &'a self,
    query: &'a TransactionQuery,
  ) -> impl Future<Output = Result<Vec<Transaction>, Self::Error>> + Send + 'a;

  /// Overwrite the editable fields and review fields of `tx` as given.
  ///
  /// Guarded on the owning book being open. Returns `None` if the guard
  /// failed or the row is gone.
  fn replace_transaction(
    &self,
    tx: Transaction,
  ) -> impl Future<Output = Result<Option<Transaction>, Self::Error>> + Send + '_;

  /// Delete a pending transaction of an open book. Returns `false` if the
  /// guard failed.
  fn delete_pending_transaction(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Apply `review` only if the transaction is still `pending` and its book
  /// is open. Returns `None` when zero rows matched.
  fn review_transaction(
    &self,
    id: Uuid,
    review: Review,
  ) -> impl Future<Output = Result<Option<Transaction>, Self::Error>> + Send + '_;

  // ── CI payments ───────────────────────────────────────────────────────

  /// Same guard as [`PepiStore::create_transaction`].
  fn create_ci_payment(
    &self,
    input: NewCiPayment,
  ) -> impl Future<Output = Result<Option<CiPayment>, Self::Error>> + Send + '_;

  fn get_ci_payment(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<CiPayment>, Self::Error>> + Send + '_;

  fn list_ci_payments(
    &self,
    book_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<CiPayment>, Self::Error>> + Send + '_;

  /// Same guard as [`PepiStore::review_transaction`]. An approval also
  /// records the commander's signature.
  fn review_ci_payment(
    &self,
    id: Uuid,
    review: Review,
    commander_signature: Option<String>,
  ) -> impl Future<Output = Result<Option<CiPayment>, Self::Error>> + Send + '_;

  // ── Fund requests ─────────────────────────────────────────────────────

  /// Same guard as [`PepiStore::create_transaction`].
  fn create_fund_request(
    &self,
    input: NewFundRequest,
  ) -> impl Future<Output = Result<Option<FundRequest>, Self::Error>> + Send + '_;

  fn get_fund_request(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<FundRequest>, Self::Error>> + Send + '_;

  fn list_fund_requests(
    &self,
    book_id: Option<Uuid>,
    agent_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<FundRequest>, Self::Error>> + Send + '_;

  fn review_fund_request(
    &self,
    id: Uuid,
    review: Review,
  ) -> impl Future<Output = Result<Option<FundRequest>, Self::Error>> + Send + '_;

  // ── Audit log (append-only) ────────────────────────────────────────────

  fn append_audit(
    &self,
    entry: NewAuditEntry,
  ) -> impl Future<Output = Result<AuditLogEntry, Self::Error>> + Send + '_;

  /// Entries matching `query`, newest first.
  fn list_audit<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> impl Future<Output = Result<Vec<AuditLogEntry>, Self::Error>> + Send + 'a;
}
