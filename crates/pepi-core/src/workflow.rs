//! The approval workflow orchestrator.
//!
//! Each review runs the pipeline described in [`crate::pipeline`]:
//! authorize → load → validate → persist (conditional write) → notify →
//! audit → invalidate. Only the first four can fail the call.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
  Error, Result,
  access::{self, Actor, Principal},
  agent::{Agent, Role},
  audit::{AuditAction, NewAuditEntry},
  book::PepiBook,
  ci_payment::{CiPayment, CiPaymentInput, NewCiPayment, require_commander_signature},
  feed::{ChangeEvent, ChangeFeed, ChangeOp, Table},
  fund_request::{FundRequest, FundRequestInput, NewFundRequest},
  notify::{self, Notification, Notifier},
  pipeline::{Dispatch, Stage, record_audit, soft_failure},
  review::{Decision, ensure_pending},
  store::PepiStore,
  transaction::{
    NewTransaction, Transaction, TransactionEdit, TransactionInput, TypeScope,
  },
};

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
  pub dispatch: Dispatch,
  /// Base URL used for links in notification emails.
  pub app_url:  String,
}

impl Default for WorkflowConfig {
  fn default() -> Self {
    Self { dispatch: Dispatch::Background, app_url: "http://localhost:8080".into() }
  }
}

/// What was reviewed, carried into the best-effort stages.
#[derive(Debug, Clone)]
enum Reviewed {
  Transaction(Transaction),
  CiPayment(CiPayment),
  FundRequest(FundRequest),
}

impl Reviewed {
  fn label(&self) -> String {
    match self {
      Self::Transaction(t) => format!("transaction {}", t.id),
      Self::CiPayment(p) => format!("ci_payment {}", p.id),
      Self::FundRequest(r) => format!("fund_request {}", r.id),
    }
  }
}

/// Best-effort work queued after a successful write.
struct FollowUp {
  notice: Option<(Reviewed, Decision)>,
  audit:  NewAuditEntry,
  change: ChangeEvent,
}

/// Coordinates submissions and reviews of transactions, CI payments and fund
/// requests.
pub struct ApprovalWorkflow<S, N> {
  store:    Arc<S>,
  notifier: Arc<N>,
  feed:     ChangeFeed,
  config:   WorkflowConfig,
}

impl<S, N> Clone for ApprovalWorkflow<S, N> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      notifier: Arc::clone(&self.notifier),
      feed:     self.feed.clone(),
      config:   self.config.clone(),
    }
  }
}

impl<S, N> ApprovalWorkflow<S, N>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  pub fn new(
    store: Arc<S>,
    notifier: Arc<N>,
    feed: ChangeFeed,
    config: WorkflowConfig,
  ) -> Self {
    Self { store, notifier, feed, config }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn feed(&self) -> &ChangeFeed { &self.feed }

  // ── Transactions ──────────────────────────────────────────────────────────

  /// Record a new pending transaction against the active book.
  pub async fn submit_transaction(
    &self,
    actor: &Actor,
    mut input: TransactionInput,
  ) -> Result<Transaction> {
    let principal = access::resolve(self.store.as_ref(), actor).await?;
    input.validate()?;
    let book = self.require_active_book().await?;

    if principal.is_admin() {
      if let Some(agent_id) = input.agent_id {
        self.require_agent(agent_id).await?;
      }
    } else {
      input.agent_id = Some(self.own_agent_id(&principal, input.agent_id)?);
      input.is_initial_funding = Some(false);
    }

    let new = NewTransaction::from_input(input, book.id, principal.user_id());
    let tx = self
      .store
      .create_transaction(new)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| book_changed(&book))?;
    tracing::info!(transaction_id = %tx.id, book_id = %book.id, kind = %tx.transaction_type, amount = %tx.amount, "transaction submitted");

    self
      .follow_up(FollowUp {
        notice: None,
        audit:  NewAuditEntry::new(AuditAction::TransactionCreated, "transaction", tx.id)
          .by(principal.user_id(), principal.ip_address.clone())
          .details(json!({
            "transaction_type": tx.transaction_type,
            "amount": tx.amount,
            "agent_id": tx.agent_id,
            "is_initial_funding": tx.is_initial_funding,
          })),
        change: ChangeEvent::new(Table::Transactions, ChangeOp::Insert, tx.id, Some(book.id)),
      })
      .await;
    Ok(tx)
  }

  /// Edit a transaction and resubmit it for review.
  ///
  /// Whatever its prior status, the transaction comes back `pending` with
  /// no review fields. The prior verdict is kept in the audit entry.
  pub async fn edit_transaction(
    &self,
    actor: &Actor,
    id: Uuid,
    mut edit: TransactionEdit,
  ) -> Result<Transaction> {
    let principal = access::resolve(self.store.as_ref(), actor).await?;
    let mut tx = self.load_transaction(id).await?;
    if !principal.is_admin() {
      if !tx.is_owned_by(&principal.agent) {
        return Err(Error::Unauthorized(format!(
          "transaction {id} belongs to another agent"
        )));
      }
      if edit.agent_id.is_some_and(|a| a != principal.agent.id) {
        return Err(Error::Unauthorized(
          "agents cannot reassign transactions".into(),
        ));
      }
      edit.agent_id = edit.agent_id.or(tx.agent_id);
    } else if let Some(agent_id) = edit.agent_id {
      self.require_agent(agent_id).await?;
    }
    edit.validate()?;
    self.load_book(tx.pepi_book_id).await?.ensure_open()?;

    let prior = tx.review.clone();
    let before = json!({
      "transaction_type": tx.transaction_type,
      "amount": tx.amount,
      "description": tx.description,
      "receipt_number": tx.receipt_number,
      "agent_id": tx.agent_id,
    });
    edit.apply_to(&mut tx, Utc::now());

    let tx = self
      .store
      .replace_transaction(tx)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| {
        Error::Conflict(format!("transaction {id} changed while being edited"))
      })?;
    tracing::info!(transaction_id = %id, prior_status = %prior.status, "transaction edited and resubmitted");

    self
      .follow_up(FollowUp {
        notice: None,
        audit:  NewAuditEntry::new(AuditAction::TransactionEdited, "transaction", id)
          .by(principal.user_id(), principal.ip_address.clone())
          .details(json!({
            "before": before,
            "prior_review": {
              "status": prior.status,
              "review_notes": prior.review_notes,
              "reviewed_by_user_id": prior.reviewed_by_user_id,
              "reviewed_at": prior.reviewed_at,
            },
            "amount": tx.amount,
          })),
        change: ChangeEvent::new(Table::Transactions, ChangeOp::Update, id, Some(tx.pepi_book_id)),
      })
      .await;
    Ok(tx)
  }

  /// Withdraw a transaction that has not been reviewed yet.
  pub async fn delete_transaction(&self, actor: &Actor, id: Uuid) -> Result<()> {
    let principal = access::resolve(self.store.as_ref(), actor).await?;
    let tx = self.load_transaction(id).await?;
    if !principal.is_admin() && !tx.is_owned_by(&principal.agent) {
      return Err(Error::Unauthorized(format!(
        "transaction {id} belongs to another agent"
      )));
    }
    ensure_pending("transaction", id, tx.status())?;
    self.load_book(tx.pepi_book_id).await?.ensure_open()?;

    if !self.store.delete_pending_transaction(id).await.map_err(Error::store)? {
      return Err(Error::Conflict(format!(
        "transaction {id} changed before it could be deleted"
      )));
    }
    tracing::info!(transaction_id = %id, "transaction deleted");

    self
      .follow_up(FollowUp {
        notice: None,
        audit:  NewAuditEntry::new(AuditAction::TransactionDeleted, "transaction", id)
          .by(principal.user_id(), principal.ip_address.clone())
          .details(json!({
            "transaction_type": tx.transaction_type,
            "amount": tx.amount,
            "description": tx.description,
          })),
        change: ChangeEvent::new(Table::Transactions, ChangeOp::Delete, id, Some(tx.pepi_book_id)),
      })
      .await;
    Ok(())
  }

  /// Approve or reject a pending transaction.
  ///
  /// Fails with `Unauthorized`, `NotFound`, `InvalidState`, `TypeMismatch`
  /// or `Conflict`; never because of notification or audit trouble.
  pub async fn process_approval(
    &self,
    transaction_id: Uuid,
    decision: Decision,
    actor: &Actor,
    scope: TypeScope,
  ) -> Result<Transaction> {
    let principal = access::authorize(self.store.as_ref(), actor, Role::Admin).await?;
    let tx = self.load_transaction(transaction_id).await?;

    ensure_pending("transaction", transaction_id, tx.status())?;
    scope.check(&tx)?;
    self.load_book(tx.pepi_book_id).await?.ensure_open()?;

    let review = decision.clone().into_review(principal.user_id(), Utc::now());
    let tx = self
      .store
      .review_transaction(transaction_id, review)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| {
        Error::Conflict(format!(
          "transaction {transaction_id} was processed concurrently"
        ))
      })?;
    tracing::info!(transaction_id = %tx.id, decision = decision.verb(), reviewer = %principal.user_id(), "transaction reviewed");

    let action = match decision {
      Decision::Approve => AuditAction::TransactionApproved,
      Decision::Reject { .. } => AuditAction::TransactionRejected,
    };
    self
      .follow_up(FollowUp {
        audit:  NewAuditEntry::new(action, "transaction", tx.id)
          .by(principal.user_id(), principal.ip_address.clone())
          .details(json!({
            "transaction_type": tx.transaction_type,
            "amount": tx.amount,
            "agent_id": tx.agent_id,
            "review_notes": tx.review.review_notes,
          })),
        change: ChangeEvent::new(Table::Transactions, ChangeOp::Update, tx.id, Some(tx.pepi_book_id)),
        notice: Some((Reviewed::Transaction(tx.clone()), decision)),
      })
      .await;
    Ok(tx)
  }

  pub async fn approve(
    &self,
    actor: &Actor,
    transaction_id: Uuid,
    scope: TypeScope,
  ) -> Result<Transaction> {
    self.process_approval(transaction_id, Decision::Approve, actor, scope).await
  }

  pub async fn reject(
    &self,
    actor: &Actor,
    transaction_id: Uuid,
    reason: Option<String>,
    scope: TypeScope,
  ) -> Result<Transaction> {
    self
      .process_approval(transaction_id, Decision::Reject { reason }, actor, scope)
      .await
  }

  // ── CI payments ───────────────────────────────────────────────────────────

  pub async fn submit_ci_payment(
    &self,
    actor: &Actor,
    input: CiPaymentInput,
  ) -> Result<CiPayment> {
    let principal = access::resolve(self.store.as_ref(), actor).await?;
    input.validate()?;
    let book = self.require_active_book().await?;

    let paying_agent_id = if principal.is_admin() {
      let id = input.paying_agent_id.unwrap_or(principal.agent.id);
      self.require_agent(id).await?;
      id
    } else {
      self.own_agent_id(&principal, input.paying_agent_id)?
    };

    let payment = self
      .store
      .create_ci_payment(NewCiPayment {
        pepi_book_id: book.id,
        paying_agent_id,
        input,
        created_by: principal.user_id(),
      })
      .await
      .map_err(Error::store)?
      .ok_or_else(|| book_changed(&book))?;
    tracing::info!(ci_payment_id = %payment.id, book_id = %book.id, amount = %payment.amount, "CI payment submitted");

    self
      .follow_up(FollowUp {
        notice: None,
        audit:  NewAuditEntry::new(AuditAction::CiPaymentCreated, "ci_payment", payment.id)
          .by(principal.user_id(), principal.ip_address.clone())
          .details(json!({
            "amount": payment.amount,
            "paying_agent_id": payment.paying_agent_id,
            "case_number": payment.case_number,
          })),
        change: ChangeEvent::new(Table::CiPayments, ChangeOp::Insert, payment.id, Some(book.id)),
      })
      .await;
    Ok(payment)
  }

  /// Approve (with the commander's sign-off) or reject a CI payment.
  pub async fn process_ci_payment(
    &self,
    payment_id: Uuid,
    decision: Decision,
    actor: &Actor,
    commander_signature: Option<String>,
  ) -> Result<CiPayment> {
    let principal = access::authorize(self.store.as_ref(), actor, Role::Admin).await?;
    let payment = self
      .store
      .get_ci_payment(payment_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("ci_payment", payment_id))?;

    ensure_pending("ci_payment", payment_id, payment.review.status)?;
    self.load_book(payment.pepi_book_id).await?.ensure_open()?;
    let signature = match decision {
      Decision::Approve => {
        Some(require_commander_signature(commander_signature.as_deref())?)
      }
      Decision::Reject { .. } => None,
    };

    let review = decision.clone().into_review(principal.user_id(), Utc::now());
    let payment = self
      .store
      .review_ci_payment(payment_id, review, signature)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| {
        Error::Conflict(format!("ci_payment {payment_id} was processed concurrently"))
      })?;
    tracing::info!(ci_payment_id = %payment.id, decision = decision.verb(), "CI payment reviewed");

    let action = match decision {
      Decision::Approve => AuditAction::CiPaymentApproved,
      Decision::Reject { .. } => AuditAction::CiPaymentRejected,
    };
    self
      .follow_up(FollowUp {
        audit:  NewAuditEntry::new(action, "ci_payment", payment.id)
          .by(principal.user_id(), principal.ip_address.clone())
          .details(json!({
            "amount": payment.amount,
            "review_notes": payment.review.review_notes,
          })),
        change: ChangeEvent::new(Table::CiPayments, ChangeOp::Update, payment.id, Some(payment.pepi_book_id)),
        notice: Some((Reviewed::CiPayment(payment.clone()), decision)),
      })
      .await;
    Ok(payment)
  }

  // ── Fund requests ─────────────────────────────────────────────────────────

  pub async fn submit_fund_request(
    &self,
    actor: &Actor,
    input: FundRequestInput,
  ) -> Result<FundRequest> {
    let principal = access::resolve(self.store.as_ref(), actor).await?;
    input.validate()?;
    let book = self.require_active_book().await?;

    let request = self
      .store
      .create_fund_request(NewFundRequest {
        pepi_book_id: book.id,
        agent_id:     principal.agent.id,
        amount:       input.amount,
        purpose:      input.purpose.trim().to_owned(),
      })
      .await
      .map_err(Error::store)?
      .ok_or_else(|| book_changed(&book))?;
    tracing::info!(fund_request_id = %request.id, amount = %request.amount, "fund request submitted");

    self
      .follow_up(FollowUp {
        notice: None,
        audit:  NewAuditEntry::new(AuditAction::FundRequestCreated, "fund_request", request.id)
          .by(principal.user_id(), principal.ip_address.clone())
          .details(json!({ "amount": request.amount, "purpose": request.purpose })),
        change: ChangeEvent::new(Table::FundRequests, ChangeOp::Insert, request.id, Some(book.id)),
      })
      .await;
    Ok(request)
  }

  pub async fn process_fund_request(
    &self,
    request_id: Uuid,
    decision: Decision,
    actor: &Actor,
  ) -> Result<FundRequest> {
    let principal = access::authorize(self.store.as_ref(), actor, Role::Admin).await?;
    let request = self
      .store
      .get_fund_request(request_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("fund_request", request_id))?;

    ensure_pending("fund_request", request_id, request.review.status)?;
    self.load_book(request.pepi_book_id).await?.ensure_open()?;

    let review = decision.clone().into_review(principal.user_id(), Utc::now());
    let request = self
      .store
      .review_fund_request(request_id, review)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| {
        Error::Conflict(format!("fund_request {request_id} was processed concurrently"))
      })?;
    tracing::info!(fund_request_id = %request.id, decision = decision.verb(), "fund request reviewed");

    let action = match decision {
      Decision::Approve => AuditAction::FundRequestApproved,
      Decision::Reject { .. } => AuditAction::FundRequestRejected,
    };
    self
      .follow_up(FollowUp {
        audit:  NewAuditEntry::new(action, "fund_request", request.id)
          .by(principal.user_id(), principal.ip_address.clone())
          .details(json!({
            "amount": request.amount,
            "review_notes": request.review.review_notes,
          })),
        change: ChangeEvent::new(Table::FundRequests, ChangeOp::Update, request.id, Some(request.pepi_book_id)),
        notice: Some((Reviewed::FundRequest(request.clone()), decision)),
      })
      .await;
    Ok(request)
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn load_transaction(&self, id: Uuid) -> Result<Transaction> {
    self
      .store
      .get_transaction(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("transaction", id))
  }

  async fn load_book(&self, id: Uuid) -> Result<PepiBook> {
    self
      .store
      .get_book(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("book", id))
  }

  async fn require_active_book(&self) -> Result<PepiBook> {
    self
      .store
      .active_book()
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::InvalidState("no PEPI book is active".into()))
  }

  async fn require_agent(&self, id: Uuid) -> Result<Agent> {
    self
      .store
      .get_agent(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("agent", id))
  }

  /// Agents act only on their own behalf.
  fn own_agent_id(&self, principal: &Principal, requested: Option<Uuid>) -> Result<Uuid> {
    match requested {
      Some(id) if id != principal.agent.id => Err(Error::Unauthorized(
        "agents may only submit on their own behalf".into(),
      )),
      _ => Ok(principal.agent.id),
    }
  }

  /// Run the best-effort stages: notify and audit per the dispatch mode,
  /// then publish the invalidation.
  async fn follow_up(&self, follow_up: FollowUp) {
    let FollowUp { notice, audit, change } = follow_up;
    let store = Arc::clone(&self.store);
    let notifier = Arc::clone(&self.notifier);
    let app_url = self.config.app_url.clone();

    self
      .config
      .dispatch
      .run(async move {
        if let Some((reviewed, decision)) = notice {
          notify_reviewed(store.as_ref(), notifier.as_ref(), &app_url, reviewed, decision).await;
        }
        record_audit(store.as_ref(), audit).await;
      })
      .await;

    self.feed.publish(change);
  }
}

/// The active book was closed or deactivated between the lookup and the
/// insert.
fn book_changed(book: &PepiBook) -> Error {
  Error::Conflict(format!(
    "book {} ({}) stopped accepting entries during the submission",
    book.id, book.year
  ))
}

/// Resolve the recipient and send the decision email, logging any failure.
async fn notify_reviewed<S: PepiStore, N: Notifier>(
  store: &S,
  notifier: &N,
  app_url: &str,
  reviewed: Reviewed,
  decision: Decision,
) {
  let label = reviewed.label();
  let message = match build_notification(store, app_url, &reviewed, &decision).await {
    Ok(message) => message,
    Err(e) => return soft_failure(Stage::Notify, &label, &e),
  };
  match notifier.send(message).await {
    Ok(()) => tracing::debug!(subject = %label, "review notification sent"),
    Err(e) => soft_failure(Stage::Notify, &label, &e),
  }
}

async fn build_notification<S: PepiStore>(
  store: &S,
  app_url: &str,
  reviewed: &Reviewed,
  decision: &Decision,
) -> Result<Notification> {
  let (agent_id, creator) = match reviewed {
    Reviewed::Transaction(t) => (t.agent_id, Some(t.created_by)),
    Reviewed::CiPayment(p) => (Some(p.paying_agent_id), Some(p.created_by)),
    Reviewed::FundRequest(r) => (Some(r.agent_id), None),
  };

  let mut recipient = None;
  if let Some(id) = agent_id {
    recipient = store.get_agent(id).await.map_err(Error::store)?;
  }
  if recipient.is_none()
    && let Some(user_id) = creator
  {
    recipient = store.get_agent_by_user(user_id).await.map_err(Error::store)?;
  }
  let recipient = recipient.ok_or_else(|| {
    Error::DependencyFailure(format!("no recipient for {}", reviewed.label()))
  })?;
  let to = recipient.email.clone().filter(|e| !e.trim().is_empty()).ok_or_else(|| {
    Error::DependencyFailure(format!("agent {} has no email address", recipient.id))
  })?;

  Ok(match reviewed {
    Reviewed::Transaction(t) => {
      notify::transaction_reviewed(&to, &recipient, t, decision, app_url)
    }
    Reviewed::CiPayment(p) => {
      notify::ci_payment_reviewed(&to, &recipient, p, decision, app_url)
    }
    Reviewed::FundRequest(r) => {
      notify::fund_request_reviewed(&to, &recipient, r, decision, app_url)
    }
  })
}
