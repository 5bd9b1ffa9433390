//! End-to-end workflow and lifecycle scenarios over a real `SqliteStore`.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use chrono::NaiveDate;
use pepi_core::{
  Error, MoneyCents,
  access::Actor,
  agent::{Agent, NewAgent, Role},
  audit::{AuditAction, AuditQuery},
  book::{NewBook, PepiBook, RESET_CONFIRMATION_PHRASE},
  books::BookManager,
  ci_payment::CiPaymentInput,
  directory,
  feed::{ChangeFeed, LiveBalance},
  fund_request::FundRequestInput,
  notify::{Notification, Notifier},
  pipeline::Dispatch,
  review::{Decision, ReviewStatus},
  store::PepiStore,
  transaction::{TransactionEdit, TransactionInput, TransactionType, TypeScope},
  workflow::{ApprovalWorkflow, WorkflowConfig},
};
use uuid::Uuid;

use crate::SqliteStore;

// ─── Test doubles ────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("mail relay unavailable")]
struct RelayDown;

/// Records every message; fails every send while `failing` is set.
#[derive(Default)]
struct RecordingNotifier {
  sent:    Mutex<Vec<Notification>>,
  failing: AtomicBool,
}

impl RecordingNotifier {
  fn sent(&self) -> Vec<Notification> { self.sent.lock().unwrap().clone() }
}

impl Notifier for RecordingNotifier {
  type Error = RelayDown;

  async fn send(&self, message: Notification) -> Result<(), RelayDown> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(RelayDown);
    }
    self.sent.lock().unwrap().push(message);
    Ok(())
  }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

struct Harness {
  store:    Arc<SqliteStore>,
  notifier: Arc<RecordingNotifier>,
  feed:     ChangeFeed,
  workflow: ApprovalWorkflow<SqliteStore, RecordingNotifier>,
  books:    BookManager<SqliteStore>,
  admin:    Actor,
  agent:    Agent,
}

impl Harness {
  async fn new() -> Self {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let notifier = Arc::new(RecordingNotifier::default());
    let feed = ChangeFeed::default();
    let workflow = ApprovalWorkflow::new(
      Arc::clone(&store),
      Arc::clone(&notifier),
      feed.clone(),
      WorkflowConfig { dispatch: Dispatch::Inline, app_url: "https://pepi.test".into() },
    );
    let books = BookManager::new(Arc::clone(&store), feed.clone());

    let admin = directory::bootstrap_admin(store.as_ref(), agent_input("1", "Commander"))
      .await
      .unwrap();
    let admin = Actor::new(admin.user_id);
    let agent = directory::register_agent(
      store.as_ref(),
      &feed,
      &admin,
      agent_input("2", "Field Agent"),
    )
    .await
    .unwrap();

    Self { store, notifier, feed, workflow, books, admin, agent }
  }

  fn agent_actor(&self) -> Actor { Actor::new(self.agent.user_id) }

  async fn active_book(&self, dollars: i64) -> PepiBook {
    self
      .books
      .create_book(&self.admin, NewBook {
        year:            2025,
        starting_amount: MoneyCents::dollars(dollars),
        activate:        true,
      })
      .await
      .unwrap()
  }

  async fn submit(&self, actor: &Actor, kind: TransactionType, dollars: i64) -> Uuid {
    self
      .workflow
      .submit_transaction(actor, tx_input(kind, dollars))
      .await
      .unwrap()
      .id
  }

  async fn balance(&self, book: Uuid) -> MoneyCents {
    self.books.summary(book).await.unwrap().balance
  }
}

fn agent_input(badge: &str, name: &str) -> NewAgent {
  NewAgent {
    name:         name.into(),
    badge_number: badge.into(),
    email:        Some(format!("badge{badge}@pepi.test")),
    role:         Role::Agent,
    user_id:      Uuid::new_v4(),
  }
}

fn tx_input(kind: TransactionType, dollars: i64) -> TransactionInput {
  TransactionInput {
    transaction_type:   kind,
    amount:             MoneyCents::dollars(dollars),
    receipt_number:     None,
    description:        format!("{kind} of {dollars}"),
    agent_id:           None,
    is_initial_funding: None,
  }
}

// ─── Ledger through the workflow ─────────────────────────────────────────────

#[tokio::test]
async fn only_approved_transactions_move_the_balance() {
  let h = Harness::new().await;
  let book = h.active_book(1000).await;

  let issue = h.submit(&h.admin, TransactionType::Issuance, 500).await;
  h.workflow.approve(&h.admin, issue, TypeScope::Any).await.unwrap();
  assert_eq!(h.balance(book.id).await, MoneyCents::dollars(1500));

  let spend = h.submit(&h.admin, TransactionType::Spending, 200).await;
  h.workflow.approve(&h.admin, spend, TypeScope::Any).await.unwrap();
  assert_eq!(h.balance(book.id).await, MoneyCents::dollars(1300));

  let big = h.submit(&h.admin, TransactionType::Spending, 9999).await;
  assert_eq!(h.balance(book.id).await, MoneyCents::dollars(1300));

  h.workflow.reject(&h.admin, big, None, TypeScope::Any).await.unwrap();
  assert_eq!(h.balance(book.id).await, MoneyCents::dollars(1300));
}

#[tokio::test]
async fn submitting_without_an_active_book_is_invalid_state() {
  let h = Harness::new().await;
  let err = h
    .workflow
    .submit_transaction(&h.agent_actor(), tx_input(TransactionType::Spending, 5))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn oversized_amounts_are_refused_before_they_reach_the_ledger() {
  let h = Harness::new().await;
  let book = h.active_book(1000).await;

  let err = h
    .workflow
    .submit_transaction(&h.admin, TransactionInput {
      amount: MoneyCents::new(i64::MAX),
      ..tx_input(TransactionType::Issuance, 1)
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let err = h
    .workflow
    .submit_fund_request(&h.agent_actor(), FundRequestInput {
      amount:  MoneyCents::new(i64::MAX),
      purpose: "everything".into(),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let id = h
    .workflow
    .submit_transaction(&h.admin, TransactionInput {
      amount: MoneyCents::MAX_AMOUNT,
      ..tx_input(TransactionType::Issuance, 1)
    })
    .await
    .unwrap()
    .id;
  h.workflow.approve(&h.admin, id, TypeScope::Any).await.unwrap();
  assert_eq!(
    h.balance(book.id).await,
    MoneyCents::MAX_AMOUNT + MoneyCents::dollars(1000)
  );
}

#[tokio::test]
async fn agent_submissions_are_bound_to_the_agent() {
  let h = Harness::new().await;
  h.active_book(1000).await;

  let tx = h
    .workflow
    .submit_transaction(&h.agent_actor(), TransactionInput {
      is_initial_funding: Some(true),
      ..tx_input(TransactionType::Spending, 20)
    })
    .await
    .unwrap();
  assert_eq!(tx.agent_id, Some(h.agent.id));
  assert!(!tx.is_initial_funding);

  let err = h
    .workflow
    .submit_transaction(&h.agent_actor(), TransactionInput {
      agent_id: Some(Uuid::new_v4()),
      ..tx_input(TransactionType::Spending, 20)
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Unauthorized(_)));
}

// ─── Review rules ────────────────────────────────────────────────────────────

#[tokio::test]
async fn reject_then_edit_restarts_review_and_keeps_history_in_audit() {
  let h = Harness::new().await;
  h.active_book(1000).await;
  let agent = h.agent_actor();

  let id = h.submit(&agent, TransactionType::Spending, 150).await;
  let rejected = h
    .workflow
    .reject(&h.admin, id, Some("needs receipt".into()), TypeScope::Any)
    .await
    .unwrap();
  assert_eq!(rejected.status(), ReviewStatus::Rejected);
  assert_eq!(rejected.review.review_notes.as_deref(), Some("needs receipt"));

  let edited = h
    .workflow
    .edit_transaction(&agent, id, TransactionEdit {
      transaction_type: TransactionType::Spending,
      amount:           MoneyCents::dollars(150),
      receipt_number:   Some("R-2231".into()),
      description:      "buy money".into(),
      agent_id:         None,
    })
    .await
    .unwrap();
  assert_eq!(edited.status(), ReviewStatus::Pending);
  assert_eq!(edited.review.review_notes, None);
  assert_eq!(edited.review.reviewed_at, None);
  assert_eq!(edited.review.reviewed_by_user_id, None);
  assert_eq!(edited.agent_id, Some(h.agent.id));

  let audit = h
    .store
    .list_audit(&AuditQuery {
      action: Some(AuditAction::TransactionEdited),
      entity_id: Some(id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(audit.len(), 1);
  assert_eq!(audit[0].details["prior_review"]["status"], "rejected");
  assert_eq!(audit[0].details["prior_review"]["review_notes"], "needs receipt");
}

#[tokio::test]
async fn admin_edit_naming_an_unknown_agent_is_not_found() {
  let h = Harness::new().await;
  h.active_book(1000).await;
  let id = h.submit(&h.admin, TransactionType::Spending, 30).await;

  let err = h
    .workflow
    .edit_transaction(&h.admin, id, TransactionEdit {
      transaction_type: TransactionType::Spending,
      amount:           MoneyCents::dollars(30),
      receipt_number:   None,
      description:      "reassigned".into(),
      agent_id:         Some(Uuid::new_v4()),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NotFound { entity: "agent", .. }));

  let reassigned = h
    .workflow
    .edit_transaction(&h.admin, id, TransactionEdit {
      transaction_type: TransactionType::Spending,
      amount:           MoneyCents::dollars(30),
      receipt_number:   None,
      description:      "reassigned".into(),
      agent_id:         Some(h.agent.id),
    })
    .await
    .unwrap();
  assert_eq!(reassigned.agent_id, Some(h.agent.id));
}

#[tokio::test]
async fn second_approval_is_already_processed() {
  let h = Harness::new().await;
  let book = h.active_book(1000).await;
  let id = h.submit(&h.admin, TransactionType::Issuance, 100).await;

  h.workflow.approve(&h.admin, id, TypeScope::Any).await.unwrap();
  let err = h.workflow.approve(&h.admin, id, TypeScope::Any).await.unwrap_err();
  assert!(matches!(err, Error::InvalidState(ref m) if m.contains("already processed")));
  assert_eq!(h.balance(book.id).await, MoneyCents::dollars(1100));
}

#[tokio::test]
async fn concurrent_approvals_yield_exactly_one_winner() {
  let h = Harness::new().await;
  let book = h.active_book(1000).await;
  let id = h.submit(&h.agent_actor(), TransactionType::Spending, 300).await;

  let (a, b) = tokio::join!(
    h.workflow.approve(&h.admin, id, TypeScope::Any),
    h.workflow.approve(&h.admin, id, TypeScope::Any),
  );

  let results = [a, b];
  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  let loser = results.into_iter().find_map(Result::err).unwrap();
  assert!(matches!(loser, Error::Conflict(_) | Error::InvalidState(_)));

  assert_eq!(h.balance(book.id).await, MoneyCents::dollars(700));
  assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn type_scoped_review_rejects_other_kinds() {
  let h = Harness::new().await;
  h.active_book(1000).await;
  let id = h.submit(&h.admin, TransactionType::Issuance, 100).await;

  let err = h
    .workflow
    .approve(&h.admin, id, TypeScope::Only(TransactionType::Spending))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::TypeMismatch { .. }));
  let tx = h.store.get_transaction(id).await.unwrap().unwrap();
  assert_eq!(tx.status(), ReviewStatus::Pending);
}

#[tokio::test]
async fn agents_cannot_review() {
  let h = Harness::new().await;
  h.active_book(1000).await;
  let id = h.submit(&h.agent_actor(), TransactionType::Spending, 10).await;

  let err = h
    .workflow
    .approve(&h.agent_actor(), id, TypeScope::Any)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Unauthorized(_)));

  let err = h
    .workflow
    .approve(&Actor::new(Uuid::new_v4()), id, TypeScope::Any)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Unauthorized(_)));
}

#[tokio::test]
async fn missing_transaction_is_not_found() {
  let h = Harness::new().await;
  let err = h
    .workflow
    .approve(&h.admin, Uuid::new_v4(), TypeScope::Any)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NotFound { entity: "transaction", .. }));
}

#[tokio::test]
async fn only_pending_transactions_can_be_deleted() {
  let h = Harness::new().await;
  h.active_book(1000).await;
  let agent = h.agent_actor();
  let keep = h.submit(&agent, TransactionType::Spending, 10).await;
  let withdrawn = h.submit(&agent, TransactionType::Spending, 20).await;

  h.workflow.approve(&h.admin, keep, TypeScope::Any).await.unwrap();
  let err = h.workflow.delete_transaction(&agent, keep).await.unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));

  h.workflow.delete_transaction(&agent, withdrawn).await.unwrap();
  assert!(h.store.get_transaction(withdrawn).await.unwrap().is_none());
}

// ─── Side effects ────────────────────────────────────────────────────────────

#[tokio::test]
async fn decision_email_goes_to_the_agent() {
  let h = Harness::new().await;
  h.active_book(1000).await;
  let id = h.submit(&h.agent_actor(), TransactionType::Spending, 150).await;

  h.workflow
    .reject(&h.admin, id, Some("needs receipt".into()), TypeScope::Any)
    .await
    .unwrap();

  let sent = h.notifier.sent();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].to, "badge2@pepi.test");
  assert_eq!(sent[0].subject, "PEPI spending of $150.00 rejected");
  assert!(sent[0].body_text.contains("needs receipt"));
}

#[tokio::test]
async fn notification_failure_never_fails_the_transition() {
  let h = Harness::new().await;
  let book = h.active_book(1000).await;
  let id = h.submit(&h.agent_actor(), TransactionType::Spending, 100).await;
  h.notifier.failing.store(true, Ordering::SeqCst);

  let tx = h.workflow.approve(&h.admin, id, TypeScope::Any).await.unwrap();
  assert_eq!(tx.status(), ReviewStatus::Approved);
  assert_eq!(h.balance(book.id).await, MoneyCents::dollars(900));
  assert!(h.notifier.sent().is_empty());

  let audit = h
    .store
    .list_audit(&AuditQuery {
      action: Some(AuditAction::TransactionApproved),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(audit.len(), 1);
  assert_eq!(audit[0].user_id, Some(h.admin.user_id));
}

#[tokio::test]
async fn live_balance_recomputes_on_change() {
  let h = Harness::new().await;
  let book = h.active_book(1000).await;
  let live = LiveBalance::watch(Arc::clone(&h.store), &h.feed, book.id)
    .await
    .unwrap();
  assert_eq!(live.current().balance, MoneyCents::dollars(1000));

  let id = h.submit(&h.admin, TransactionType::Issuance, 250).await;
  h.workflow.approve(&h.admin, id, TypeScope::Any).await.unwrap();

  let mut rx = live.subscribe();
  tokio::time::timeout(
    Duration::from_secs(2),
    rx.wait_for(|s| s.balance == MoneyCents::dollars(1250)),
  )
  .await
  .unwrap()
  .unwrap();
}

// ─── Book lifecycle ──────────────────────────────────────────────────────────

#[tokio::test]
async fn closing_freezes_balance_and_blocks_further_changes() {
  let h = Harness::new().await;
  let book = h.active_book(1000).await;
  let spend = h.submit(&h.admin, TransactionType::Spending, 200).await;
  h.workflow.approve(&h.admin, spend, TypeScope::Any).await.unwrap();
  let pending = h.submit(&h.agent_actor(), TransactionType::Spending, 50).await;

  let closed = h.books.close_book(&h.admin, book.id).await.unwrap();
  assert_eq!(closed.closing_balance, Some(MoneyCents::dollars(800)));
  assert!(!closed.is_active);

  let err = h.workflow.approve(&h.admin, pending, TypeScope::Any).await.unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));
  let err = h
    .workflow
    .edit_transaction(&h.admin, spend, TransactionEdit {
      transaction_type: TransactionType::Spending,
      amount:           MoneyCents::dollars(1),
      receipt_number:   None,
      description:      "rewrite history".into(),
      agent_id:         None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));

  let summary = h.books.summary(book.id).await.unwrap();
  assert_eq!(summary.closing_balance, Some(summary.balance));

  let err = h.books.close_book(&h.admin, book.id).await.unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));
  let err = h.books.activate_book(&h.admin, book.id).await.unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn activating_switches_the_single_active_book() {
  let h = Harness::new().await;
  let first = h.active_book(1000).await;
  let second = h
    .books
    .create_book(&h.admin, NewBook {
      year:            2026,
      starting_amount: MoneyCents::dollars(2000),
      activate:        false,
    })
    .await
    .unwrap();
  assert_eq!(h.books.active_book().await.unwrap().unwrap().id, first.id);

  h.books.activate_book(&h.admin, second.id).await.unwrap();
  let books = h.books.list_books().await.unwrap();
  assert_eq!(books.iter().filter(|b| b.is_active).count(), 1);
  assert_eq!(h.books.active_book().await.unwrap().unwrap().id, second.id);

  let err = h.books.close_book(&h.admin, first.id).await.unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn book_management_is_admin_only() {
  let h = Harness::new().await;
  let err = h
    .books
    .create_book(&h.agent_actor(), NewBook {
      year:            2025,
      starting_amount: MoneyCents::dollars(1),
      activate:        true,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Unauthorized(_)));

  let err = h
    .books
    .create_book(&h.admin, NewBook {
      year:            1999,
      starting_amount: MoneyCents::dollars(1),
      activate:        true,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn reset_requires_the_phrase_and_clears_the_book() {
  let h = Harness::new().await;
  let book = h.active_book(1000).await;
  let id = h.submit(&h.admin, TransactionType::Spending, 400).await;
  h.workflow.approve(&h.admin, id, TypeScope::Any).await.unwrap();
  h.workflow
    .submit_fund_request(&h.agent_actor(), FundRequestInput {
      amount:  MoneyCents::dollars(60),
      purpose: "controlled buy".into(),
    })
    .await
    .unwrap();

  let err = h
    .books
    .reset_active_book(&h.admin, book.id, "reset")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let counts = h
    .books
    .reset_active_book(&h.admin, book.id, RESET_CONFIRMATION_PHRASE)
    .await
    .unwrap();
  assert_eq!(counts.transactions, 1);
  assert_eq!(counts.fund_requests, 1);
  assert_eq!(h.balance(book.id).await, MoneyCents::dollars(1000));
}

#[tokio::test]
async fn closed_book_cannot_be_reset_or_receive_entries() {
  let h = Harness::new().await;
  let book = h.active_book(1000).await;
  h.submit(&h.admin, TransactionType::Issuance, 10).await;
  h.books.close_book(&h.admin, book.id).await.unwrap();

  let err = h
    .books
    .reset_active_book(&h.admin, book.id, RESET_CONFIRMATION_PHRASE)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));

  let err = h
    .workflow
    .submit_transaction(&h.admin, tx_input(TransactionType::Issuance, 10))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));
  assert_eq!(h.books.summary(book.id).await.unwrap().pending_count, 1);
}

// ─── CI payments and fund requests ───────────────────────────────────────────

fn ci_input(dollars: i64) -> CiPaymentInput {
  CiPaymentInput {
    paying_agent_id:        None,
    informant_code:         "CI-7".into(),
    case_number:            None,
    purpose:                "tip on stash house".into(),
    amount:                 MoneyCents::dollars(dollars),
    receipt_number:         None,
    payment_date:           NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
    ci_signature:           Some("ci".into()),
    paying_agent_signature: Some("agent".into()),
    witness_signature:      Some("witness".into()),
  }
}

#[tokio::test]
async fn ci_payment_approval_needs_commander_signature() {
  let h = Harness::new().await;
  let book = h.active_book(1000).await;
  let payment = h
    .workflow
    .submit_ci_payment(&h.agent_actor(), ci_input(75))
    .await
    .unwrap();
  assert_eq!(payment.paying_agent_id, h.agent.id);

  let err = h
    .workflow
    .process_ci_payment(payment.id, Decision::Approve, &h.admin, None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let approved = h
    .workflow
    .process_ci_payment(payment.id, Decision::Approve, &h.admin, Some("Cmdr. Reyes".into()))
    .await
    .unwrap();
  assert_eq!(approved.commander_signature.as_deref(), Some("Cmdr. Reyes"));

  let summary = h.books.summary(book.id).await.unwrap();
  assert_eq!(summary.ci_payments_approved, MoneyCents::dollars(75));
  assert_eq!(summary.balance, MoneyCents::dollars(1000));
}

#[tokio::test]
async fn fund_request_approval_moves_no_money() {
  let h = Harness::new().await;
  let book = h.active_book(1000).await;
  let request = h
    .workflow
    .submit_fund_request(&h.agent_actor(), FundRequestInput {
      amount:  MoneyCents::dollars(300),
      purpose: "undercover purchase".into(),
    })
    .await
    .unwrap();

  let approved = h
    .workflow
    .process_fund_request(request.id, Decision::Approve, &h.admin)
    .await
    .unwrap();
  assert_eq!(approved.review.status, ReviewStatus::Approved);
  assert_eq!(h.balance(book.id).await, MoneyCents::dollars(1000));

  let err = h
    .workflow
    .process_fund_request(request.id, Decision::Reject { reason: None }, &h.admin)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));
}

// ─── Directory ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn directory_rejects_duplicates_and_self_demotion() {
  let h = Harness::new().await;

  let err = directory::register_agent(h.store.as_ref(), &h.feed, &h.admin, agent_input("2", "Copycat"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let admin = h.store.get_agent_by_user(h.admin.user_id).await.unwrap().unwrap();
  let err = directory::set_role(h.store.as_ref(), &h.feed, &h.admin, admin.id, Role::Agent)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));

  let promoted = directory::set_role(h.store.as_ref(), &h.feed, &h.admin, h.agent.id, Role::Admin)
    .await
    .unwrap();
  assert_eq!(promoted.role, Role::Admin);

  let err = directory::bootstrap_admin(h.store.as_ref(), agent_input("9", "Second"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));
}
