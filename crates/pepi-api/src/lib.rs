//! JSON REST API for the PEPI fund.
//!
//! Exposes an axum [`Router`] backed by any [`pepi_core::store::PepiStore`]
//! and [`pepi_core::notify::Notifier`]. Authentication is the upstream
//! proxy's job; see [`identity`].
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", pepi_api::api_router(state))
//! ```

pub mod agents;
pub mod audit;
pub mod books;
pub mod ci_payments;
pub mod error;
pub mod fund_requests;
pub mod identity;
pub mod transactions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use pepi_core::{
  books::BookManager,
  feed::ChangeFeed,
  notify::Notifier,
  store::PepiStore,
  workflow::{ApprovalWorkflow, WorkflowConfig},
};

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct AppState<S, N> {
  pub store:    Arc<S>,
  pub feed:     ChangeFeed,
  pub workflow: ApprovalWorkflow<S, N>,
  pub books:    BookManager<S>,
}

impl<S, N> Clone for AppState<S, N> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      feed:     self.feed.clone(),
      workflow: self.workflow.clone(),
      books:    self.books.clone(),
    }
  }
}

impl<S, N> AppState<S, N>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  pub fn new(store: Arc<S>, notifier: Arc<N>, config: WorkflowConfig) -> Self {
    let feed = ChangeFeed::default();
    Self {
      workflow: ApprovalWorkflow::new(Arc::clone(&store), notifier, feed.clone(), config),
      books: BookManager::new(Arc::clone(&store), feed.clone()),
      feed,
      store,
    }
  }
}

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, N>(state: AppState<S, N>) -> Router<()>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  Router::new()
    // Agents
    .route("/agents", get(agents::list::<S, N>).post(agents::register::<S, N>))
    .route("/agents/me", get(agents::me::<S, N>))
    .route("/agents/{id}/role", put(agents::set_role::<S, N>))
    // Books
    .route("/books", get(books::list::<S, N>).post(books::create::<S, N>))
    .route("/books/active", get(books::active::<S, N>))
    .route("/books/{id}", get(books::get_one::<S, N>))
    .route("/books/{id}/activate", post(books::activate::<S, N>))
    .route("/books/{id}/deactivate", post(books::deactivate::<S, N>))
    .route("/books/{id}/close", post(books::close::<S, N>))
    .route("/books/{id}/reset", post(books::reset::<S, N>))
    .route("/books/{id}/summary", get(books::summary::<S, N>))
    .route("/books/{id}/running-balances", get(books::running_balances::<S, N>))
    .route("/books/{id}/reconciliation", get(books::reconciliation::<S, N>))
    // Transactions
    .route(
      "/transactions",
      get(transactions::list::<S, N>).post(transactions::submit::<S, N>),
    )
    .route(
      "/transactions/{id}",
      get(transactions::get_one::<S, N>)
        .put(transactions::edit::<S, N>)
        .delete(transactions::delete::<S, N>),
    )
    .route("/transactions/{id}/approve", post(transactions::approve::<S, N>))
    .route("/transactions/{id}/reject", post(transactions::reject::<S, N>))
    // CI payments
    .route(
      "/ci-payments",
      get(ci_payments::list::<S, N>).post(ci_payments::submit::<S, N>),
    )
    .route("/ci-payments/{id}", get(ci_payments::get_one::<S, N>))
    .route("/ci-payments/{id}/approve", post(ci_payments::approve::<S, N>))
    .route("/ci-payments/{id}/reject", post(ci_payments::reject::<S, N>))
    // Fund requests
    .route(
      "/fund-requests",
      get(fund_requests::list::<S, N>).post(fund_requests::submit::<S, N>),
    )
    .route("/fund-requests/{id}", get(fund_requests::get_one::<S, N>))
    .route("/fund-requests/{id}/approve", post(fund_requests::approve::<S, N>))
    .route("/fund-requests/{id}/reject", post(fund_requests::reject::<S, N>))
    // Audit
    .route("/audit", get(audit::list::<S, N>))
    .with_state(state)
}
