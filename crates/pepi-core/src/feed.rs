//! In-process change feed.
//!
//! Every successful mutation publishes a [`ChangeEvent`]. Listeners register
//! a callback with a [`ChangeFilter`] and get back a [`Subscription`] that
//! stops the callback when cancelled or dropped. Callbacks are expected to
//! recompute their view from the store, never to patch it from the event.

use std::{future::Future, sync::Arc};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use tokio::{
  sync::{broadcast, watch},
  task::JoinHandle,
};
use uuid::Uuid;

use crate::{Result, books::book_summary, ledger::BookSummary, store::PepiStore};

const DEFAULT_CAPACITY: usize = 256;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Table {
  Agents,
  Books,
  Transactions,
  CiPayments,
  FundRequests,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeOp {
  Insert,
  Update,
  Delete,
  /// Events were dropped before this listener saw them; recompute anyway.
  Resync,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
  pub table:     Table,
  pub op:        ChangeOp,
  pub entity_id: Option<Uuid>,
  /// The book the changed row belongs to, when it belongs to one.
  pub book_id:   Option<Uuid>,
}

impl ChangeEvent {
  pub fn new(table: Table, op: ChangeOp, entity_id: Uuid, book_id: Option<Uuid>) -> Self {
    Self { table, op, entity_id: Some(entity_id), book_id }
  }
}

/// Which events a listener wants. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeFilter {
  pub table:   Option<Table>,
  pub book_id: Option<Uuid>,
}

impl ChangeFilter {
  pub fn book(book_id: Uuid) -> Self { Self { table: None, book_id: Some(book_id) } }

  pub fn matches(&self, event: &ChangeEvent) -> bool {
    if event.op == ChangeOp::Resync {
      return true;
    }
    self.table.is_none_or(|t| t == event.table)
      && self.book_id.is_none_or(|b| event.book_id == Some(b))
  }
}

/// Cheap to clone; all clones publish to the same listeners.
#[derive(Clone)]
pub struct ChangeFeed {
  sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
  fn default() -> Self { Self::new(DEFAULT_CAPACITY) }
}

impl ChangeFeed {
  pub fn new(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity);
    Self { sender }
  }

  /// Publish an event. Having no listeners is not an error.
  pub fn publish(&self, event: ChangeEvent) {
    tracing::trace!(table = %event.table, op = %event.op, entity_id = ?event.entity_id, "change published");
    let _ = self.sender.send(event);
  }

  /// Run `callback` on a background task for each event matching `filter`.
  ///
  /// Must be called from within a tokio runtime.
  pub fn listen<F, Fut>(&self, filter: ChangeFilter, mut callback: F) -> Subscription
  where
    F: FnMut(ChangeEvent) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let mut receiver = self.sender.subscribe();
    let handle = tokio::spawn(async move {
      loop {
        match receiver.recv().await {
          Ok(event) if filter.matches(&event) => callback(event).await,
          Ok(_) => {}
          Err(broadcast::error::RecvError::Lagged(missed)) => {
            tracing::warn!(missed, "change listener lagged; forcing resync");
            callback(ChangeEvent {
              table:     filter.table.unwrap_or(Table::Transactions),
              op:        ChangeOp::Resync,
              entity_id: None,
              book_id:   filter.book_id,
            })
            .await;
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    });
    Subscription { handle }
  }
}

/// Handle to a registered listener. Dropping it cancels the listener.
pub struct Subscription {
  handle: JoinHandle<()>,
}

impl Subscription {
  pub fn cancel(self) {}

  pub fn is_active(&self) -> bool { !self.handle.is_finished() }
}

impl Drop for Subscription {
  fn drop(&mut self) { self.handle.abort(); }
}

// ─── Live balance ────────────────────────────────────────────────────────────

/// A [`BookSummary`] kept fresh by recomputing it in full from the store on
/// every change to its book.
pub struct LiveBalance {
  receiver:      watch::Receiver<BookSummary>,
  _subscription: Subscription,
}

impl LiveBalance {
  pub async fn watch<S>(store: Arc<S>, feed: &ChangeFeed, book_id: Uuid) -> Result<Self>
  where
    S: PepiStore + 'static,
  {
    let initial = book_summary(store.as_ref(), book_id).await?;
    let (sender, receiver) = watch::channel(initial);

    let subscription = feed.listen(ChangeFilter::book(book_id), move |event| {
      let store = Arc::clone(&store);
      let sender = sender.clone();
      async move {
        match book_summary(store.as_ref(), book_id).await {
          Ok(summary) => {
            sender.send_replace(summary);
          }
          Err(e) => tracing::warn!(
            book_id = %book_id,
            table = %event.table,
            error = %e,
            "live balance recomputation failed"
          ),
        }
      }
    });

    Ok(Self { receiver, _subscription: subscription })
  }

  pub fn current(&self) -> BookSummary { self.receiver.borrow().clone() }

  /// A receiver that yields each recomputed summary.
  pub fn subscribe(&self) -> watch::Receiver<BookSummary> { self.receiver.clone() }
}
