//! Handlers for `/books` endpoints.
//!
//! Reads are open to any registered agent; every transition is admin-only
//! and enforced by [`BookManager`](pepi_core::books::BookManager).

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use pepi_core::{
  Error,
  access,
  book::{NewBook, PepiBook, ResetCounts},
  ledger::{BookSummary, MonthlyReconciliation, RunningBalance},
  notify::Notifier,
  store::PepiStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, identity::CurrentActor};

// ─── Reads ────────────────────────────────────────────────────────────────────

/// `GET /books`
pub async fn list<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<Vec<PepiBook>>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  access::resolve(state.store.as_ref(), &actor).await?;
  Ok(Json(state.books.list_books().await?))
}

/// `GET /books/active`: 404 when no book is active.
pub async fn active<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<PepiBook>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  access::resolve(state.store.as_ref(), &actor).await?;
  let book = state
    .books
    .active_book()
    .await?
    .ok_or_else(|| Error::NotFound { entity: "book", id: "active".into() })?;
  Ok(Json(book))
}

/// `GET /books/{id}`
pub async fn get_one<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<Json<PepiBook>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  access::resolve(state.store.as_ref(), &actor).await?;
  Ok(Json(state.books.get_book(id).await?))
}

/// `GET /books/{id}/summary`
pub async fn summary<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<Json<BookSummary>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  access::resolve(state.store.as_ref(), &actor).await?;
  Ok(Json(state.books.summary(id).await?))
}

/// `GET /books/{id}/running-balances`
pub async fn running_balances<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<RunningBalance>>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  access::resolve(state.store.as_ref(), &actor).await?;
  Ok(Json(state.books.running_balances(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct MonthParams {
  pub year:  i32,
  pub month: u32,
}

/// `GET /books/{id}/reconciliation?year=<y>&month=<m>`
pub async fn reconciliation<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  Query(params): Query<MonthParams>,
) -> Result<Json<MonthlyReconciliation>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  access::resolve(state.store.as_ref(), &actor).await?;
  let report = state.books.reconciliation(id, params.year, params.month).await?;
  Ok(Json(report))
}

// ─── Transitions ──────────────────────────────────────────────────────────────

/// `POST /books` with body [`NewBook`]
pub async fn create<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<NewBook>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let book = state.books.create_book(&actor, body).await?;
  Ok((StatusCode::CREATED, Json(book)))
}

/// `POST /books/{id}/activate`
pub async fn activate<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<Json<PepiBook>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  Ok(Json(state.books.activate_book(&actor, id).await?))
}

/// `POST /books/{id}/deactivate`
pub async fn deactivate<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<Json<PepiBook>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  Ok(Json(state.books.deactivate_book(&actor, id).await?))
}

/// `POST /books/{id}/close`
pub async fn close<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<Json<PepiBook>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  Ok(Json(state.books.close_book(&actor, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResetBody {
  pub confirmation: String,
}

/// `POST /books/{id}/reset` with body `{"confirmation":"RESET PEPI BOOK"}`
pub async fn reset<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  Json(body): Json<ResetBody>,
) -> Result<Json<ResetCounts>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let counts = state.books.reset_active_book(&actor, id, &body.confirmation).await?;
  Ok(Json(counts))
}
