//! Handlers for `/transactions` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/transactions` | `?book_id=&agent_id=&status=&transaction_type=` |
//! | `POST`   | `/transactions` | Body: [`TransactionInput`] |
//! | `GET`    | `/transactions/{id}` | |
//! | `PUT`    | `/transactions/{id}` | Edit and resubmit; body: [`TransactionEdit`] |
//! | `DELETE` | `/transactions/{id}` | Pending only |
//! | `POST`   | `/transactions/{id}/approve` | Admin; body: `{"expected_type"?}` |
//! | `POST`   | `/transactions/{id}/reject` | Admin; body: `{"reason"?, "expected_type"?}` |
//!
//! Agents only ever see their own transactions; the `agent_id` filter is
//! overridden for them.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use pepi_core::{
  Error,
  access,
  notify::Notifier,
  store::PepiStore,
  transaction::{
    Transaction, TransactionEdit, TransactionInput, TransactionQuery, TransactionType,
    TypeScope,
  },
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, identity::CurrentActor};

// ─── Reads ────────────────────────────────────────────────────────────────────

/// `GET /transactions`
pub async fn list<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Query(mut query): Query<TransactionQuery>,
) -> Result<Json<Vec<Transaction>>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let principal = access::resolve(state.store.as_ref(), &actor).await?;
  if !principal.is_admin() {
    query.agent_id = Some(principal.agent.id);
  }
  let txs = state
    .store
    .list_transactions(&query)
    .await
    .map_err(Error::store)?;
  Ok(Json(txs))
}

/// `GET /transactions/{id}`
pub async fn get_one<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let principal = access::resolve(state.store.as_ref(), &actor).await?;
  let tx = state
    .store
    .get_transaction(id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound { entity: "transaction", id: id.to_string() })?;
  if !principal.is_admin() && !tx.is_owned_by(&principal.agent) {
    return Err(Error::NotFound { entity: "transaction", id: id.to_string() }.into());
  }
  Ok(Json(tx))
}

// ─── Submit / edit / delete ───────────────────────────────────────────────────

/// `POST /transactions`
pub async fn submit<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<TransactionInput>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let tx = state.workflow.submit_transaction(&actor, body).await?;
  Ok((StatusCode::CREATED, Json(tx)))
}

/// `PUT /transactions/{id}`: the result is always `pending`.
pub async fn edit<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  Json(body): Json<TransactionEdit>,
) -> Result<Json<Transaction>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  Ok(Json(state.workflow.edit_transaction(&actor, id, body).await?))
}

/// `DELETE /transactions/{id}`
pub async fn delete<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  state.workflow.delete_transaction(&actor, id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Review ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ApproveBody {
  pub expected_type: Option<TransactionType>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
  pub reason:        Option<String>,
  pub expected_type: Option<TransactionType>,
}

fn scope(expected: Option<TransactionType>) -> TypeScope {
  expected.map_or(TypeScope::Any, TypeScope::Only)
}

/// `POST /transactions/{id}/approve`: the body may be omitted.
pub async fn approve<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  body: Option<Json<ApproveBody>>,
) -> Result<Json<Transaction>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let body = body.map(|Json(b)| b).unwrap_or_default();
  let tx = state
    .workflow
    .approve(&actor, id, scope(body.expected_type))
    .await?;
  Ok(Json(tx))
}

/// `POST /transactions/{id}/reject`
pub async fn reject<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  body: Option<Json<RejectBody>>,
) -> Result<Json<Transaction>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let body = body.map(|Json(b)| b).unwrap_or_default();
  let tx = state
    .workflow
    .reject(&actor, id, body.reason, scope(body.expected_type))
    .await?;
  Ok(Json(tx))
}
