//! Handlers for `/ci-payments` endpoints.
//!
//! Agents see the payments they made; admins see every payment.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use pepi_core::{
  Error,
  access::{self, Principal},
  ci_payment::{CiPayment, CiPaymentInput},
  notify::Notifier,
  review::Decision,
  store::PepiStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, identity::CurrentActor};

fn visible(principal: &Principal, payment: &CiPayment) -> bool {
  principal.is_admin()
    || payment.paying_agent_id == principal.agent.id
    || payment.created_by == principal.user_id()
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub book_id: Option<Uuid>,
}

/// `GET /ci-payments[?book_id=<id>]`
pub async fn list<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<CiPayment>>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let principal = access::resolve(state.store.as_ref(), &actor).await?;
  let payments = state
    .store
    .list_ci_payments(params.book_id)
    .await
    .map_err(Error::store)?
    .into_iter()
    .filter(|p| visible(&principal, p))
    .collect();
  Ok(Json(payments))
}

/// `GET /ci-payments/{id}`
pub async fn get_one<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<Json<CiPayment>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let principal = access::resolve(state.store.as_ref(), &actor).await?;
  let payment = state
    .store
    .get_ci_payment(id)
    .await
    .map_err(Error::store)?
    .filter(|p| visible(&principal, p))
    .ok_or_else(|| Error::NotFound { entity: "ci_payment", id: id.to_string() })?;
  Ok(Json(payment))
}

/// `POST /ci-payments`
pub async fn submit<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<CiPaymentInput>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let payment = state.workflow.submit_ci_payment(&actor, body).await?;
  Ok((StatusCode::CREATED, Json(payment)))
}

#[derive(Debug, Deserialize)]
pub struct ApproveBody {
  pub commander_signature: Option<String>,
}

/// `POST /ci-payments/{id}/approve` with body `{"commander_signature":"..."}`
pub async fn approve<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  Json(body): Json<ApproveBody>,
) -> Result<Json<CiPayment>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let payment = state
    .workflow
    .process_ci_payment(id, Decision::Approve, &actor, body.commander_signature)
    .await?;
  Ok(Json(payment))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
  pub reason: Option<String>,
}

/// `POST /ci-payments/{id}/reject`
pub async fn reject<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  body: Option<Json<RejectBody>>,
) -> Result<Json<CiPayment>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let reason = body.and_then(|Json(b)| b.reason);
  let payment = state
    .workflow
    .process_ci_payment(id, Decision::Reject { reason }, &actor, None)
    .await?;
  Ok(Json(payment))
}
