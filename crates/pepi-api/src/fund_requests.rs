//! Handlers for `/fund-requests` endpoints.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use pepi_core::{
  Error,
  access,
  fund_request::{FundRequest, FundRequestInput},
  notify::Notifier,
  review::Decision,
  store::PepiStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, identity::CurrentActor};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub book_id:  Option<Uuid>,
  pub agent_id: Option<Uuid>,
}

/// `GET /fund-requests[?book_id=&agent_id=]`
///
/// Agents only see their own requests.
pub async fn list<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<FundRequest>>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let principal = access::resolve(state.store.as_ref(), &actor).await?;
  let agent_id = if principal.is_admin() {
    params.agent_id
  } else {
    Some(principal.agent.id)
  };
  let requests = state
    .store
    .list_fund_requests(params.book_id, agent_id)
    .await
    .map_err(Error::store)?;
  Ok(Json(requests))
}

/// `GET /fund-requests/{id}`
pub async fn get_one<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<Json<FundRequest>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let principal = access::resolve(state.store.as_ref(), &actor).await?;
  let request = state
    .store
    .get_fund_request(id)
    .await
    .map_err(Error::store)?
    .filter(|r| principal.is_admin() || r.agent_id == principal.agent.id)
    .ok_or_else(|| Error::NotFound { entity: "fund_request", id: id.to_string() })?;
  Ok(Json(request))
}

/// `POST /fund-requests` with body `{"amount":25000,"purpose":"..."}`
pub async fn submit<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<FundRequestInput>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let request = state.workflow.submit_fund_request(&actor, body).await?;
  Ok((StatusCode::CREATED, Json(request)))
}

/// `POST /fund-requests/{id}/approve`
pub async fn approve<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<Json<FundRequest>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let request = state
    .workflow
    .process_fund_request(id, Decision::Approve, &actor)
    .await?;
  Ok(Json(request))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
  pub reason: Option<String>,
}

/// `POST /fund-requests/{id}/reject`
pub async fn reject<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  body: Option<Json<RejectBody>>,
) -> Result<Json<FundRequest>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let reason = body.and_then(|Json(b)| b.reason);
  let request = state
    .workflow
    .process_fund_request(id, Decision::Reject { reason }, &actor)
    .await?;
  Ok(Json(request))
}
