//! Handlers for `/agents` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/agents` | Any registered agent |
//! | `POST` | `/agents` | Admin; body: [`NewAgent`] |
//! | `GET`  | `/agents/me` | The caller's own record |
//! | `PUT`  | `/agents/{id}/role` | Admin; body: `{"role":"admin"}` |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use pepi_core::{
  Error,
  access,
  agent::{Agent, NewAgent, Role},
  directory,
  notify::Notifier,
  store::PepiStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, identity::CurrentActor};

/// `GET /agents`
pub async fn list<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<Vec<Agent>>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  access::resolve(state.store.as_ref(), &actor).await?;
  let agents = state.store.list_agents().await.map_err(Error::store)?;
  Ok(Json(agents))
}

/// `POST /agents`
pub async fn register<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<NewAgent>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let agent =
    directory::register_agent(state.store.as_ref(), &state.feed, &actor, body).await?;
  Ok((StatusCode::CREATED, Json(agent)))
}

/// `GET /agents/me`
pub async fn me<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<Agent>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let principal = access::resolve(state.store.as_ref(), &actor).await?;
  Ok(Json(principal.agent))
}

#[derive(Debug, Deserialize)]
pub struct RoleBody {
  pub role: Role,
}

/// `PUT /agents/{id}/role`
pub async fn set_role<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  Json(body): Json<RoleBody>,
) -> Result<Json<Agent>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  let agent =
    directory::set_role(state.store.as_ref(), &state.feed, &actor, id, body.role).await?;
  Ok(Json(agent))
}
