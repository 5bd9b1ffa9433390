//! `GET /audit`: admin-only view of the append-only audit log.

use axum::{
  Json,
  extract::{Query, State},
};
use pepi_core::{
  Error,
  access,
  agent::Role,
  audit::{AuditLogEntry, AuditQuery},
  notify::Notifier,
  store::PepiStore,
};

use crate::{AppState, error::ApiError, identity::CurrentActor};

/// `GET /audit[?action=&entity_type=&entity_id=&user_id=&limit=&offset=]`
pub async fn list<S, N>(
  State(state): State<AppState<S, N>>,
  CurrentActor(actor): CurrentActor,
  Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError>
where
  S: PepiStore + 'static,
  N: Notifier + 'static,
{
  access::authorize(state.store.as_ref(), &actor, Role::Admin).await?;
  let entries = state.store.list_audit(&query).await.map_err(Error::store)?;
  Ok(Json(entries))
}
