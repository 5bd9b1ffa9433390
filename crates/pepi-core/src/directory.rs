//! The agent directory: who may act and with which role.

use serde_json::json;
use uuid::Uuid;

use crate::{
  Error, Result,
  access::{self, Actor, Principal},
  agent::{Agent, NewAgent, Role},
  audit::{AuditAction, NewAuditEntry},
  feed::{ChangeEvent, ChangeFeed, ChangeOp, Table},
  pipeline::record_audit,
  store::PepiStore,
};

/// Register a new agent. Admin-only.
pub async fn register_agent<S: PepiStore>(
  store: &S,
  feed: &ChangeFeed,
  actor: &Actor,
  input: NewAgent,
) -> Result<Agent> {
  let principal = access::authorize(store, actor, Role::Admin).await?;
  let agent = insert_agent(store, input).await?;
  tracing::info!(agent_id = %agent.id, badge_number = %agent.badge_number, role = %agent.role, "agent registered");

  record_audit(
    store,
    NewAuditEntry::new(AuditAction::AgentRegistered, "agent", agent.id)
      .by(principal.user_id(), principal.ip_address.clone())
      .details(json!({ "badge_number": agent.badge_number, "role": agent.role })),
  )
  .await;
  feed.publish(ChangeEvent::new(Table::Agents, ChangeOp::Insert, agent.id, None));
  Ok(agent)
}

/// Insert the very first admin, bypassing the admin gate.
///
/// Refuses when any admin already exists.
pub async fn bootstrap_admin<S: PepiStore>(store: &S, mut input: NewAgent) -> Result<Agent> {
  let agents = store.list_agents().await.map_err(Error::store)?;
  if agents.iter().any(Agent::is_admin) {
    return Err(Error::InvalidState("an admin agent already exists".into()));
  }
  input.role = Role::Admin;
  let agent = insert_agent(store, input).await?;
  tracing::info!(agent_id = %agent.id, "bootstrap admin created");
  Ok(agent)
}

/// Change an agent's role. Admin-only; admins cannot demote themselves.
pub async fn set_role<S: PepiStore>(
  store: &S,
  feed: &ChangeFeed,
  actor: &Actor,
  agent_id: Uuid,
  role: Role,
) -> Result<Agent> {
  let principal: Principal = access::authorize(store, actor, Role::Admin).await?;
  if principal.agent.id == agent_id && role != Role::Admin {
    return Err(Error::InvalidState("admins cannot demote themselves".into()));
  }
  let previous = store
    .get_agent(agent_id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::not_found("agent", agent_id))?;

  let agent = store
    .set_agent_role(agent_id, role)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::not_found("agent", agent_id))?;
  tracing::info!(agent_id = %agent_id, from = %previous.role, to = %role, "agent role changed");

  record_audit(
    store,
    NewAuditEntry::new(AuditAction::AgentRoleChanged, "agent", agent_id)
      .by(principal.user_id(), principal.ip_address.clone())
      .details(json!({ "from": previous.role, "to": role })),
  )
  .await;
  feed.publish(ChangeEvent::new(Table::Agents, ChangeOp::Update, agent_id, None));
  Ok(agent)
}

async fn insert_agent<S: PepiStore>(store: &S, mut input: NewAgent) -> Result<Agent> {
  input.validate()?;
  input.name = input.name.trim().to_owned();
  input.badge_number = input.badge_number.trim().to_owned();
  input.email = input
    .email
    .map(|e| e.trim().to_owned())
    .filter(|e| !e.is_empty());

  if store
    .get_agent_by_user(input.user_id)
    .await
    .map_err(Error::store)?
    .is_some()
  {
    return Err(Error::Validation(format!(
      "user {} is already registered",
      input.user_id
    )));
  }
  let agents = store.list_agents().await.map_err(Error::store)?;
  if agents.iter().any(|a| a.badge_number == input.badge_number) {
    return Err(Error::Validation(format!(
      "badge number {} is already in use",
      input.badge_number
    )));
  }

  store.add_agent(input).await.map_err(Error::store)
}
