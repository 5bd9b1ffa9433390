//! Who is acting, and what they may do.
//!
//! Identity comes from the external provider as a bare user id; the role is
//! always looked up from the agents table. Every gated operation goes through
//! [`require_role`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  agent::{Agent, Role},
  store::PepiStore,
};

/// The caller as reported by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub user_id:    Uuid,
  pub ip_address: Option<String>,
}

impl Actor {
  pub fn new(user_id: Uuid) -> Self { Self { user_id, ip_address: None } }
}

/// An [`Actor`] resolved to their agent record.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
  pub agent:      Agent,
  pub ip_address: Option<String>,
}

impl Principal {
  pub fn user_id(&self) -> Uuid { self.agent.user_id }

  pub fn is_admin(&self) -> bool { self.agent.is_admin() }
}

/// Resolve `actor` to a [`Principal`]. An unknown user is unauthorized.
pub async fn resolve<S: PepiStore>(store: &S, actor: &Actor) -> Result<Principal> {
  let agent = store
    .get_agent_by_user(actor.user_id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| {
      Error::Unauthorized(format!("user {} is not a registered agent", actor.user_id))
    })?;
  Ok(Principal { agent, ip_address: actor.ip_address.clone() })
}

/// The single capability check used by every gated operation.
pub fn require_role(principal: &Principal, role: Role) -> Result<()> {
  if principal.agent.role.satisfies(role) {
    Ok(())
  } else {
    Err(Error::Unauthorized(format!(
      "{} role required; {} is {}",
      role, principal.agent.name, principal.agent.role
    )))
  }
}

/// Resolve and require in one step.
pub async fn authorize<S: PepiStore>(
  store: &S,
  actor: &Actor,
  role: Role,
) -> Result<Principal> {
  let principal = resolve(store, actor).await?;
  require_role(&principal, role)?;
  Ok(principal)
}
