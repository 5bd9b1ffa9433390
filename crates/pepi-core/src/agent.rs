//! Agents: task-force members who hold or spend PEPI funds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// What an agent is allowed to do.
///
/// `Admin` may review transactions and manage books and agents; `Agent` may
/// only create and edit their own submissions.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  Agent,
  Admin,
}

impl Role {
  /// Whether holding `self` satisfies a requirement for `required`.
  pub fn satisfies(self, required: Role) -> bool {
    match required {
      Role::Agent => true,
      Role::Admin => self == Role::Admin,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
  pub id:           Uuid,
  pub name:         String,
  pub badge_number: String,
  pub email:        Option<String>,
  pub role:         Role,
  /// Reference to the account in the external identity provider.
  pub user_id:      Uuid,
  pub created_at:   DateTime<Utc>,
}

impl Agent {
  pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

/// Input to [`crate::store::PepiStore::add_agent`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewAgent {
  pub name:         String,
  pub badge_number: String,
  pub email:        Option<String>,
  #[serde(default = "default_role")]
  pub role:         Role,
  pub user_id:      Uuid,
}

fn default_role() -> Role { Role::Agent }

impl NewAgent {
  pub fn validate(&self) -> crate::Result<()> {
    if self.name.trim().is_empty() {
      return Err(crate::Error::Validation("agent name is required".into()));
    }
    if self.badge_number.trim().is_empty() {
      return Err(crate::Error::Validation("badge number is required".into()));
    }
    if let Some(email) = &self.email
      && !email.contains('@')
    {
      return Err(crate::Error::Validation(format!(
        "invalid email address: {email:?}"
      )));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn admin_satisfies_everything_agent_only_agent() {
    assert!(Role::Admin.satisfies(Role::Admin));
    assert!(Role::Admin.satisfies(Role::Agent));
    assert!(Role::Agent.satisfies(Role::Agent));
    assert!(!Role::Agent.satisfies(Role::Admin));
  }

  #[test]
  fn role_strings_round_trip() {
    assert_eq!(Role::Admin.as_ref(), "admin");
    assert_eq!("agent".parse::<Role>().unwrap(), Role::Agent);
  }

  #[test]
  fn new_agent_requires_badge_and_sane_email() {
    let mut input = NewAgent {
      name:         "Dana Reyes".into(),
      badge_number: "".into(),
      email:        Some("dana@example.org".into()),
      role:         Role::Agent,
      user_id:      Uuid::new_v4(),
    };
    assert!(input.validate().is_err());

    input.badge_number = "4471".into();
    assert!(input.validate().is_ok());

    input.email = Some("not-an-address".into());
    assert!(input.validate().is_err());
  }
}
