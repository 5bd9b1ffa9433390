//! Error types for `pepi-core`.
//!
//! Every caller-facing failure carries a stable [`ErrorKind`] alongside its
//! human-readable message.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The actor is unknown or lacks the role the operation requires.
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  /// The requested transition is not legal from the entity's current state.
  #[error("invalid state: {0}")]
  InvalidState(String),

  /// The entity is of the wrong kind for the workflow that was invoked.
  #[error("type mismatch: expected {expected}, found {found}")]
  TypeMismatch { expected: String, found: String },

  #[error("validation error: {0}")]
  Validation(String),

  /// A conditional write matched zero rows because the row changed
  /// underneath us.
  #[error("conflict: {0}")]
  Conflict(String),

  /// A best-effort side effect failed. Only ever logged.
  #[error("dependency failure: {0}")]
  DependencyFailure(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The stable, machine-distinguishable tag of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  Unauthorized,
  NotFound,
  InvalidState,
  TypeMismatch,
  #[serde(rename = "validation_error")]
  Validation,
  Conflict,
  DependencyFailure,
  #[serde(rename = "store_error")]
  Store,
}

impl ErrorKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Unauthorized => "unauthorized",
      Self::NotFound => "not_found",
      Self::InvalidState => "invalid_state",
      Self::TypeMismatch => "type_mismatch",
      Self::Validation => "validation_error",
      Self::Conflict => "conflict",
      Self::DependencyFailure => "dependency_failure",
      Self::Store => "store_error",
    }
  }
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Unauthorized(_) => ErrorKind::Unauthorized,
      Self::NotFound { .. } => ErrorKind::NotFound,
      Self::InvalidState(_) => ErrorKind::InvalidState,
      Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
      Self::Validation(_) => ErrorKind::Validation,
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::DependencyFailure(_) => ErrorKind::DependencyFailure,
      Self::Store(_) => ErrorKind::Store,
    }
  }

  pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
    Self::NotFound { entity, id: id.to_string() }
  }

  /// Wrap a backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kind_tags_are_stable() {
    let err = Error::TypeMismatch {
      expected: "spending".into(),
      found:    "issuance".into(),
    };
    assert_eq!(err.kind().as_str(), "type_mismatch");
    assert_eq!(
      serde_json::to_value(ErrorKind::Validation).unwrap(),
      serde_json::json!("validation_error")
    );
    assert_eq!(Error::not_found("book", "x").kind(), ErrorKind::NotFound);
  }
}
