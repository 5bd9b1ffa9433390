//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error renders as `{"kind": <stable tag>, "error": <message>}`.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use pepi_core::{Error as CoreError, ErrorKind};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] CoreError),

  /// The identity headers were missing or unreadable.
  #[error("unauthenticated: {0}")]
  Unauthenticated(String),
}

impl ApiError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Unauthenticated(_) => ErrorKind::Unauthorized,
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
      Self::Core(e) => match e.kind() {
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::TypeMismatch => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::DependencyFailure | ErrorKind::Store => {
          StatusCode::INTERNAL_SERVER_ERROR
        }
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    let body = json!({ "kind": self.kind().as_str(), "error": self.to_string() });
    (status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn core_kinds_map_to_statuses() {
    let conflict = ApiError::from(CoreError::Conflict("raced".into()));
    assert_eq!(conflict.status(), StatusCode::CONFLICT);
    assert_eq!(conflict.kind().as_str(), "conflict");

    let mismatch = ApiError::from(CoreError::TypeMismatch {
      expected: "spending".into(),
      found:    "issuance".into(),
    });
    assert_eq!(mismatch.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let anon = ApiError::Unauthenticated("no x-user-id".into());
    assert_eq!(anon.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(anon.kind().as_str(), "unauthorized");
  }
}
