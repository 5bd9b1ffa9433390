//! Identity extraction.
//!
//! Authentication happens upstream: the auth proxy sets `x-user-id` to the
//! external user id and appends the client address to `x-forwarded-for`.

use axum::{extract::FromRequestParts, http::request::Parts};
use pepi_core::access::Actor;
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// The caller of the current request.
pub struct CurrentActor(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for CurrentActor {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    let raw = parts
      .headers
      .get(USER_ID_HEADER)
      .and_then(|v| v.to_str().ok())
      .ok_or_else(|| ApiError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?;
    let user_id = Uuid::parse_str(raw.trim())
      .map_err(|_| ApiError::Unauthenticated(format!("malformed {USER_ID_HEADER} header")))?;

    // The left-most entry is the original client.
    let ip_address = parts
      .headers
      .get(FORWARDED_FOR_HEADER)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.split(',').next())
      .map(str::trim)
      .filter(|ip| !ip.is_empty())
      .map(str::to_owned);

    Ok(Self(Actor { user_id, ip_address }))
  }
}
