//! Error type for `pepi-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored tag (role, status, type, action) that no variant matches.
  #[error("unknown {column} value: {value:?}")]
  UnknownTag { column: &'static str, value: String },
}

impl Error {
  /// Carry this error out of a `Connection::call` closure.
  pub(crate) fn into_call(self) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(self))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
