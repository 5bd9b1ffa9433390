//! Stages of a state-changing operation and how each one may fail.
//!
//! Stages up to and including `Persist` abort the operation on error. Stages
//! after it are best-effort: their failures are logged and swallowed, and
//! they never undo the persisted transition.

use std::{fmt::Display, future::Future};

use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::{audit::NewAuditEntry, store::PepiStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
  Authorize,
  Load,
  Validate,
  Persist,
  Notify,
  Audit,
  Invalidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
  /// Abort and surface the error; nothing has been written.
  FailFast,
  /// Log and continue; the caller never sees the error.
  FailSoft,
}

impl Stage {
  pub const fn failure_mode(self) -> FailureMode {
    match self {
      Self::Authorize | Self::Load | Self::Validate | Self::Persist => {
        FailureMode::FailFast
      }
      Self::Notify | Self::Audit | Self::Invalidate => FailureMode::FailSoft,
    }
  }
}

/// The full pipeline, in execution order, with each stage's failure mode.
pub const STAGE_POLICY: [(Stage, FailureMode); 7] = [
  (Stage::Authorize, Stage::Authorize.failure_mode()),
  (Stage::Load, Stage::Load.failure_mode()),
  (Stage::Validate, Stage::Validate.failure_mode()),
  (Stage::Persist, Stage::Persist.failure_mode()),
  (Stage::Notify, Stage::Notify.failure_mode()),
  (Stage::Audit, Stage::Audit.failure_mode()),
  (Stage::Invalidate, Stage::Invalidate.failure_mode()),
];

/// How best-effort stages are scheduled relative to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dispatch {
  /// Spawn onto the runtime; the caller returns without waiting.
  #[default]
  Background,
  /// Await before returning. Failures are still swallowed.
  Inline,
}

impl Dispatch {
  pub async fn run<F>(self, work: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    match self {
      Self::Background => {
        tokio::spawn(work);
      }
      Self::Inline => work.await,
    }
  }
}

/// Log a best-effort stage's failure.
pub(crate) fn soft_failure(stage: Stage, subject: &str, error: &dyn Display) {
  debug_assert_eq!(stage.failure_mode(), FailureMode::FailSoft);
  tracing::warn!(stage = %stage, subject, error = %error, "side effect failed");
}

/// Append an audit entry, logging instead of failing.
pub(crate) async fn record_audit<S: PepiStore>(store: &S, entry: NewAuditEntry) {
  let subject = format!(
    "{} {}",
    entry.action,
    entry.entity_id.map(|id| id.to_string()).unwrap_or_default()
  );
  if let Err(e) = store.append_audit(entry).await {
    soft_failure(Stage::Audit, &subject, &e);
  }
}
