//! SQLite backend for the PEPI fund.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every state transition is a single
//! conditional statement or an immediate transaction, so concurrent callers
//! can never both win the same guard.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;


#[cfg(test)]
mod scenarios;
