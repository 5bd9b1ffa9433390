//! Core types, ledger rules and workflows for the PEPI fund.
//!
//! Nothing here knows about HTTP or SQL. Storage is reached through
//! [`store::PepiStore`], email through [`notify::Notifier`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod agent;
pub mod audit;
pub mod book;
pub mod books;
pub mod ci_payment;
pub mod directory;
pub mod error;
pub mod feed;
pub mod fund_request;
pub mod ledger;
pub mod money;
pub mod notify;
pub mod pipeline;
pub mod review;
pub mod store;
pub mod transaction;
pub mod workflow;

pub use error::{Error, ErrorKind, Result};
pub use money::MoneyCents;
