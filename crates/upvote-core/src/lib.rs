//! Core types and trait definitions for Upvote.
//!
//! Voters cast, change, or remove directional votes on items; this crate owns
//! the history bookkeeping and the reconciliation of a vote request against
//! the item's running totals. It is free of HTTP and database dependencies.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod config;
pub mod error;
pub mod history;
pub mod identity;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod vote;

pub use error::{Error, Result};
