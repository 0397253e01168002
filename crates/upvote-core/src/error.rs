//! Error types for `upvote-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The element id is missing, zero, negative, or not an integer.
  #[error("malformed item key: {0:?}")]
  MalformedItemKey(String),

  #[error("invalid vote value {0}: expected 1 or -1")]
  InvalidVote(i64),

  #[error("login is required to vote")]
  LoginRequired,

  #[error("vote removal is disabled")]
  RemovalDisabled,

  /// A history or totals read/write failed; nothing was committed.
  #[error("store unavailable: {0}")]
  StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::StoreUnavailable(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
