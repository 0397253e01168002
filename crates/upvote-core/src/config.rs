//! Voting settings shared by the history tracker and the vote service.

use serde::{Deserialize, Serialize};

/// Default name of the anonymous vote-history cookie.
pub const DEFAULT_COOKIE_NAME: &str = "VoteHistory";

/// Ten years, in seconds.
pub const DEFAULT_COOKIE_LIFESPAN_SECS: i64 = 315_569_260;

/// Static voting configuration, fixed for the lifetime of a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpvoteConfig {
  /// When `true`, only signed-in users may vote and their history lives in
  /// the history store. When `false`, history lives in a client cookie.
  pub require_login:        bool,
  /// Whether voters may retract a vote they have cast.
  pub allow_vote_removal:   bool,
  pub cookie_name:          String,
  pub cookie_lifespan_secs: i64,
}

impl Default for UpvoteConfig {
  fn default() -> Self {
    Self {
      require_login:        false,
      allow_vote_removal:   true,
      cookie_name:          DEFAULT_COOKIE_NAME.to_owned(),
      cookie_lifespan_secs: DEFAULT_COOKIE_LIFESPAN_SECS,
    }
  }
}
