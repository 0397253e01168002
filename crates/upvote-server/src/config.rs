//! Server configuration, read from `config.toml` and `UPVOTE_*` variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use upvote_api::auth::UserAccount;
use upvote_core::config::{DEFAULT_COOKIE_LIFESPAN_SECS, DEFAULT_COOKIE_NAME, UpvoteConfig};

/// Everything the `upvote` binary needs to run.
///
/// ```toml
/// host          = "127.0.0.1"
/// port          = 5240
/// store_path    = "~/.local/share/upvote/votes.db"
/// require_login = true
/// csrf_secret   = "change me"
///
/// [[users]]
/// id            = 1
/// username      = "alice"
/// password_hash = "$argon2id$v=19$..."
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  pub store_path:           PathBuf,
  pub require_login:        bool,
  pub allow_vote_removal:   bool,
  pub cookie_name:          String,
  pub cookie_lifespan_secs: i64,
  /// Signing secret for anti-forgery tokens. A random one is generated at
  /// startup when unset, which invalidates outstanding tokens on restart.
  pub csrf_secret:          Option<String>,
  pub users:                Vec<UserAccount>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                 "127.0.0.1".to_string(),
      port:                 5240,
      store_path:           PathBuf::from("upvote.db"),
      require_login:        false,
      allow_vote_removal:   true,
      cookie_name:          DEFAULT_COOKIE_NAME.to_string(),
      cookie_lifespan_secs: DEFAULT_COOKIE_LIFESPAN_SECS,
      csrf_secret:          None,
      users:                Vec::new(),
    }
  }
}

impl ServerConfig {
  /// Layer `path` (optional) and `UPVOTE_*` environment variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("UPVOTE"))
      .build()?
      .try_deserialize()
  }

  /// The voting settings handed to the core service.
  pub fn voting(&self) -> UpvoteConfig {
    UpvoteConfig {
      require_login:        self.require_login,
      allow_vote_removal:   self.allow_vote_removal,
      cookie_name:          self.cookie_name.clone(),
      cookie_lifespan_secs: self.cookie_lifespan_secs,
    }
  }

  /// `store_path` with a leading `~` expanded.
  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
