//! upvote server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, and serves the voting API over HTTP. The remaining subcommands are
//! maintenance helpers that run against the same store without a client.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for a `[[users]]` entry:
//!
//! ```
//! cargo run -p upvote-server -- hash-password
//! ```

mod config;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::{Parser, Subcommand};
use rand_core::{OsRng, RngCore};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use upvote_api::{
  AppState,
  auth::{RequestIdentity, UserDirectory},
  csrf::CsrfSigner,
};
use upvote_core::{
  identity::{Nobody, UserId, UserRef},
  service::VoteService,
  store::{HistoryStore, TotalsStore},
  vote::ItemKey,
};
use upvote_store_sqlite::SqliteStore;

use crate::config::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Upvote server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,
  /// Print the argon2 hash for a password entered on stdin and exit.
  HashPassword,
  /// Print the totals recorded for one item key, e.g. `42` or `42:stars`.
  Totals { item_key: String },
  /// Print a user's stored votes in one group.
  History {
    user_id: UserId,
    /// Group handle; omit for ungrouped items.
    #[arg(short, long)]
    group:   Option<String>,
  },
  /// Report the state of the store.
  Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  match cli.command.unwrap_or(Command::Serve) {
    Command::HashPassword => hash_password(),
    Command::Serve => {
      let (state, server_cfg) = open(&cli.config).await?;
      serve(state, &server_cfg.address()).await
    }
    Command::Totals { item_key } => {
      let key: ItemKey = item_key.parse()?;
      let (state, _) = open(&cli.config).await?;
      let totals = state.service.store().totals(&key).await?;
      println!("{}", serde_json::to_string_pretty(&totals)?);
      Ok(())
    }
    Command::History { user_id, group } => {
      let (state, _) = open(&cli.config).await?;
      // Headless: only the user directory, nobody signed in.
      let identity = RequestIdentity::new(state.users.clone(), None);
      let tracker = state.service.tracker(&identity);
      if tracker.validate_user_id(UserRef::Id(user_id)).is_none() {
        anyhow::bail!("no configured user with id {user_id}");
      }
      let votes = tracker
        .votes_in_group(group.as_deref().filter(|g| !g.is_empty()), UserRef::Id(user_id))
        .await;
      println!("{}", serde_json::to_string_pretty(&votes)?);
      Ok(())
    }
    Command::Status => {
      let (state, _) = open(&cli.config).await?;
      status(&state).await
    }
  }
}

/// Load configuration and open the store it names.
async fn open(path: &Path) -> anyhow::Result<(AppState<SqliteStore>, ServerConfig)> {
  let server_cfg = ServerConfig::load(path)
    .with_context(|| format!("failed to load configuration from {path:?}"))?;

  let store_path = server_cfg.store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let csrf = CsrfSigner::new(csrf_secret(&server_cfg))
    .map_err(|e| anyhow::anyhow!("invalid csrf_secret: {e}"))?;

  let state = AppState {
    service: Arc::new(VoteService::new(Arc::new(store), Arc::new(server_cfg.voting()))),
    users:   Arc::new(UserDirectory::new(server_cfg.users.clone())),
    csrf:    Arc::new(csrf),
  };
  Ok((state, server_cfg))
}

async fn serve(state: AppState<SqliteStore>, address: &str) -> anyhow::Result<()> {
  let app = upvote_api::router(state);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn status(state: &AppState<SqliteStore>) -> anyhow::Result<()> {
  let store = state.service.store();
  let config = state.service.config();
  let source = state.service.tracker(&Nobody).source();

  println!("history source:     {source:?}");
  println!("removal allowed:    {}", config.allow_vote_removal);
  println!("history table:      {}", if store.history_provisioned().await? { "present" } else { "missing" });
  println!("legacy totals:      {}", if store.has_legacy_data().await? { "yes" } else { "no" });
  Ok(())
}

fn csrf_secret(cfg: &ServerConfig) -> String {
  if let Some(secret) = cfg.csrf_secret.as_ref().filter(|s| !s.is_empty()) {
    return secret.clone();
  }
  tracing::warn!("csrf_secret is not set; generated tokens will not survive a restart");
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

fn hash_password() -> anyhow::Result<()> {
  let password = read_password()?;
  let salt = SaltString::generate(&mut OsRng);
  let hash = Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
    .to_string();
  println!("{hash}");
  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}
