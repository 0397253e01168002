//! [`SqliteStore`]: the SQLite implementation of the Upvote store traits.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tracing::debug;
use upvote_core::{
  identity::UserId,
  service::apply_change,
  store::{HistoryStore, TotalsStore, VoteCommit, VoteStore},
  vote::{ItemKey, ItemTotals, VoterHistory},
};

use crate::{
  Error, Result,
  encode::{
    RawTotals, decode_history, decode_history_in_call, encode_dt, encode_group,
    encode_history, encode_history_in_call,
  },
  schema::{HISTORY_TABLE, SCHEMA},
};

const UPSERT_TOTALS: &str = "
  INSERT INTO element_totals (
    element_id, item_group, tally, total_votes, total_upvotes, total_downvotes, updated_at
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
  ON CONFLICT (element_id, item_group) DO UPDATE SET
    tally           = excluded.tally,
    total_votes     = excluded.total_votes,
    total_upvotes   = excluded.total_upvotes,
    total_downvotes = excluded.total_downvotes,
    updated_at      = excluded.updated_at";

const UPSERT_HISTORY: &str = "
  INSERT INTO user_histories (user_id, history, updated_at) VALUES (?1, ?2, ?3)
  ON CONFLICT (user_id) DO UPDATE SET
    history    = excluded.history,
    updated_at = excluded.updated_at";

// ─── Store ───────────────────────────────────────────────────────────────────

/// Vote histories and item totals backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted. Every
/// closure passed to the connection runs on one background thread, so each
/// call is serialised against all others.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and apply the schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let store = Self::connect(path).await?;
    store.migrate().await?;
    Ok(store)
  }

  /// Open an in-memory store with the schema applied, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let store = Self::connect_in_memory().await?;
    store.migrate().await?;
    Ok(store)
  }

  /// Open a store at `path` without touching its schema.
  pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Ok(Self { conn })
  }

  /// Open an empty in-memory store without a schema.
  pub async fn connect_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Ok(Self { conn })
  }

  /// Create any missing tables.
  pub async fn migrate(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    debug!("schema applied");
    Ok(())
  }

  #[cfg(test)]
  pub(crate) fn connection(&self) -> &tokio_rusqlite::Connection { &self.conn }
}

// ─── HistoryStore impl ───────────────────────────────────────────────────────

impl HistoryStore for SqliteStore {
  type Error = Error;

  async fn history_provisioned(&self) -> Result<bool> {
    let exists = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
          rusqlite::params![HISTORY_TABLE],
          |row| row.get::<_, bool>(0),
        )?)
      })
      .await?;
    Ok(exists)
  }

  async fn user_history(&self, user_id: UserId) -> Result<VoterHistory> {
    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT history FROM user_histories WHERE user_id = ?1",
            rusqlite::params![user_id],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;

    Ok(raw.as_deref().map(decode_history).transpose()?.unwrap_or_default())
  }

  async fn set_user_history(&self, user_id: UserId, history: VoterHistory) -> Result<()> {
    let history_str = encode_history(&history)?;
    let at_str      = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(UPSERT_HISTORY, rusqlite::params![user_id, history_str, at_str])?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── TotalsStore impl ────────────────────────────────────────────────────────

impl TotalsStore for SqliteStore {
  type Error = Error;

  async fn totals(&self, key: &ItemKey) -> Result<ItemTotals> {
    let element_id = key.element_id();
    let group_str  = encode_group(key.group());

    let raw: Option<RawTotals> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT tally, total_votes, total_upvotes, total_downvotes
             FROM element_totals WHERE element_id = ?1 AND item_group = ?2",
            rusqlite::params![element_id, group_str],
            RawTotals::from_row,
          )
          .optional()?)
      })
      .await?;

    Ok(raw.map(RawTotals::into_totals).unwrap_or_default())
  }

  async fn set_totals(&self, key: &ItemKey, totals: ItemTotals) -> Result<()> {
    let element_id = key.element_id();
    let group_str  = encode_group(key.group());
    let at_str     = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          UPSERT_TOTALS,
          rusqlite::params![
            element_id,
            group_str,
            totals.tally,
            totals.total_votes,
            totals.total_upvotes,
            totals.total_downvotes,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn has_legacy_data(&self) -> Result<bool> {
    let legacy = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT EXISTS (SELECT 1 FROM element_totals WHERE legacy_total <> 0)",
          [],
          |row| row.get::<_, bool>(0),
        )?)
      })
      .await?;
    Ok(legacy)
  }
}

// ─── VoteStore impl ──────────────────────────────────────────────────────────

impl VoteStore for SqliteStore {
  /// Apply the history change and write the totals in one transaction.
  ///
  /// The history change is applied to the row as it is inside the
  /// transaction, so concurrent votes by one user on different items do not
  /// overwrite each other.
  async fn commit_vote(&self, commit: VoteCommit) -> Result<()> {
    let VoteCommit { item_key, totals, history } = commit;
    let element_id = item_key.element_id();
    let group_str  = encode_group(item_key.group());
    let at_str     = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if let Some((user_id, change)) = history {
          let raw: Option<String> = tx
            .query_row(
              "SELECT history FROM user_histories WHERE user_id = ?1",
              rusqlite::params![user_id],
              |row| row.get(0),
            )
            .optional()?;
          let mut stored = raw
            .as_deref()
            .map(decode_history_in_call)
            .transpose()?
            .unwrap_or_default();

          if apply_change(&mut stored, &item_key, change) {
            let history_str = encode_history_in_call(&stored)?;
            tx.execute(UPSERT_HISTORY, rusqlite::params![user_id, history_str, at_str])?;
          }
        }

        tx.execute(
          UPSERT_TOTALS,
          rusqlite::params![
            element_id,
            group_str,
            totals.tally,
            totals.total_votes,
            totals.total_upvotes,
            totals.total_downvotes,
            at_str,
          ],
        )?;

        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
