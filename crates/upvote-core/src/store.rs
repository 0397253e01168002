//! Storage traits for vote histories and item totals.
//!
//! The traits are implemented by storage backends (e.g. `upvote-store-sqlite`).
//! Higher layers (`upvote-api`, `upvote-server`) depend on these abstractions,
//! not on any concrete backend.

use std::future::Future;

use crate::{
  identity::UserId,
  reconcile::HistoryChange,
  vote::{ItemKey, ItemTotals, VoterHistory},
};

// ─── History ─────────────────────────────────────────────────────────────────

/// Persisted vote histories of authenticated users, one per user id.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait HistoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Whether the history table exists. Before provisioning every read path
  /// treats histories as empty instead of failing.
  fn history_provisioned(
    &self,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// The full history of `user_id`; empty if the user has never voted.
  fn user_history(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<VoterHistory, Self::Error>> + Send + '_;

  /// Replace the full history of `user_id`.
  fn set_user_history(
    &self,
    user_id: UserId,
    history: VoterHistory,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Totals ──────────────────────────────────────────────────────────────────

/// Aggregate counters per item key.
pub trait TotalsStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Current totals for `key`; all zero if nobody has voted on it yet.
  fn totals<'a>(
    &'a self,
    key: &'a ItemKey,
  ) -> impl Future<Output = Result<ItemTotals, Self::Error>> + Send + 'a;

  /// Overwrite the totals for `key`.
  fn set_totals<'a>(
    &'a self,
    key: &'a ItemKey,
    totals: ItemTotals,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// `true` if any item still carries a tally imported from an older
  /// scoring scheme.
  fn has_legacy_data(
    &self,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Atomic commit ───────────────────────────────────────────────────────────

/// Everything one vote writes.
#[derive(Debug, Clone)]
pub struct VoteCommit {
  pub item_key: ItemKey,
  pub totals:   ItemTotals,
  /// The history entry change for an authenticated voter. Anonymous voters
  /// keep their history client-side, so this is `None` for them.
  pub history:  Option<(UserId, HistoryChange)>,
}

/// A backend that can persist a vote's history change and new totals as one
/// atomic unit: either both writes land or neither does.
pub trait VoteStore: HistoryStore + TotalsStore {
  fn commit_vote(
    &self,
    commit: VoteCommit,
  ) -> impl Future<Output = Result<(), <Self as TotalsStore>::Error>> + Send + '_;
}
