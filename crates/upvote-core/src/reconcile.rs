//! [`VoteReconciler`]: turns a vote request into a new history entry and new
//! item totals.
//!
//! Retracting a vote is modelled as casting its *antivote*: the negation of
//! the prior vote, which cancels the prior vote's contribution to the tally
//! and decrements the bucket the prior vote originally incremented.

use serde::Serialize;
use tracing::debug;

use crate::{
  Error, Result,
  history::ResolvedHistory,
  identity::UserId,
  store::TotalsStore,
  vote::{ItemKey, ItemTotals, Vote},
};

// ─── Inputs and outputs ──────────────────────────────────────────────────────

/// A voter's request against one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRequest {
  pub item_key:   String,
  /// `None` means "whatever is already on file".
  pub vote:       Option<Vote>,
  pub is_removal: bool,
}

impl VoteRequest {
  pub fn cast(item_key: impl Into<String>, vote: Vote) -> Self {
    Self { item_key: item_key.into(), vote: Some(vote), is_removal: false }
  }

  pub fn remove(item_key: impl Into<String>) -> Self {
    Self { item_key: item_key.into(), vote: None, is_removal: true }
  }
}

/// How the voter's history entry for the item changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryChange {
  Unchanged,
  Set(Vote),
  Clear,
}

/// The result of reconciling one vote, as returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
  pub id:         i64,
  pub group:      Option<String>,
  pub item_key:   String,
  pub user_id:    Option<UserId>,
  /// The vote applied to the totals; the antivote for a removal.
  pub user_vote:  Option<Vote>,
  pub is_removal: bool,
  /// Set only when a removal actually retracted a vote.
  pub antivote:   Option<Vote>,
  #[serde(flatten)]
  pub totals:     ItemTotals,
  #[serde(skip)]
  pub history:    HistoryChange,
}

// ─── Pure reconciliation ─────────────────────────────────────────────────────

/// Apply one vote request to a totals snapshot taken before the vote.
///
/// Returns the effective vote (if any), the new totals, and the history
/// change. Identical repeated votes are counted each time. A removal only
/// ever applies the antivote of the prior vote; any requested vote on a
/// removal is ignored so that the totals stay consistent.
pub fn reconcile(
  prior: Option<Vote>,
  requested: Option<Vote>,
  is_removal: bool,
  before: ItemTotals,
) -> (Option<Vote>, ItemTotals, HistoryChange) {
  let antivote = prior.filter(|_| is_removal).map(|p| -p);
  let effective = if is_removal { antivote } else { requested.or(prior) };

  let mut totals = before;
  if let Some(vote) = effective {
    // An antivote of +1 reverses a downvote, so it targets the downvote
    // bucket; the naive mapping is inverted for removals.
    let hits_upvotes = if antivote.is_some() { !vote.is_up() } else { vote.is_up() };
    let delta = if is_removal { -1 } else { 1 };

    totals.tally += vote.value();
    totals.total_votes += delta;
    if hits_upvotes {
      totals.total_upvotes += delta;
    } else {
      totals.total_downvotes += delta;
    }
  }

  let history = match (is_removal, effective) {
    (true, Some(_)) => HistoryChange::Clear,
    (false, Some(vote)) => HistoryChange::Set(vote),
    (_, None) => HistoryChange::Unchanged,
  };

  (effective, totals, history)
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Computes vote outcomes against live totals. Persists nothing.
pub struct VoteReconciler<'a, T> {
  totals: &'a T,
}

impl<'a, T: TotalsStore> VoteReconciler<'a, T> {
  pub fn new(totals: &'a T) -> Self { Self { totals } }

  /// Reconcile `request` for a voter whose history is `history`.
  ///
  /// Fails with [`Error::MalformedItemKey`] before touching the store if the
  /// element id is not a positive integer.
  pub async fn compile(
    &self,
    request: &VoteRequest,
    history: &ResolvedHistory,
    user_id: Option<UserId>,
  ) -> Result<VoteOutcome> {
    let key: ItemKey = request.item_key.parse()?;
    self.compile_key(&key, request, history, user_id).await
  }

  pub(crate) async fn compile_key(
    &self,
    key: &ItemKey,
    request: &VoteRequest,
    history: &ResolvedHistory,
    user_id: Option<UserId>,
  ) -> Result<VoteOutcome> {
    let canonical = key.to_string();
    let prior = history.vote_for(&canonical);
    let before = self.totals.totals(key).await.map_err(Error::store)?;

    let (effective, totals, change) =
      reconcile(prior, request.vote, request.is_removal, before);

    debug!(
      item_key = %key,
      ?prior,
      ?effective,
      is_removal = request.is_removal,
      "reconciled vote"
    );

    Ok(VoteOutcome {
      id: key.element_id(),
      group: key.group().map(str::to_owned),
      item_key: canonical,
      user_id,
      user_vote: effective,
      is_removal: request.is_removal,
      antivote: matches!(change, HistoryChange::Clear).then_some(effective).flatten(),
      totals,
      history: change,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const ZERO: ItemTotals = ItemTotals {
    tally:           0,
    total_votes:     0,
    total_upvotes:   0,
    total_downvotes: 0,
  };

  fn totals(tally: i64, votes: i64, up: i64, down: i64) -> ItemTotals {
    ItemTotals { tally, total_votes: votes, total_upvotes: up, total_downvotes: down }
  }

  #[test]
  fn fresh_upvote() {
    let (effective, t, change) = reconcile(None, Some(Vote::Up), false, ZERO);
    assert_eq!(effective, Some(Vote::Up));
    assert_eq!(t, totals(1, 1, 1, 0));
    assert_eq!(change, HistoryChange::Set(Vote::Up));
  }

  #[test]
  fn fresh_downvote() {
    let (_, t, change) = reconcile(None, Some(Vote::Down), false, ZERO);
    assert_eq!(t, totals(-1, 1, 0, 1));
    assert_eq!(change, HistoryChange::Set(Vote::Down));
  }

  #[test]
  fn removing_an_upvote_reverses_it() {
    let (effective, t, change) = reconcile(Some(Vote::Up), None, true, totals(1, 1, 1, 0));
    assert_eq!(effective, Some(Vote::Down));
    assert_eq!(t, ZERO);
    assert_eq!(change, HistoryChange::Clear);
  }

  #[test]
  fn removing_a_downvote_reverses_it() {
    let (effective, t, change) =
      reconcile(Some(Vote::Down), None, true, totals(2, 4, 3, 1));
    assert_eq!(effective, Some(Vote::Up));
    assert_eq!(t, totals(3, 3, 3, 0));
    assert_eq!(change, HistoryChange::Clear);
  }

  #[test]
  fn removal_without_prior_vote_is_a_no_op() {
    let before = totals(5, 7, 6, 1);
    let (effective, t, change) = reconcile(None, None, true, before);
    assert_eq!(effective, None);
    assert_eq!(t, before);
    assert_eq!(change, HistoryChange::Unchanged);
  }

  #[test]
  fn removal_ignores_requested_vote_when_prior_exists() {
    let (effective, t, _) =
      reconcile(Some(Vote::Up), Some(Vote::Up), true, totals(1, 1, 1, 0));
    assert_eq!(effective, Some(Vote::Down));
    assert_eq!(t, ZERO);
  }

  #[test]
  fn removal_with_requested_vote_but_no_prior_is_a_no_op() {
    let before = totals(1, 1, 1, 0);
    let (effective, t, change) = reconcile(None, Some(Vote::Up), true, before);
    assert_eq!(effective, None);
    assert_eq!(t, before);
    assert_eq!(change, HistoryChange::Unchanged);
  }

  #[test]
  fn repeated_identical_vote_double_counts() {
    let (_, once, _) = reconcile(None, Some(Vote::Up), false, ZERO);
    let (_, twice, change) = reconcile(Some(Vote::Up), Some(Vote::Up), false, once);
    assert_eq!(twice, totals(2, 2, 2, 0));
    assert_eq!(change, HistoryChange::Set(Vote::Up));
  }

  #[test]
  fn no_request_reuses_prior_vote() {
    let (effective, t, _) = reconcile(Some(Vote::Down), None, false, ZERO);
    assert_eq!(effective, Some(Vote::Down));
    assert_eq!(t, totals(-1, 1, 0, 1));
  }

  #[test]
  fn nothing_requested_and_nothing_on_file() {
    let (effective, t, change) = reconcile(None, None, false, ZERO);
    assert_eq!(effective, None);
    assert_eq!(t, ZERO);
    assert_eq!(change, HistoryChange::Unchanged);
  }

  #[test]
  fn invariant_holds_across_sequences() {
    // Exhaustively walk every request shape from a few starting points,
    // feeding each result back in as the next snapshot.
    let requests = [
      (Some(Vote::Up), false),
      (Some(Vote::Down), false),
      (None, false),
      (None, true),
      (Some(Vote::Up), true),
    ];
    let priors = [None, Some(Vote::Up), Some(Vote::Down)];

    let mut t = totals(3, 5, 4, 1);
    for round in 0..4 {
      for prior in priors {
        for (requested, removal) in requests {
          let (_, next, _) = reconcile(prior, requested, removal, t);
          assert!(next.is_consistent(), "round {round}: {next:?}");
          t = next;
        }
      }
    }
  }
}
