//! [`VoteService`]: reconciles a vote and persists it.
//!
//! Totals are shared between every voter on an item, so the
//! read-reconcile-write cycle for one item key runs under a per-key async
//! mutex, and the history change plus the new totals are committed through
//! [`VoteStore::commit_vote`] as one unit.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::info;

use crate::{
  Error, Result,
  config::UpvoteConfig,
  history::{RequestContext, ResolvedHistory, VoteHistoryTracker},
  identity::{IdentityProvider, UserId, UserRef},
  reconcile::{HistoryChange, VoteOutcome, VoteReconciler, VoteRequest},
  store::{VoteCommit, VoteStore},
  vote::{ItemKey, VoterHistory},
};

// ─── Per-key locks ───────────────────────────────────────────────────────────

/// One async mutex per item key with a waiter or holder; idle entries are
/// dropped on release.
#[derive(Default)]
struct KeyLocks {
  locks: Mutex<HashMap<ItemKey, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
  /// Wait for exclusive use of `key`. The returned lease unlocks and prunes
  /// the entry when dropped, including when the caller is cancelled.
  async fn acquire(&self, key: &ItemKey) -> KeyLease<'_> {
    let lock = {
      let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
      Arc::clone(locks.entry(key.clone()).or_default())
    };
    let mut lease = KeyLease { locks: self, key: key.clone(), guard: None };
    lease.guard = Some(lock.lock_owned().await);
    lease
  }

  /// Forget the mutex for `key` if nobody else holds or awaits it.
  fn release(&self, key: &ItemKey) {
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
      locks.remove(key);
    }
  }

  #[cfg(test)]
  fn len(&self) -> usize {
    self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
  }
}

/// Exclusive use of one item key.
struct KeyLease<'a> {
  locks: &'a KeyLocks,
  key:   ItemKey,
  guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLease<'_> {
  fn drop(&mut self) {
    // The guard holds a reference to the mutex; drop it before pruning.
    self.guard.take();
    self.locks.release(&self.key);
  }
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// The outcome of a committed vote.
#[derive(Debug, Clone)]
pub struct VoteReceipt {
  pub outcome: VoteOutcome,
  /// The anonymous history to write back to the client cookie, when it
  /// changed or had to be initialised.
  pub cookie:  Option<VoterHistory>,
}

/// Casts and removes votes against a [`VoteStore`].
pub struct VoteService<S> {
  store:  Arc<S>,
  config: Arc<UpvoteConfig>,
  locks:  KeyLocks,
}

impl<S: VoteStore> VoteService<S> {
  pub fn new(store: Arc<S>, config: Arc<UpvoteConfig>) -> Self {
    Self { store, config, locks: KeyLocks::default() }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &UpvoteConfig { &self.config }

  /// A history tracker for one request, sharing this service's store and
  /// configuration.
  pub fn tracker<'a, I: IdentityProvider>(
    &'a self,
    identity: &'a I,
  ) -> VoteHistoryTracker<'a, S, I> {
    VoteHistoryTracker::new(&self.config, &*self.store, identity)
  }

  /// Reconcile `request` for the current voter and commit the result.
  pub async fn cast<I: IdentityProvider>(
    &self,
    identity: &I,
    ctx: &RequestContext,
    request: VoteRequest,
  ) -> Result<VoteReceipt> {
    let key: ItemKey = request.item_key.parse()?;

    if request.is_removal && !self.config.allow_vote_removal {
      return Err(Error::RemovalDisabled);
    }

    let tracker = self.tracker(identity);
    let user_id = tracker.validate_user_id(UserRef::Current);
    if self.config.require_login && user_id.is_none() {
      return Err(Error::LoginRequired);
    }

    let _lease = self.locks.acquire(&key).await;
    self.cast_locked(&tracker, ctx, &key, &request, user_id).await
  }

  async fn cast_locked<I: IdentityProvider>(
    &self,
    tracker: &VoteHistoryTracker<'_, S, I>,
    ctx: &RequestContext,
    key: &ItemKey,
    request: &VoteRequest,
    user_id: Option<UserId>,
  ) -> Result<VoteReceipt> {
    let history = tracker.resolve_history(ctx).await?;
    let outcome = VoteReconciler::new(&*self.store)
      .compile_key(key, request, &history, user_id)
      .await?;

    let (stored_change, cookie) = match history {
      ResolvedHistory::Unavailable => (None, None),
      ResolvedHistory::Authenticated { user_id: owner, .. } => {
        (Some((owner, outcome.history)), None)
      }
      ResolvedHistory::Anonymous(mut anon) => {
        let changed = apply_change(&mut anon.history, key, outcome.history);
        let cookie = (changed || anon.needs_persist).then_some(anon.history);
        (None, cookie)
      }
    };

    self
      .store
      .commit_vote(VoteCommit {
        item_key: key.clone(),
        totals:   outcome.totals,
        history:  stored_change,
      })
      .await
      .map_err(Error::store)?;

    info!(
      item_key = %key,
      user_id = ?outcome.user_id,
      vote = ?outcome.user_vote,
      is_removal = outcome.is_removal,
      tally = outcome.totals.tally,
      "vote committed"
    );

    Ok(VoteReceipt { outcome, cookie })
  }
}

/// Apply `change` to `history`; returns whether anything changed.
pub fn apply_change(history: &mut VoterHistory, key: &ItemKey, change: HistoryChange) -> bool {
  match change {
    HistoryChange::Unchanged => false,
    HistoryChange::Set(vote) => {
      history.set(key, vote);
      true
    }
    HistoryChange::Clear => history.clear(key).is_some(),
  }
}
