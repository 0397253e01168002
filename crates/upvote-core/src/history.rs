//! [`VoteHistoryTracker`]: resolves which vote history is authoritative for
//! a request and answers history queries.
//!
//! With `require_login` off, a voter's history travels in a client cookie.
//! With it on, histories live in a [`HistoryStore`] keyed by user id. The
//! choice is made once per tracker; callers receive a single
//! [`ResolvedHistory`] value instead of a handle onto one of two sources.

use tracing::warn;

use crate::{
  Error, Result,
  config::UpvoteConfig,
  identity::{IdentityProvider, UserId, UserRef},
  store::HistoryStore,
  vote::{GroupVote, Vote, VoterHistory, vote_state},
};

// ─── Request context ─────────────────────────────────────────────────────────

/// What the tracker needs to know about the request it serves.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
  /// `false` for headless invocations (CLI, background jobs) that have no
  /// client to keep a cookie.
  pub interactive:    bool,
  /// Raw value of the anonymous history cookie, if the client sent one.
  pub history_cookie: Option<String>,
}

impl RequestContext {
  pub fn interactive(history_cookie: Option<String>) -> Self {
    Self { interactive: true, history_cookie }
  }

  pub fn headless() -> Self { Self::default() }
}

// ─── Resolved history ────────────────────────────────────────────────────────

/// Which kind of source holds the authoritative history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySource {
  Anonymous,
  Authenticated,
}

/// History decoded from the anonymous cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnonymousHistory {
  pub history:       VoterHistory,
  /// The cookie was missing or unusable and must be written back.
  pub needs_persist: bool,
}

/// The single history a request works against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedHistory {
  /// No history is available: headless request, nobody signed in, or the
  /// history table has not been provisioned yet.
  Unavailable,
  Anonymous(AnonymousHistory),
  Authenticated {
    user_id: UserId,
    history: VoterHistory,
  },
}

impl ResolvedHistory {
  pub fn history(&self) -> Option<&VoterHistory> {
    match self {
      Self::Unavailable => None,
      Self::Anonymous(anon) => Some(&anon.history),
      Self::Authenticated { history, .. } => Some(history),
    }
  }

  /// The stored vote for `item_key`, if any.
  pub fn vote_for(&self, item_key: &str) -> Option<Vote> {
    self.history().and_then(|h| h.get(item_key))
  }
}

// ─── Tracker ─────────────────────────────────────────────────────────────────

/// Answers "what has this voter voted?" for one request.
pub struct VoteHistoryTracker<'a, H, I> {
  config:   &'a UpvoteConfig,
  store:    &'a H,
  identity: &'a I,
}

impl<'a, H, I> VoteHistoryTracker<'a, H, I>
where
  H: HistoryStore,
  I: IdentityProvider,
{
  pub fn new(config: &'a UpvoteConfig, store: &'a H, identity: &'a I) -> Self {
    Self { config, store, identity }
  }

  pub fn source(&self) -> HistorySource {
    if self.config.require_login {
      HistorySource::Authenticated
    } else {
      HistorySource::Anonymous
    }
  }

  /// Decode the anonymous history cookie.
  ///
  /// Returns `None` when login is required or the request is headless. A
  /// missing, undecodable, or empty cookie yields an empty history flagged
  /// for persistence.
  pub fn resolve_anonymous_history(
    &self,
    ctx: &RequestContext,
  ) -> Option<AnonymousHistory> {
    if !ctx.interactive || self.config.require_login {
      return None;
    }

    let history = ctx
      .history_cookie
      .as_deref()
      .and_then(VoterHistory::from_json_lenient)
      .filter(|h| !h.is_empty());

    Some(match history {
      Some(history) => AnonymousHistory { history, needs_persist: false },
      None => AnonymousHistory { history: VoterHistory::new(), needs_persist: true },
    })
  }

  /// Fetch the stored history of the signed-in user.
  ///
  /// Returns `Ok(None)` when nobody is signed in or the history table does
  /// not exist yet.
  pub async fn resolve_authenticated_history(
    &self,
  ) -> Result<Option<(UserId, VoterHistory)>> {
    let Some(user) = self.identity.current_user() else {
      return Ok(None);
    };
    let history = self.stored_history(user.id).await?;
    Ok(history.map(|h| (user.id, h)))
  }

  /// Resolve whichever history is authoritative under the configuration.
  pub async fn resolve_history(&self, ctx: &RequestContext) -> Result<ResolvedHistory> {
    let resolved = match self.source() {
      HistorySource::Anonymous => self
        .resolve_anonymous_history(ctx)
        .map_or(ResolvedHistory::Unavailable, ResolvedHistory::Anonymous),
      HistorySource::Authenticated => self
        .resolve_authenticated_history()
        .await?
        .map_or(ResolvedHistory::Unavailable, |(user_id, history)| {
          ResolvedHistory::Authenticated { user_id, history }
        }),
    };
    Ok(resolved)
  }

  /// Votes the user has cast on items in `group`, in history order.
  ///
  /// `None` selects ungrouped items only. Never fails: a missing user, an
  /// unprovisioned table, or a store error all yield an empty list.
  pub async fn votes_in_group(&self, group: Option<&str>, user: UserRef) -> Vec<GroupVote> {
    let Some(user_id) = self.validate_user_id(user) else {
      return Vec::new();
    };
    match self.stored_history(user_id).await {
      Ok(Some(history)) => history.votes_in_group(group),
      Ok(None) => Vec::new(),
      Err(e) => {
        warn!(user_id, error = %e, "failed to read vote history; reporting no votes");
        Vec::new()
      }
    }
  }

  /// The user's vote on `element_id` within `group` as `1`, `-1`, or `0`.
  ///
  /// If several keys resolve to the same element, the last one in history
  /// order wins.
  pub async fn has_voted(&self, element_id: i64, group: Option<&str>, user: UserRef) -> i64 {
    let vote = self
      .votes_in_group(group, user)
      .await
      .into_iter()
      .filter(|gv| gv.id == element_id)
      .last()
      .map(|gv| gv.vote);
    vote_state(vote)
  }

  /// Normalise a [`UserRef`] to a concrete user id. `None` means the voter is
  /// treated as anonymous.
  pub fn validate_user_id(&self, user: UserRef) -> Option<UserId> {
    let user = match user {
      UserRef::Current | UserRef::Id(0) => self.identity.current_user(),
      UserRef::Id(id) => self.identity.user_by_id(id),
      UserRef::User(user) => Some(user),
    };
    user.map(|u| u.id)
  }

  async fn stored_history(&self, user_id: UserId) -> Result<Option<VoterHistory>> {
    if !self.store.history_provisioned().await.map_err(Error::store)? {
      return Ok(None);
    }
    let history = self.store.user_history(user_id).await.map_err(Error::store)?;
    Ok(Some(history))
  }
}
