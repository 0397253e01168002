//! Handlers for casting, removing, and querying votes.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/vote` | Body: [`VoteBody`]; requires `X-CSRF-Token` |
//! | `POST` | `/remove` | Body: [`RemoveBody`]; requires `X-CSRF-Token` |
//! | `GET`  | `/votes` | `?group=&userId=`; votes in one group, in cast order |
//! | `GET`  | `/has-voted` | `?elementId=&group=&userId=`; `{"vote": 1 \| -1 \| 0}` |

use axum::{
  Json,
  extract::{Query, State},
  http::header,
  response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use upvote_core::{
  identity::{UserId, UserRef},
  reconcile::VoteRequest,
  service::VoteReceipt,
  store::VoteStore,
  vote::{GroupVote, Vote},
};

use crate::{AppState, cookies, csrf::CsrfVerified, error::ApiError, voter::Voter};

// ─── Cast ─────────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /vote`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteBody {
  pub item_key:   String,
  /// `1` or `-1`; omitted means "whatever is already on file".
  pub vote:       Option<i64>,
  #[serde(default)]
  pub is_removal: bool,
}

/// `POST /vote`: returns the reconciled [`VoteOutcome`](upvote_core::reconcile::VoteOutcome).
pub async fn cast<S>(
  State(state): State<AppState<S>>,
  _csrf: CsrfVerified,
  voter: Voter,
  Json(body): Json<VoteBody>,
) -> Result<Response, ApiError>
where
  S: VoteStore + Clone + 'static,
{
  let vote = body.vote.map(Vote::try_from).transpose()?;
  let request = VoteRequest { item_key: body.item_key, vote, is_removal: body.is_removal };
  submit(&state, &voter, request).await
}

// ─── Remove ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBody {
  pub item_key: String,
}

/// `POST /remove`: retract the caller's vote on one item.
pub async fn remove<S>(
  State(state): State<AppState<S>>,
  _csrf: CsrfVerified,
  voter: Voter,
  Json(body): Json<RemoveBody>,
) -> Result<Response, ApiError>
where
  S: VoteStore + Clone + 'static,
{
  submit(&state, &voter, VoteRequest::remove(body.item_key)).await
}

async fn submit<S>(
  state: &AppState<S>,
  voter: &Voter,
  request: VoteRequest,
) -> Result<Response, ApiError>
where
  S: VoteStore + Clone + 'static,
{
  let VoteReceipt { outcome, cookie } = state
    .service
    .cast(&voter.identity, &voter.context, request)
    .await?;

  let mut res = Json(outcome).into_response();
  if let Some(history) = cookie {
    let config = state.service.config();
    let value = cookies::encode_history(&history)?;
    let set_cookie = cookies::set_cookie(
      &config.cookie_name,
      &value,
      Some(config.cookie_lifespan_secs),
      false,
    )?;
    res.headers_mut().append(header::SET_COOKIE, set_cookie);
  }
  Ok(res)
}

// ─── Group queries ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupParams {
  /// Omitted or empty selects ungrouped items.
  pub group:   Option<String>,
  /// Defaults to the signed-in user.
  pub user_id: Option<UserId>,
}

impl GroupParams {
  fn group(&self) -> Option<&str> { non_empty(self.group.as_deref()) }
}

fn non_empty(group: Option<&str>) -> Option<&str> { group.filter(|g| !g.is_empty()) }

/// `GET /votes[?group=<handle>][&userId=<id>]`
pub async fn in_group<S>(
  State(state): State<AppState<S>>,
  voter: Voter,
  Query(params): Query<GroupParams>,
) -> Json<Vec<GroupVote>>
where
  S: VoteStore + Clone + 'static,
{
  let tracker = state.service.tracker(&voter.identity);
  Json(tracker.votes_in_group(params.group(), UserRef::from(params.user_id)).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HasVotedParams {
  pub element_id: i64,
  pub group:      Option<String>,
  pub user_id:    Option<UserId>,
}

#[derive(Debug, Serialize)]
pub struct HasVotedBody {
  pub vote: i64,
}

/// `GET /has-voted?elementId=<id>[&group=<handle>][&userId=<id>]`
pub async fn has_voted<S>(
  State(state): State<AppState<S>>,
  voter: Voter,
  Query(params): Query<HasVotedParams>,
) -> Json<HasVotedBody>
where
  S: VoteStore + Clone + 'static,
{
  let tracker = state.service.tracker(&voter.identity);
  let vote = tracker
    .has_voted(
      params.element_id,
      non_empty(params.group.as_deref()),
      UserRef::from(params.user_id),
    )
    .await;
  Json(HasVotedBody { vote })
}
