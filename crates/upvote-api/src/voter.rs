//! The [`Voter`] extractor: who is voting, and what their client sent us.

use axum::{extract::FromRequestParts, http::request::Parts};
use upvote_core::{history::RequestContext, store::VoteStore};

use crate::{AppState, auth::RequestIdentity, cookies, error::ApiError};

/// The voter behind an HTTP request.
///
/// HTTP requests are always interactive contexts: the anonymous history
/// cookie, if present, is decoded and handed to the history tracker.
pub struct Voter {
  pub identity: RequestIdentity,
  pub context:  RequestContext,
}

impl<S> FromRequestParts<AppState<S>> for Voter
where
  S: VoteStore + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let current = state.users.authenticate(&parts.headers)?;
    let cookie_name = &state.service.config().cookie_name;
    let history_cookie =
      cookies::get(&parts.headers, cookie_name).map(|v| cookies::decode_history(&v));

    Ok(Voter {
      identity: RequestIdentity::new(state.users.clone(), current),
      context:  RequestContext::interactive(history_cookie),
    })
  }
}
