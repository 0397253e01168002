//! JSON HTTP API for Upvote.
//!
//! Exposes an axum [`Router`] backed by any [`upvote_core::store::VoteStore`].
//! TLS and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/upvote", upvote_api::router(state))
//! ```

pub mod auth;
pub mod cookies;
pub mod csrf;
pub mod error;
pub mod totals;
pub mod voter;
pub mod votes;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use tower_http::trace::TraceLayer;
use upvote_core::{service::VoteService, store::VoteStore};

pub use error::ApiError;

use auth::UserDirectory;
use csrf::CsrfSigner;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S> {
  pub service: Arc<VoteService<S>>,
  pub users:   Arc<UserDirectory>,
  pub csrf:    Arc<CsrfSigner>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn router<S>(state: AppState<S>) -> Router<()>
where
  S: VoteStore + Clone + 'static,
{
  Router::new()
    .route("/csrf", get(csrf::issue::<S>))
    // Votes
    .route("/vote", post(votes::cast::<S>))
    .route("/remove", post(votes::remove::<S>))
    .route("/votes", get(votes::in_group::<S>))
    .route("/has-voted", get(votes::has_voted::<S>))
    // Totals
    .route("/totals/{item_key}", get(totals::get_one::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
  use rand_core::OsRng;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use upvote_core::{
    config::UpvoteConfig,
    store::HistoryStore,
    vote::{ItemKey, Vote, VoterHistory},
  };
  use upvote_store_sqlite::SqliteStore;

  use crate::auth::UserAccount;

  const SECRET: &str = "test-secret";

  async fn make_state(config: UpvoteConfig) -> AppState<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let salt  = SaltString::generate(&mut OsRng);
    let hash  = Argon2::default()
      .hash_password(b"secret", &salt)
      .unwrap()
      .to_string();

    AppState {
      service: Arc::new(VoteService::new(store, Arc::new(config))),
      users:   Arc::new(UserDirectory::new(vec![UserAccount {
        id:            7,
        username:      "user".to_string(),
        password_hash: hash,
      }])),
      csrf:    Arc::new(CsrfSigner::new(SECRET).unwrap()),
    }
  }

  fn login_required() -> UpvoteConfig {
    UpvoteConfig { require_login: true, ..UpvoteConfig::default() }
  }

  fn auth_header() -> String {
    format!("Basic {}", B64.encode("user:secret"))
  }

  async fn oneshot(
    state:   AppState<SqliteStore>,
    method:  &str,
    uri:     &str,
    headers: Vec<(header::HeaderName, String)>,
    body:    Option<Value>,
  ) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    router(state).oneshot(builder.body(body).unwrap()).await.unwrap()
  }

  async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  /// Headers carrying a valid CSRF token pair plus any extra cookies.
  fn csrf_headers(extra_cookie: Option<&str>) -> Vec<(header::HeaderName, String)> {
    let token = CsrfSigner::new(SECRET).unwrap().issue();
    let cookie = match extra_cookie {
      Some(c) => format!("csrf_token={token}; {c}"),
      None => format!("csrf_token={token}"),
    };
    vec![
      (header::COOKIE, cookie),
      (header::HeaderName::from_static("x-csrf-token"), token),
    ]
  }

  fn set_cookie_value(resp: &axum::response::Response, name: &str) -> Option<String> {
    resp
      .headers()
      .get_all(header::SET_COOKIE)
      .iter()
      .filter_map(|v| v.to_str().ok())
      .find_map(|v| v.strip_prefix(&format!("{name}=")))
      .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
  }

  // ── CSRF ────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn csrf_endpoint_sets_matching_cookie() {
    let state = make_state(UpvoteConfig::default()).await;
    let resp  = oneshot(state.clone(), "GET", "/csrf", vec![], None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = set_cookie_value(&resp, "csrf_token").unwrap();
    let body   = json_body(resp).await;
    assert_eq!(body["token"], Value::String(cookie.clone()));
    assert!(state.csrf.verify(&cookie));
  }

  #[tokio::test]
  async fn vote_without_csrf_is_forbidden() {
    let state = make_state(UpvoteConfig::default()).await;
    let resp  = oneshot(state, "POST", "/vote", vec![], Some(json!({"itemKey": "5", "vote": 1}))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  #[tokio::test]
  async fn vote_with_mismatched_csrf_is_forbidden() {
    let state  = make_state(UpvoteConfig::default()).await;
    let signer = CsrfSigner::new(SECRET).unwrap();
    let headers = vec![
      (header::COOKIE, format!("csrf_token={}", signer.issue())),
      (header::HeaderName::from_static("x-csrf-token"), signer.issue()),
    ];
    let resp = oneshot(state, "POST", "/vote", headers, Some(json!({"itemKey": "5", "vote": 1}))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  #[tokio::test]
  async fn vote_with_forged_csrf_pair_is_forbidden() {
    use sha2::{Digest, Sha256};

    let state  = make_state(UpvoteConfig::default()).await;
    let nonce  = "0123456789abcdef";
    let forged = format!("{nonce}.{}", hex::encode(Sha256::digest(format!("{SECRET}:{nonce}"))));
    let headers = vec![
      (header::COOKIE, format!("csrf_token={forged}")),
      (header::HeaderName::from_static("x-csrf-token"), forged),
    ];
    let resp = oneshot(state, "POST", "/vote", headers, Some(json!({"itemKey": "5", "vote": 1}))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  // ── Anonymous voting ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn removal_accepts_non_canonical_key() {
    let state = make_state(UpvoteConfig::default()).await;
    let resp  = oneshot(
      state.clone(),
      "POST",
      "/vote",
      csrf_headers(None),
      Some(json!({"itemKey": "05", "vote": 1})),
    ).await;
    let cookie = set_cookie_value(&resp, "VoteHistory").expect("history cookie");
    assert_eq!(json_body(resp).await["itemKey"], "5");

    let resp = oneshot(
      state.clone(),
      "POST",
      "/remove",
      csrf_headers(Some(&format!("VoteHistory={cookie}"))),
      Some(json!({"itemKey": "5:"})),
    ).await;
    let body = json_body(resp).await;
    assert_eq!(body["userVote"], -1);
    assert_eq!(body["totalVotes"], 0);

    let resp = oneshot(state, "GET", "/totals/5", vec![], None).await;
    assert_eq!(json_body(resp).await["tally"], 0);
  }

  #[tokio::test]
  async fn anonymous_vote_sets_history_cookie() {
    let state = make_state(UpvoteConfig::default()).await;
    let resp  = oneshot(
      state.clone(),
      "POST",
      "/vote",
      csrf_headers(None),
      Some(json!({"itemKey": "5:stars", "vote": 1})),
    ).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = set_cookie_value(&resp, "VoteHistory").expect("history cookie");
    let history =
      VoterHistory::from_json_lenient(&cookies::decode_history(&cookie)).unwrap();
    assert_eq!(history.get("5:stars"), Some(Vote::Up));

    let body = json_body(resp).await;
    assert_eq!(body["id"], 5);
    assert_eq!(body["group"], "stars");
    assert_eq!(body["userVote"], 1);
    assert_eq!(body["userId"], Value::Null);
    assert_eq!(body["tally"], 1);
    assert_eq!(body["totalVotes"], 1);
    assert_eq!(body["totalUpvotes"], 1);
    assert_eq!(body["totalDownvotes"], 0);

    // Remove it again, presenting the cookie we were given.
    let resp = oneshot(
      state.clone(),
      "POST",
      "/remove",
      csrf_headers(Some(&format!("VoteHistory={cookie}"))),
      Some(json!({"itemKey": "5:stars"})),
    ).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = set_cookie_value(&resp, "VoteHistory").expect("history cookie");
    let history =
      VoterHistory::from_json_lenient(&cookies::decode_history(&cookie)).unwrap();
    assert!(history.is_empty());

    let body = json_body(resp).await;
    assert_eq!(body["isRemoval"], true);
    assert_eq!(body["antivote"], -1);
    assert_eq!(body["tally"], 0);
    assert_eq!(body["totalVotes"], 0);

    let resp = oneshot(state, "GET", "/totals/5:stars", vec![], None).await;
    let body = json_body(resp).await;
    assert_eq!(body["itemKey"], "5:stars");
    assert_eq!(body["tally"], 0);
  }

  #[tokio::test]
  async fn invalid_vote_value_is_bad_request() {
    let state = make_state(UpvoteConfig::default()).await;
    let resp  = oneshot(
      state,
      "POST",
      "/vote",
      csrf_headers(None),
      Some(json!({"itemKey": "5", "vote": 2})),
    ).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn malformed_item_key_is_bad_request() {
    let state = make_state(UpvoteConfig::default()).await;
    let resp  = oneshot(
      state.clone(),
      "POST",
      "/vote",
      csrf_headers(None),
      Some(json!({"itemKey": "0:stars", "vote": 1})),
    ).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = oneshot(state, "GET", "/totals/abc", vec![], None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn removal_disabled_is_forbidden() {
    let config = UpvoteConfig { allow_vote_removal: false, ..UpvoteConfig::default() };
    let state  = make_state(config).await;
    let resp   = oneshot(
      state,
      "POST",
      "/remove",
      csrf_headers(None),
      Some(json!({"itemKey": "5"})),
    ).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  // ── Authenticated voting ────────────────────────────────────────────────────

  #[tokio::test]
  async fn login_required_rejects_anonymous_votes() {
    let state = make_state(login_required()).await;
    let resp  = oneshot(
      state,
      "POST",
      "/vote",
      csrf_headers(None),
      Some(json!({"itemKey": "5", "vote": 1})),
    ).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  }

  #[tokio::test]
  async fn bad_credentials_are_rejected() {
    let state = make_state(login_required()).await;
    let mut headers = csrf_headers(None);
    headers.push((header::AUTHORIZATION, format!("Basic {}", B64.encode("user:nope"))));
    let resp = oneshot(state, "POST", "/vote", headers, Some(json!({"itemKey": "5", "vote": 1}))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn authenticated_votes_are_stored_and_queryable() {
    let state = make_state(login_required()).await;

    for (item_key, vote) in [("5", 1), ("7:teams", -1)] {
      let mut headers = csrf_headers(None);
      headers.push((header::AUTHORIZATION, auth_header()));
      let resp = oneshot(
        state.clone(),
        "POST",
        "/vote",
        headers,
        Some(json!({"itemKey": item_key, "vote": vote})),
      ).await;
      assert_eq!(resp.status(), StatusCode::OK);
      assert!(set_cookie_value(&resp, "VoteHistory").is_none());
      assert_eq!(json_body(resp).await["userId"], 7);
    }

    let stored = state.service.store().user_history(7).await.unwrap();
    let expected: VoterHistory = [
      ("5".parse::<ItemKey>().unwrap(), Vote::Up),
      ("7:teams".parse::<ItemKey>().unwrap(), Vote::Down),
    ]
    .into_iter()
    .collect();
    assert_eq!(stored, expected);

    // Explicit user id, no credentials needed for reads.
    let resp = oneshot(state.clone(), "GET", "/votes?userId=7", vec![], None).await;
    assert_eq!(json_body(resp).await, json!([{"id": 5, "vote": 1}]));

    let resp = oneshot(state.clone(), "GET", "/votes?group=teams&userId=7", vec![], None).await;
    assert_eq!(json_body(resp).await, json!([{"id": 7, "vote": -1}]));

    // Signed-in user by default.
    let resp = oneshot(
      state.clone(),
      "GET",
      "/has-voted?elementId=5",
      vec![(header::AUTHORIZATION, auth_header())],
      None,
    ).await;
    assert_eq!(json_body(resp).await, json!({"vote": 1}));

    let resp = oneshot(state.clone(), "GET", "/has-voted?elementId=6&userId=7", vec![], None).await;
    assert_eq!(json_body(resp).await, json!({"vote": 0}));

    // Anonymous and unknown users see nothing.
    let resp = oneshot(state.clone(), "GET", "/votes", vec![], None).await;
    assert_eq!(json_body(resp).await, json!([]));
    let resp = oneshot(state, "GET", "/votes?userId=99", vec![], None).await;
    assert_eq!(json_body(resp).await, json!([]));
  }
}
