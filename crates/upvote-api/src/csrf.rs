//! Anti-forgery tokens for state-changing requests.
//!
//! A token is `{nonce}.{signature}` where the signature is the hex
//! HMAC-SHA256 of the nonce under the server secret. `GET /csrf` hands a
//! token to the client both as a cookie and in the body; every vote request
//! must echo it in the `X-CSRF-Token` header, and the header must match the
//! cookie.

use axum::{
  Json,
  extract::{FromRequestParts, State},
  http::{StatusCode, header, request::Parts},
  response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac, digest::InvalidLength};
use serde::Serialize;
use sha2::Sha256;
use upvote_core::store::VoteStore;
use uuid::Uuid;

use crate::{AppState, cookies, error::ApiError};

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Issues and checks tokens for one server secret.
#[derive(Clone)]
pub struct CsrfSigner {
  mac: Hmac<Sha256>,
}

impl CsrfSigner {
  pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, InvalidLength> {
    Ok(Self { mac: Hmac::new_from_slice(secret.as_ref())? })
  }

  pub fn issue(&self) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    let mut mac = self.mac.clone();
    mac.update(nonce.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("{nonce}.{signature}")
  }

  pub fn verify(&self, token: &str) -> bool {
    let Some((nonce, signature)) = token.split_once('.') else {
      return false;
    };
    let Ok(signature) = hex::decode(signature) else {
      return false;
    };
    if nonce.is_empty() {
      return false;
    }
    let mut mac = self.mac.clone();
    mac.update(nonce.as_bytes());
    mac.verify_slice(&signature).is_ok()
  }
}

// ─── Issue ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CsrfBody {
  pub token:  String,
  pub header: &'static str,
}

/// `GET /csrf`: set a fresh token cookie and return the same token.
pub async fn issue<S>(State(state): State<AppState<S>>) -> Result<Response, ApiError>
where
  S: VoteStore + Clone + 'static,
{
  let token = state.csrf.issue();
  let cookie = cookies::set_cookie(CSRF_COOKIE, &token, None, true)?;
  let mut res = (StatusCode::OK, Json(CsrfBody { token, header: "X-CSRF-Token" })).into_response();
  res.headers_mut().append(header::SET_COOKIE, cookie);
  Ok(res)
}

// ─── Verify ──────────────────────────────────────────────────────────────────

/// Zero-size marker: present in the handler means the request carried a
/// valid anti-forgery token.
pub struct CsrfVerified;

impl<S> FromRequestParts<AppState<S>> for CsrfVerified
where
  S: VoteStore + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let rejected = || ApiError::Forbidden("missing or invalid CSRF token".to_owned());

    let sent = parts
      .headers
      .get(CSRF_HEADER)
      .and_then(|v| v.to_str().ok())
      .ok_or_else(rejected)?;
    let expected = cookies::get(&parts.headers, CSRF_COOKIE).ok_or_else(rejected)?;

    // Both halves must be genuine and carry the same nonce.
    let nonce = |token: &str| token.split_once('.').map(|(n, _)| n.to_owned());
    let same_nonce = nonce(sent).is_some() && nonce(sent) == nonce(&expected);
    if !same_nonce || !state.csrf.verify(sent) || !state.csrf.verify(&expected) {
      tracing::debug!("rejected request with bad CSRF token");
      return Err(rejected());
    }
    Ok(CsrfVerified)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn issued_tokens_verify() {
    let signer = CsrfSigner::new("s3cret").unwrap();
    let token = signer.issue();
    assert!(signer.verify(&token));
    assert_ne!(token, signer.issue());
  }

  #[test]
  fn tampered_or_foreign_tokens_fail() {
    let signer = CsrfSigner::new("s3cret").unwrap();
    let token = signer.issue();
    let (nonce, _) = token.split_once('.').unwrap();

    assert!(!signer.verify(&format!("{nonce}.deadbeef")));
    assert!(!signer.verify(nonce));
    assert!(!signer.verify(""));
    assert!(!signer.verify(&format!("{nonce}.not-hex")));
    assert!(!signer.verify(&format!(".{}", token.split_once('.').unwrap().1)));
    assert!(!CsrfSigner::new("other").unwrap().verify(&token));
  }

  #[test]
  fn signatures_are_hmac_sha256() {
    let signer = CsrfSigner::new("s3cret").unwrap();
    let token = signer.issue();
    let (nonce, signature) = token.split_once('.').unwrap();

    let mut mac = Hmac::<Sha256>::new_from_slice(b"s3cret").unwrap();
    mac.update(nonce.as_bytes());
    assert_eq!(signature, hex::encode(mac.finalize().into_bytes()));
  }

  #[test]
  fn secret_prefix_hash_is_not_accepted() {
    use sha2::Digest;

    let signer = CsrfSigner::new("s3cret").unwrap();
    let nonce = "abc123";
    let forged = hex::encode(Sha256::digest(format!("s3cret:{nonce}")));
    assert!(!signer.verify(&format!("{nonce}.{forged}")));
  }
}
