//! Request cookie parsing and `Set-Cookie` construction.
//!
//! The anonymous vote history is stored as URL-safe base64 of its JSON form,
//! which keeps the value within the cookie-octet character set. A raw JSON
//! cookie value is still accepted on read.

use axum::http::{HeaderMap, HeaderValue, header};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64URL};
use chrono::{TimeDelta, Utc};
use upvote_core::vote::VoterHistory;

use crate::error::ApiError;

/// The value of the cookie called `name`, if the client sent one.
pub fn get(headers: &HeaderMap, name: &str) -> Option<String> {
  headers
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(k, _)| *k == name)
    .map(|(_, v)| v.to_owned())
}

/// Decode a history cookie value into the JSON the history tracker expects.
pub fn decode_history(value: &str) -> String {
  B64URL
    .decode(value)
    .ok()
    .and_then(|bytes| String::from_utf8(bytes).ok())
    .unwrap_or_else(|| value.to_owned())
}

pub fn encode_history(history: &VoterHistory) -> Result<String, ApiError> {
  let json = history.to_json()?;
  Ok(B64URL.encode(json))
}

/// Build a `Set-Cookie` header value.
///
/// `max_age_secs` of `None` produces a session cookie.
pub fn set_cookie(
  name: &str,
  value: &str,
  max_age_secs: Option<i64>,
  http_only: bool,
) -> Result<HeaderValue, ApiError> {
  let mut cookie = format!("{name}={value}; Path=/; SameSite=Lax");
  if let Some(max_age) = max_age_secs {
    cookie.push_str(&format!("; Max-Age={max_age}"));
    if let Some(expires) =
      TimeDelta::try_seconds(max_age).and_then(|d| Utc::now().checked_add_signed(d))
    {
      cookie.push_str(&expires.format("; Expires=%a, %d %b %Y %H:%M:%S GMT").to_string());
    }
  }
  if http_only {
    cookie.push_str("; HttpOnly");
  }
  HeaderValue::from_str(&cookie)
    .map_err(|e| ApiError::Internal(format!("invalid cookie {name:?}: {e}")))
}
