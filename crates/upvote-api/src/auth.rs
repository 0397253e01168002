//! Voter identity: HTTP Basic credentials checked against a configured user
//! directory.
//!
//! Credentials are optional. A request without an `Authorization` header
//! votes anonymously; a request with bad credentials is rejected.

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::http::HeaderMap;
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::Deserialize;
use upvote_core::identity::{IdentityProvider, User, UserId};

use crate::error::ApiError;

/// A user allowed to sign in, as listed in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UserAccount {
  pub id:            UserId,
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

impl UserAccount {
  fn user(&self) -> User {
    User { id: self.id, username: self.username.clone() }
  }
}

/// Every known user.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
  accounts: Vec<UserAccount>,
}

impl UserDirectory {
  pub fn new(accounts: Vec<UserAccount>) -> Self { Self { accounts } }

  pub fn by_id(&self, id: UserId) -> Option<User> {
    self.accounts.iter().find(|a| a.id == id).map(UserAccount::user)
  }

  /// Resolve the signed-in user from request headers.
  ///
  /// Returns `Ok(None)` when no credentials were sent.
  pub fn authenticate(&self, headers: &HeaderMap) -> Result<Option<User>, ApiError> {
    let Some(header_val) = headers.get(axum::http::header::AUTHORIZATION) else {
      return Ok(None);
    };
    let rejected = || ApiError::Unauthorized("invalid credentials".to_owned());

    let encoded = header_val
      .to_str()
      .ok()
      .and_then(|v| v.strip_prefix("Basic "))
      .ok_or_else(rejected)?;
    let decoded = B64.decode(encoded).map_err(|_| rejected())?;
    let creds   = std::str::from_utf8(&decoded).map_err(|_| rejected())?;

    let (username, password) = creds.split_once(':').ok_or_else(rejected)?;
    let account = self
      .accounts
      .iter()
      .find(|a| a.username == username)
      .ok_or_else(rejected)?;

    let parsed_hash = PasswordHash::new(&account.password_hash).map_err(|_| rejected())?;
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed_hash)
      .map_err(|_| rejected())?;

    Ok(Some(account.user()))
  }
}

/// The identity of one request's voter.
#[derive(Clone)]
pub struct RequestIdentity {
  users:   Arc<UserDirectory>,
  current: Option<User>,
}

impl RequestIdentity {
  pub fn new(users: Arc<UserDirectory>, current: Option<User>) -> Self {
    Self { users, current }
  }
}

impl IdentityProvider for RequestIdentity {
  fn current_user(&self) -> Option<User> { self.current.clone() }

  fn user_by_id(&self, id: UserId) -> Option<User> { self.users.by_id(id) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use argon2::{PasswordHasher, password_hash::SaltString};
  use axum::http::{HeaderValue, header};
  use rand_core::OsRng;

  fn directory(password: &str) -> UserDirectory {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();
    UserDirectory::new(vec![UserAccount {
      id:            7,
      username:      "user".to_string(),
      password_hash: hash,
    }])
  }

  fn headers(value: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    h
  }

  fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  #[test]
  fn correct_credentials() {
    let dir = directory("secret");
    let user = dir.authenticate(&headers(&basic("user", "secret"))).unwrap();
    assert_eq!(user.map(|u| u.id), Some(7));
  }

  #[test]
  fn missing_header_is_anonymous() {
    let dir = directory("secret");
    assert!(dir.authenticate(&HeaderMap::new()).unwrap().is_none());
  }

  #[test]
  fn wrong_password() {
    let dir = directory("secret");
    let result = dir.authenticate(&headers(&basic("user", "wrong")));
    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
  }

  #[test]
  fn unknown_user() {
    let dir = directory("secret");
    let result = dir.authenticate(&headers(&basic("someone", "secret")));
    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
  }

  #[test]
  fn invalid_base64() {
    let dir = directory("secret");
    let result = dir.authenticate(&headers("Basic !!!not-base64!!!"));
    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
  }

  #[test]
  fn request_identity_looks_up_directory() {
    let identity = RequestIdentity::new(Arc::new(directory("secret")), None);
    assert!(identity.current_user().is_none());
    assert_eq!(identity.user_by_id(7).map(|u| u.username), Some("user".to_string()));
    assert!(identity.user_by_id(8).is_none());
  }
}
