//! Voter identity: users, user references, and the identity provider seam.

use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// An authenticated user as far as voting is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id:       UserId,
  pub username: String,
}

/// The ways a caller may name the user whose votes are being queried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UserRef {
  /// Whoever is signed in for the current request.
  #[default]
  Current,
  /// A user id that still has to be looked up.
  Id(UserId),
  /// An already-resolved user.
  User(User),
}

impl From<Option<UserId>> for UserRef {
  fn from(id: Option<UserId>) -> Self { id.map_or(Self::Current, Self::Id) }
}

/// Resolves who is voting. Implemented by the transport layer.
pub trait IdentityProvider: Send + Sync {
  /// The signed-in user for the current request, if any.
  fn current_user(&self) -> Option<User>;

  /// Look up a user by id. Returns `None` if no such user exists.
  fn user_by_id(&self, id: UserId) -> Option<User>;
}

/// An identity provider for contexts with nobody signed in and no user
/// directory, such as headless maintenance commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nobody;

impl IdentityProvider for Nobody {
  fn current_user(&self) -> Option<User> { None }

  fn user_by_id(&self, _id: UserId) -> Option<User> { None }
}
