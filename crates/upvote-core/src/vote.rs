//! Vote values, item keys, voter histories, and item totals.

use std::{fmt, ops::Neg, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::{Error, Result};

/// Separates the element id from the group in a canonical item key.
pub const KEY_SEPARATOR: char = ':';

// ─── Vote ────────────────────────────────────────────────────────────────────

/// A directional vote. "No vote" is expressed as `Option::<Vote>::None`.
///
/// On the wire a vote is the integer `1` or `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Vote {
  Up,
  Down,
}

impl Vote {
  pub fn value(self) -> i64 {
    match self {
      Self::Up => 1,
      Self::Down => -1,
    }
  }

  pub fn is_up(self) -> bool { matches!(self, Self::Up) }
}

impl Neg for Vote {
  type Output = Self;

  fn neg(self) -> Self {
    match self {
      Self::Up => Self::Down,
      Self::Down => Self::Up,
    }
  }
}

impl TryFrom<i64> for Vote {
  type Error = Error;

  fn try_from(value: i64) -> Result<Self> {
    match value {
      1 => Ok(Self::Up),
      -1 => Ok(Self::Down),
      other => Err(Error::InvalidVote(other)),
    }
  }
}

impl From<Vote> for i64 {
  fn from(vote: Vote) -> Self { vote.value() }
}

/// The integer vote state reported by read paths: `1`, `-1`, or `0` for none.
pub fn vote_state(vote: Option<Vote>) -> i64 { vote.map_or(0, Vote::value) }

// ─── ItemKey ─────────────────────────────────────────────────────────────────

/// Identifies a votable item: an element plus an optional group namespace.
///
/// The canonical string form is `"{element_id}"` or
/// `"{element_id}:{group}"`. Only the first separator splits; any further
/// separators belong to the group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemKey {
  element_id: i64,
  group:      Option<String>,
}

impl ItemKey {
  /// Build a key; an empty group is normalised to "no group".
  pub fn new(element_id: i64, group: Option<&str>) -> Result<Self> {
    if element_id <= 0 {
      return Err(Error::MalformedItemKey(element_id.to_string()));
    }
    Ok(Self {
      element_id,
      group: group.filter(|g| !g.is_empty()).map(str::to_owned),
    })
  }

  pub fn element_id(&self) -> i64 { self.element_id }

  pub fn group(&self) -> Option<&str> { self.group.as_deref() }

  /// `true` if this key's group is exactly `group` (`None` matches only
  /// ungrouped keys).
  pub fn in_group(&self, group: Option<&str>) -> bool { self.group() == group }
}

/// Parsing normalises the element id: surrounding whitespace, a leading `+`
/// and leading zeros are accepted, so `" 05"`, `"+5"` and `"5"` name the same
/// item. Callers that store or compare keys must use the [`Display`] form.
///
/// [`Display`]: fmt::Display
impl FromStr for ItemKey {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let (id_part, group) = match s.split_once(KEY_SEPARATOR) {
      Some((id, rest)) => (id, Some(rest)),
      None => (s, None),
    };
    let element_id = id_part
      .trim()
      .parse::<i64>()
      .map_err(|_| Error::MalformedItemKey(s.to_owned()))?;
    Self::new(element_id, group).map_err(|_| Error::MalformedItemKey(s.to_owned()))
  }
}

impl fmt::Display for ItemKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.group {
      Some(group) => write!(f, "{}{KEY_SEPARATOR}{group}", self.element_id),
      None => write!(f, "{}", self.element_id),
    }
  }
}

impl TryFrom<String> for ItemKey {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<ItemKey> for String {
  fn from(key: ItemKey) -> Self { key.to_string() }
}

// ─── VoterHistory ────────────────────────────────────────────────────────────

/// One element's vote as reported by group queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVote {
  pub id:   i64,
  pub vote: Vote,
}

/// Every vote cast by a single voter, keyed by item-key string.
///
/// Keys are kept as raw strings so that histories decoded from a client
/// cookie survive even when some keys do not parse; such keys never match a
/// group query. Entries keep the order in which they were first cast:
/// re-voting on a key updates it in place, clearing it removes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoterHistory {
  entries: Vec<(String, Vote)>,
}

impl VoterHistory {
  pub fn new() -> Self { Self::default() }

  pub fn get(&self, item_key: &str) -> Option<Vote> {
    self.entries.iter().find(|(k, _)| k == item_key).map(|(_, v)| *v)
  }

  pub fn set(&mut self, item_key: &ItemKey, vote: Vote) {
    self.insert(item_key.to_string(), vote);
  }

  pub fn clear(&mut self, item_key: &ItemKey) -> Option<Vote> {
    let key = item_key.to_string();
    let pos = self.entries.iter().position(|(k, _)| *k == key)?;
    Some(self.entries.remove(pos).1)
  }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn iter(&self) -> impl Iterator<Item = (&str, Vote)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), *v))
  }

  /// Votes whose key belongs to `group`, in history order.
  pub fn votes_in_group(&self, group: Option<&str>) -> Vec<GroupVote> {
    self
      .iter()
      .filter_map(|(raw, vote)| {
        let key = raw.parse::<ItemKey>().ok()?;
        key.in_group(group).then_some(GroupVote { id: key.element_id(), vote })
      })
      .collect()
  }

  /// Decode a history from client-supplied JSON.
  ///
  /// Entries whose value is not a valid vote are dropped. Returns `None` when
  /// the input is not a JSON object at all.
  pub fn from_json_lenient(json: &str) -> Option<Self> {
    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json).ok()?;
    let mut history = Self::new();
    for (k, v) in raw {
      if let Some(vote) = v.as_i64().and_then(|v| Vote::try_from(v).ok()) {
        history.insert(k, vote);
      }
    }
    Some(history)
  }

  pub fn to_json(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }

  fn insert(&mut self, key: String, vote: Vote) {
    match self.entries.iter_mut().find(|(k, _)| *k == key) {
      Some(entry) => entry.1 = vote,
      None => self.entries.push((key, vote)),
    }
  }
}

impl Serialize for VoterHistory {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
  }
}

impl<'de> Deserialize<'de> for VoterHistory {
  /// Strict decode: every value must be a valid vote. Object order is kept.
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    let raw = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    let mut history = Self::new();
    for (k, v) in raw {
      let vote = v
        .as_i64()
        .and_then(|v| Vote::try_from(v).ok())
        .ok_or_else(|| D::Error::custom(format!("invalid vote for {k:?}: {v}")))?;
      history.insert(k, vote);
    }
    Ok(history)
  }
}

impl FromIterator<(ItemKey, Vote)> for VoterHistory {
  fn from_iter<T: IntoIterator<Item = (ItemKey, Vote)>>(iter: T) -> Self {
    let mut history = Self::new();
    for (key, vote) in iter {
      history.set(&key, vote);
    }
    history
  }
}

// ─── ItemTotals ──────────────────────────────────────────────────────────────

/// Running aggregate for one item key.
///
/// `total_votes == total_upvotes + total_downvotes` and
/// `tally == total_upvotes - total_downvotes` hold for every totals row the
/// reconciler produces from a consistent snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemTotals {
  pub tally:           i64,
  pub total_votes:     i64,
  pub total_upvotes:   i64,
  pub total_downvotes: i64,
}

impl ItemTotals {
  pub fn is_consistent(&self) -> bool {
    self.total_votes == self.total_upvotes + self.total_downvotes
      && self.tally == self.total_upvotes - self.total_downvotes
  }
}
