//! Encoding and decoding helpers between domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings. Histories are compact JSON objects. The
//! absent group is stored as the empty string so it can take part in the
//! totals primary key.

use chrono::{DateTime, Utc};
use upvote_core::vote::{ItemTotals, VoterHistory};

use crate::Result;

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── Group ───────────────────────────────────────────────────────────────────

pub fn encode_group(group: Option<&str>) -> String {
  group.unwrap_or_default().to_owned()
}

// ─── History ─────────────────────────────────────────────────────────────────

pub fn encode_history(history: &VoterHistory) -> Result<String> {
  Ok(serde_json::to_string(history)?)
}

pub fn decode_history(s: &str) -> Result<VoterHistory> {
  Ok(serde_json::from_str(s)?)
}

/// [`decode_history`] for use inside a `tokio_rusqlite` closure.
pub fn decode_history_in_call(s: &str) -> tokio_rusqlite::Result<VoterHistory> {
  serde_json::from_str(s).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
}

/// [`encode_history`] for use inside a `tokio_rusqlite` closure.
pub fn encode_history_in_call(history: &VoterHistory) -> tokio_rusqlite::Result<String> {
  serde_json::to_string(history).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw counters read directly from an `element_totals` row.
pub struct RawTotals {
  pub tally:           i64,
  pub total_votes:     i64,
  pub total_upvotes:   i64,
  pub total_downvotes: i64,
}

impl RawTotals {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      tally:           row.get(0)?,
      total_votes:     row.get(1)?,
      total_upvotes:   row.get(2)?,
      total_downvotes: row.get(3)?,
    })
  }

  pub fn into_totals(self) -> ItemTotals {
    ItemTotals {
      tally:           self.tally,
      total_votes:     self.total_votes,
      total_upvotes:   self.total_upvotes,
      total_downvotes: self.total_downvotes,
    }
  }
}
