//! Handler for `GET /totals/{item_key}`.

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Serialize;
use upvote_core::{
  store::{TotalsStore, VoteStore},
  vote::{ItemKey, ItemTotals},
};

use crate::{AppState, error::ApiError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsBody {
  pub item_key: String,
  #[serde(flatten)]
  pub totals:   ItemTotals,
}

/// `GET /totals/{item_key}`: all zero for an item nobody has voted on.
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(item_key): Path<String>,
) -> Result<Json<TotalsBody>, ApiError>
where
  S: VoteStore + Clone + 'static,
{
  let key: ItemKey = item_key.parse()?;
  let totals = state
    .service
    .store()
    .totals(&key)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(TotalsBody { item_key: key.to_string(), totals }))
}
