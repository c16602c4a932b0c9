//! Handler for terminology search.
//!
//! `GET /terminology/search?query=<text>&type=medical|surgical`
//!
//! Answers the ranked candidate list. When every vocabulary failed the list
//! is empty and a `Retry-After` header is set.

use anamnesis_search::terminology::SearchTarget;
use axum::{
  Json,
  extract::{Query, State},
  http::{HeaderValue, header},
  response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
  AppState, Backend,
  auth::Authenticated,
  error::{ApiError, RETRY_AFTER_SECS},
};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
  pub query:  String,
  #[serde(rename = "type")]
  pub target: SearchTarget,
}

/// `GET /terminology/search`
pub async fn search<S: Backend>(
  State(state): State<AppState<S>>,
  Authenticated(_): Authenticated,
  Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
  let results = state.terminology.search(&params.query, params.target).await?;
  let retriable = results.retriable();

  let mut res = Json(results.candidates).into_response();
  if retriable {
    res
      .headers_mut()
      .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
  }
  Ok(res)
}
