//! Handler for medication catalog search.
//!
//! `GET /catalog/search?query=<text>[&jurisdiction=fr|us|all]`
//!
//! Answers `{"items": [...], "sourcesUsed": [...]}`.

use anamnesis_search::catalog::{CatalogResults, JurisdictionFilter};
use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;

use crate::{AppState, Backend, auth::Authenticated, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
  pub query:        String,
  #[serde(default)]
  pub jurisdiction: JurisdictionFilter,
}

/// `GET /catalog/search`
pub async fn search<S: Backend>(
  State(state): State<AppState<S>>,
  Authenticated(_): Authenticated,
  Query(params): Query<SearchParams>,
) -> Result<Json<CatalogResults>, ApiError> {
  let results = state.catalog.search(&params.query, params.jurisdiction).await?;
  Ok(Json(results))
}
