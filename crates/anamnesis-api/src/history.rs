//! Handler for the reconciled history view.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/patients/{patient_id}/history` | Curated and embedded entries merged |

use anamnesis_core::reconcile::HistoryView;
use axum::{
  Json,
  extract::{Path, State},
};
use uuid::Uuid;

use crate::{AppState, Backend, auth::Authenticated, error::ApiError};

/// `GET /patients/{patient_id}/history`
pub async fn get<S: Backend>(
  State(state): State<AppState<S>>,
  Authenticated(clinician): Authenticated,
  Path(patient_id): Path<Uuid>,
) -> Result<Json<HistoryView>, ApiError> {
  let view = state.service.history(&clinician, patient_id).await?;
  Ok(Json(view))
}
