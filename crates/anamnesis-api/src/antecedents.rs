//! Handlers for antecedent mutations.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/patients/{patient_id}/antecedents` | Body: [`NewAntecedent`]; 201 |
//! | `POST`   | `/patients/{patient_id}/antecedents/{entry_id}/validate` | `?expected_revision=` |
//! | `POST`   | `/patients/{patient_id}/antecedents/{entry_id}/annotate` | Body: `{"note": ...}` |
//! | `POST`   | `/patients/{patient_id}/antecedents/{entry_id}/promote` | Embedded ids only; 201 |
//! | `DELETE` | `/patients/{patient_id}/antecedents/{entry_id}` | `?expected_revision=` |
//!
//! A mutation that loses a race is retried once, unless the caller pinned
//! the revision it expects.

use std::future::Future;

use anamnesis_core::{
  Error as CoreError,
  entry::{AntecedentEntry, EntryId},
  workflow::{NewAntecedent, Removal, ValidateOutcome},
};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::{AppState, Backend, auth::Authenticated, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct RevisionParams {
  pub expected_revision: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AnnotateBody {
  pub note: Option<String>,
}

fn parse_entry_id(raw: &str) -> Result<EntryId, ApiError> { Ok(raw.parse()?) }

/// Run `op`, and once more if it failed on a concurrent modification and
/// the caller did not pin a revision.
async fn retry_once<T, F, Fut>(expected_revision: Option<u32>, mut op: F) -> Result<T, CoreError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, CoreError>>,
{
  match op().await {
    Err(e) if expected_revision.is_none() && e.is_retryable() => {
      debug!(error = %e, "retrying after concurrent modification");
      op().await
    }
    other => other,
  }
}

// ─── Add ──────────────────────────────────────────────────────────────────────

/// `POST /patients/{patient_id}/antecedents`
pub async fn add<S: Backend>(
  State(state): State<AppState<S>>,
  Authenticated(clinician): Authenticated,
  Path(patient_id): Path<Uuid>,
  Json(body): Json<NewAntecedent>,
) -> Result<(StatusCode, Json<AntecedentEntry>), ApiError> {
  let entry = state.service.add(&clinician, patient_id, body).await?;
  Ok((StatusCode::CREATED, Json(entry)))
}

// ─── Validate ─────────────────────────────────────────────────────────────────

/// `POST /patients/{patient_id}/antecedents/{entry_id}/validate`
pub async fn validate<S: Backend>(
  State(state): State<AppState<S>>,
  Authenticated(clinician): Authenticated,
  Path((patient_id, entry_id)): Path<(Uuid, String)>,
  Query(params): Query<RevisionParams>,
) -> Result<Json<ValidateOutcome>, ApiError> {
  let entry_id = parse_entry_id(&entry_id)?;
  let expected = params.expected_revision;
  let (service, clinician) = (&state.service, &clinician);
  let outcome = retry_once(expected, move || {
    service.validate(clinician, patient_id, entry_id, expected)
  })
  .await?;
  Ok(Json(outcome))
}

// ─── Annotate ─────────────────────────────────────────────────────────────────

/// `POST /patients/{patient_id}/antecedents/{entry_id}/annotate`
pub async fn annotate<S: Backend>(
  State(state): State<AppState<S>>,
  Authenticated(clinician): Authenticated,
  Path((patient_id, entry_id)): Path<(Uuid, String)>,
  Query(params): Query<RevisionParams>,
  Json(body): Json<AnnotateBody>,
) -> Result<Json<AntecedentEntry>, ApiError> {
  let entry_id = parse_entry_id(&entry_id)?;
  let expected = params.expected_revision;
  let (service, clinician, note) = (&state.service, &clinician, &body.note);
  let entry = retry_once(expected, move || {
    service.annotate(clinician, patient_id, entry_id, note.clone(), expected)
  })
  .await?;
  Ok(Json(entry))
}

// ─── Promote ──────────────────────────────────────────────────────────────────

/// `POST /patients/{patient_id}/antecedents/{entry_id}/promote`
pub async fn promote<S: Backend>(
  State(state): State<AppState<S>>,
  Authenticated(clinician): Authenticated,
  Path((patient_id, entry_id)): Path<(Uuid, String)>,
) -> Result<(StatusCode, Json<AntecedentEntry>), ApiError> {
  let entry_id = parse_entry_id(&entry_id)?;
  let entry = state.service.promote(&clinician, patient_id, entry_id).await?;
  Ok((StatusCode::CREATED, Json(entry)))
}

// ─── Remove ───────────────────────────────────────────────────────────────────

/// `DELETE /patients/{patient_id}/antecedents/{entry_id}`
pub async fn remove<S: Backend>(
  State(state): State<AppState<S>>,
  Authenticated(clinician): Authenticated,
  Path((patient_id, entry_id)): Path<(Uuid, String)>,
  Query(params): Query<RevisionParams>,
) -> Result<Json<Removal>, ApiError> {
  let entry_id = parse_entry_id(&entry_id)?;
  let expected = params.expected_revision;
  let (service, clinician) = (&state.service, &clinician);
  let removal = retry_once(expected, move || {
    service.remove(clinician, patient_id, entry_id, expected)
  })
  .await?;
  Ok(Json(removal))
}
