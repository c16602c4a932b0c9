//! API error type and [`axum::response::IntoResponse`] implementation.

use anamnesis_core::Error as CoreError;
use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// `Retry-After` value sent when every search upstream was unavailable.
pub const RETRY_AFTER_SECS: &str = "5";

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] CoreError),

  #[error(transparent)]
  Search(#[from] anamnesis_search::Error),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Core(e) => match e {
        CoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
        CoreError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
        CoreError::PatientNotFound(_) | CoreError::EntryNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::DuplicateEntry(_) => StatusCode::CONFLICT,
        CoreError::ConcurrentModification(_) => StatusCode::PRECONDITION_FAILED,
        CoreError::NotCurated(_) | CoreError::InvalidTransition(_) => {
          StatusCode::UNPROCESSABLE_ENTITY
        }
        CoreError::ValidationFailure(_) => StatusCode::BAD_REQUEST,
        CoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
      ApiError::Search(anamnesis_search::Error::InvalidQuery(_)) => StatusCode::BAD_REQUEST,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(error = %self, "request failed");
    }

    let mut res = (status, Json(json!({ "error": self.to_string() }))).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"anamnesis\""),
      );
    }
    res
  }
}
