//! Error types for `anamnesis-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::entry::EntryKey;

#[derive(Debug, Error)]
pub enum Error {
  #[error("authentication required")]
  Unauthenticated,

  #[error("clinician {clinician} has no active relationship with patient {patient}")]
  NotAuthorized { clinician: Uuid, patient: Uuid },

  #[error("patient not found: {0}")]
  PatientNotFound(Uuid),

  #[error("entry not found: {0}")]
  EntryNotFound(String),

  #[error("an entry with key {0} already exists for this patient")]
  DuplicateEntry(EntryKey),

  /// Validate and annotate only apply to curated rows.
  #[error("entry {0} is not curated; promote it first")]
  NotCurated(String),

  #[error("invalid transition: {0}")]
  InvalidTransition(String),

  #[error("validation failure: {0}")]
  ValidationFailure(String),

  #[error("entry {0} was modified concurrently")]
  ConcurrentModification(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  /// Whether a caller should retry the operation once before surfacing it.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::ConcurrentModification(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
