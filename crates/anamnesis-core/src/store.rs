//! Storage traits: curated records, patient documents, care relationships.
//!
//! The traits are implemented by storage backends (e.g.
//! `anamnesis-store-sqlite`). The workflow depends on these abstractions,
//! not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  entry::{CuratedEntry, EntryKey, NewCuratedEntry},
  exclusion::ExclusionSet,
};

// ─── Write outcomes ──────────────────────────────────────────────────────────

/// Result of a conditional write against the record store.
///
/// Backends report precondition failures as values so the caller decides
/// which error to surface.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
  Applied(T),
  /// The row exists but its revision no longer matches the expected one.
  Stale,
  /// The row does not exist.
  Missing,
  /// A uniqueness constraint rejected the write.
  Conflict,
}

impl<T> WriteOutcome<T> {
  /// Convert the applied value, keeping every other outcome as is.
  pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<WriteOutcome<U>, E> {
    Ok(match self {
      Self::Applied(v) => WriteOutcome::Applied(f(v)?),
      Self::Stale => WriteOutcome::Stale,
      Self::Missing => WriteOutcome::Missing,
      Self::Conflict => WriteOutcome::Conflict,
    })
  }
}

/// A mutation applied to a curated row.
#[derive(Debug, Clone, PartialEq)]
pub enum CuratedChange {
  /// Mark a patient-declared entry as validated by `doctor_id`.
  Validate { doctor_id: Uuid },
  /// Replace the note; `None` clears it.
  Annotate { note: Option<String> },
}

/// A key to union into a patient's persisted exclusion set.
#[derive(Debug, Clone, PartialEq)]
pub struct Suppression {
  pub patient_id:   Uuid,
  pub key:          EntryKey,
  pub clinician_id: Uuid,
}

// ─── RecordStore ─────────────────────────────────────────────────────────────

/// Relational store of curated antecedent rows and suppressed keys.
///
/// Every mutating method is a single atomic, conditional operation: updates
/// and deletes only apply when the stored revision equals
/// `expected_revision`.
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn patient_exists(
    &self,
    patient_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// All curated rows for a patient, newest first.
  fn list_curated(
    &self,
    patient_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CuratedEntry>, Self::Error>> + Send + '_;

  fn get_curated(
    &self,
    entry_id: Uuid,
  ) -> impl Future<Output = Result<Option<CuratedEntry>, Self::Error>> + Send + '_;

  /// Insert a row; [`WriteOutcome::Conflict`] if the patient already has a
  /// curated row with the same `(code, type)`.
  fn insert_curated(
    &self,
    input: NewCuratedEntry,
  ) -> impl Future<Output = Result<WriteOutcome<CuratedEntry>, Self::Error>> + Send + '_;

  /// Apply `change` if the row is still at `expected_revision`, bumping the
  /// revision. Returns the updated row.
  fn update_curated(
    &self,
    entry_id: Uuid,
    expected_revision: u32,
    change: CuratedChange,
  ) -> impl Future<Output = Result<WriteOutcome<CuratedEntry>, Self::Error>> + Send + '_;

  /// Delete the row if it is still at `expected_revision` and, in the same
  /// transaction, union `suppression` into the patient's exclusion set.
  fn delete_curated(
    &self,
    entry_id: Uuid,
    expected_revision: u32,
    suppression: Suppression,
  ) -> impl Future<Output = Result<WriteOutcome<()>, Self::Error>> + Send + '_;

  /// The persisted exclusion set of a patient.
  fn suppressed_keys(
    &self,
    patient_id: Uuid,
  ) -> impl Future<Output = Result<ExclusionSet, Self::Error>> + Send + '_;

  /// Union one key into the exclusion set. Returns `false` if it was already
  /// present.
  fn suppress_key(
    &self,
    suppression: Suppression,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── DocumentStore ───────────────────────────────────────────────────────────

/// Read access to the per-patient JSON document.
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The raw document, or `None` if the patient has none.
  fn history_document(
    &self,
    patient_id: Uuid,
  ) -> impl Future<Output = Result<Option<serde_json::Value>, Self::Error>> + Send + '_;
}

// ─── RelationshipStore ───────────────────────────────────────────────────────

/// The external clinician↔patient relationship registry.
pub trait RelationshipStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn has_active_relationship(
    &self,
    clinician_id: Uuid,
    patient_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
