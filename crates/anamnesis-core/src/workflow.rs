//! ValidationWorkflow: the operations that mutate a patient's antecedents.
//!
//! Every operation resolves authorization against the relationship store at
//! call time, then reads the current state, checks its preconditions, and
//! writes conditionally on the revision it read. A write that finds the row
//! changed in between fails with [`Error::ConcurrentModification`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  clinician::Clinician,
  document::HistoryDocument,
  entry::{
    AntecedentEntry, CuratedEntry, DefinedBy, EntryId, EntryKey, EntryType,
    FREE_TEXT_SYSTEM, NewCuratedEntry, Origin,
  },
  exclusion::ExclusionSet,
  reconcile::{HistoryView, reconcile},
  store::{
    CuratedChange, DocumentStore, RecordStore, RelationshipStore, Suppression,
    WriteOutcome,
  },
};

// ─── Inputs and outcomes ─────────────────────────────────────────────────────

/// A candidate chosen by the clinician, to be added as a curated row.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAntecedent {
  pub code:       String,
  pub label:      String,
  pub system:     String,
  #[serde(rename = "type")]
  pub entry_type: EntryType,
  pub note:       Option<String>,
  /// Defaults to [`DefinedBy::Doctor`]; `patient` records a declaration that
  /// still awaits validation.
  #[serde(default)]
  pub defined_by: Option<DefinedBy>,
}

/// Result of [`AntecedentService::validate`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "entry", rename_all = "snake_case")]
pub enum ValidateOutcome {
  Validated(AntecedentEntry),
  /// The entry was validated before; nothing changed.
  AlreadyValidated(AntecedentEntry),
}

impl ValidateOutcome {
  pub fn entry(&self) -> &AntecedentEntry {
    match self {
      Self::Validated(e) | Self::AlreadyValidated(e) => e,
    }
  }
}

/// Result of [`AntecedentService::remove`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Removal {
  pub key:                EntryKey,
  pub origin:             Origin,
  /// `true` when the key was already suppressed before this call.
  pub already_suppressed: bool,
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// Entry point for reading and mutating a patient's antecedents.
///
/// The stores are reference-counted, so cloning is cheap.
pub struct AntecedentService<R, D, A> {
  records:       Arc<R>,
  documents:     Arc<D>,
  relationships: Arc<A>,
}

impl<R, D, A> Clone for AntecedentService<R, D, A> {
  fn clone(&self) -> Self {
    Self {
      records:       Arc::clone(&self.records),
      documents:     Arc::clone(&self.documents),
      relationships: Arc::clone(&self.relationships),
    }
  }
}

impl<R, D, A> AntecedentService<R, D, A>
where
  R: RecordStore,
  D: DocumentStore,
  A: RelationshipStore,
{
  pub fn new(records: Arc<R>, documents: Arc<D>, relationships: Arc<A>) -> Self {
    Self { records, documents, relationships }
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  /// The reconciled history of a patient.
  ///
  /// Never fails on a source outage: a failed source is left out and
  /// reported in [`HistoryView::warnings`].
  pub async fn history(&self, clinician: &Clinician, patient_id: Uuid) -> Result<HistoryView> {
    self.authorize(clinician, patient_id).await?;

    match self.records.patient_exists(patient_id).await {
      Ok(true) => {}
      Ok(false) => return Err(Error::PatientNotFound(patient_id)),
      Err(e) => warn!(%patient_id, error = %e, "patient lookup failed"),
    }

    let mut warnings = Vec::new();

    let curated = match self.records.list_curated(patient_id).await {
      Ok(rows) => rows,
      Err(e) => {
        warn!(%patient_id, error = %e, "curated fetch failed; serving embedded entries only");
        warnings.push("curated entries are temporarily unavailable".to_owned());
        Vec::new()
      }
    };

    let mut document = match self.load_document(patient_id).await {
      Ok(doc) => doc,
      Err(e) => {
        warn!(%patient_id, error = %e, "document fetch failed; treating as empty");
        warnings.push("patient-declared entries are temporarily unavailable".to_owned());
        HistoryDocument::default()
      }
    };

    let exclusions = match self.records.suppressed_keys(patient_id).await {
      Ok(set) => set,
      Err(e) => {
        // Without the exclusion set a removed entry could reappear.
        warn!(%patient_id, error = %e, "exclusion set fetch failed; withholding embedded entries");
        warnings.push("patient-declared entries are temporarily unavailable".to_owned());
        document = HistoryDocument::default();
        ExclusionSet::new()
      }
    };

    warnings.dedup();
    let mut view = reconcile(patient_id, curated, &document, &exclusions);
    view.warnings = warnings;
    Ok(view)
  }

  // ── Mutations ─────────────────────────────────────────────────────────

  /// Add a curated row from a search candidate.
  ///
  /// Fails with [`Error::DuplicateEntry`] if the key is already visible in
  /// the merged view, curated or embedded.
  pub async fn add(
    &self,
    clinician: &Clinician,
    patient_id: Uuid,
    candidate: NewAntecedent,
  ) -> Result<AntecedentEntry> {
    let input = validate_candidate(patient_id, clinician, candidate)?;
    self.authorize(clinician, patient_id).await?;

    if !self.records.patient_exists(patient_id).await.map_err(Error::store)? {
      return Err(Error::PatientNotFound(patient_id));
    }

    let key = EntryKey::new(&input.code, input.entry_type);
    let view = self.strict_view(patient_id).await?;
    if view.contains_key(&key) {
      return Err(Error::DuplicateEntry(key));
    }

    match self.records.insert_curated(input).await.map_err(Error::store)? {
      WriteOutcome::Applied(row) => {
        info!(%patient_id, entry_id = %row.entry_id, %key, "antecedent added");
        Ok(row.into())
      }
      WriteOutcome::Conflict => Err(Error::DuplicateEntry(key)),
      WriteOutcome::Missing => Err(Error::PatientNotFound(patient_id)),
      WriteOutcome::Stale => Err(Error::ConcurrentModification(key.to_string())),
    }
  }

  /// Mark a patient-declared curated entry as validated.
  ///
  /// Validating an already-validated entry succeeds without change.
  pub async fn validate(
    &self,
    clinician: &Clinician,
    patient_id: Uuid,
    entry_id: EntryId,
    expected_revision: Option<u32>,
  ) -> Result<ValidateOutcome> {
    let id = curated_id(entry_id)?;
    self.authorize(clinician, patient_id).await?;

    let row = self.curated_for_patient(id, patient_id).await?;
    check_revision(&row, expected_revision)?;

    if row.defined_by != DefinedBy::Patient {
      return Err(Error::InvalidTransition(format!(
        "entry {entry_id} was defined by a doctor and needs no validation"
      )));
    }
    if row.validated_by_doctor {
      return Ok(ValidateOutcome::AlreadyValidated(row.into()));
    }

    let change = CuratedChange::Validate { doctor_id: clinician.clinician_id };
    let row = self.apply(entry_id, row.revision, change).await?;
    info!(%patient_id, %entry_id, clinician = %clinician.username, "antecedent validated");
    Ok(ValidateOutcome::Validated(row.into()))
  }

  /// Replace the note of a curated entry; a blank note clears it.
  pub async fn annotate(
    &self,
    clinician: &Clinician,
    patient_id: Uuid,
    entry_id: EntryId,
    note: Option<String>,
    expected_revision: Option<u32>,
  ) -> Result<AntecedentEntry> {
    let id = curated_id(entry_id)?;
    self.authorize(clinician, patient_id).await?;

    let row = self.curated_for_patient(id, patient_id).await?;
    check_revision(&row, expected_revision)?;

    let note = note.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty());
    let row = self
      .apply(entry_id, row.revision, CuratedChange::Annotate { note })
      .await?;
    info!(%patient_id, %entry_id, "antecedent annotated");
    Ok(row.into())
  }

  /// Migrate an embedded entry into a curated, patient-defined row.
  ///
  /// This is the only way an embedded entry becomes eligible for
  /// [`Self::validate`] or [`Self::annotate`].
  pub async fn promote(
    &self,
    clinician: &Clinician,
    patient_id: Uuid,
    entry_id: EntryId,
  ) -> Result<AntecedentEntry> {
    let EntryId::Embedded { section, index } = entry_id else {
      return Err(Error::InvalidTransition(format!("entry {entry_id} is already curated")));
    };
    self.authorize(clinician, patient_id).await?;

    let document = self.load_document(patient_id).await?;
    let exclusions = self.records.suppressed_keys(patient_id).await.map_err(Error::store)?;
    let entry = document
      .find(patient_id, section, index)
      .filter(|e| !exclusions.contains(&e.key()))
      .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;

    let key = entry.key();
    let curated = self.records.list_curated(patient_id).await.map_err(Error::store)?;
    if curated.iter().any(|row| row.key() == key) {
      return Err(Error::DuplicateEntry(key));
    }

    let input = NewCuratedEntry {
      patient_id,
      code: entry.code,
      system: entry.system.unwrap_or_else(|| FREE_TEXT_SYSTEM.to_owned()),
      label: entry.label,
      entry_type: section,
      defined_by: DefinedBy::Patient,
      note: entry.note,
      doctor_id: None,
    };

    match self.records.insert_curated(input).await.map_err(Error::store)? {
      WriteOutcome::Applied(row) => {
        info!(%patient_id, from = %entry_id, entry_id = %row.entry_id, "embedded antecedent promoted");
        Ok(row.into())
      }
      WriteOutcome::Conflict => Err(Error::DuplicateEntry(key)),
      WriteOutcome::Missing => Err(Error::PatientNotFound(patient_id)),
      WriteOutcome::Stale => Err(Error::ConcurrentModification(entry_id.to_string())),
    }
  }

  /// Remove an entry from the merged view.
  ///
  /// A curated row is deleted and its key suppressed in one transaction, so
  /// an embedded entry sharing the key cannot resurface. An embedded entry
  /// cannot be deleted at its source; only its key is suppressed.
  pub async fn remove(
    &self,
    clinician: &Clinician,
    patient_id: Uuid,
    entry_id: EntryId,
    expected_revision: Option<u32>,
  ) -> Result<Removal> {
    match entry_id {
      EntryId::Curated(id) => {
        self.authorize(clinician, patient_id).await?;
        let row = self.curated_for_patient(id, patient_id).await?;
        check_revision(&row, expected_revision)?;

        let key = row.key();
        let already_suppressed = self
          .records
          .suppressed_keys(patient_id)
          .await
          .map_err(Error::store)?
          .contains(&key);
        let suppression = Suppression {
          patient_id,
          key: key.clone(),
          clinician_id: clinician.clinician_id,
        };

        match self
          .records
          .delete_curated(id, row.revision, suppression)
          .await
          .map_err(Error::store)?
        {
          WriteOutcome::Applied(()) => {
            info!(%patient_id, %entry_id, %key, "curated antecedent removed and suppressed");
            Ok(Removal { key, origin: Origin::Curated, already_suppressed })
          }
          WriteOutcome::Missing => Err(Error::EntryNotFound(entry_id.to_string())),
          WriteOutcome::Stale | WriteOutcome::Conflict => {
            Err(Error::ConcurrentModification(entry_id.to_string()))
          }
        }
      }
      EntryId::Embedded { section, index } => {
        if expected_revision.is_some() {
          return Err(Error::ValidationFailure(
            "embedded entries carry no revision".to_owned(),
          ));
        }
        self.authorize(clinician, patient_id).await?;

        let document = self.load_document(patient_id).await?;
        let entry = document
          .find(patient_id, section, index)
          .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;

        let key = entry.key();
        let inserted = self
          .records
          .suppress_key(Suppression {
            patient_id,
            key: key.clone(),
            clinician_id: clinician.clinician_id,
          })
          .await
          .map_err(Error::store)?;
        info!(%patient_id, %entry_id, %key, "embedded antecedent suppressed");
        Ok(Removal { key, origin: Origin::Embedded, already_suppressed: !inserted })
      }
    }
  }

  // ── Helpers ───────────────────────────────────────────────────────────

  /// Reject the call unless the clinician currently has an active
  /// relationship with the patient. Never cached.
  async fn authorize(&self, clinician: &Clinician, patient_id: Uuid) -> Result<()> {
    let active = self
      .relationships
      .has_active_relationship(clinician.clinician_id, patient_id)
      .await
      .map_err(Error::store)?;
    if active {
      Ok(())
    } else {
      warn!(clinician = %clinician.username, %patient_id, "no active care relationship");
      Err(Error::NotAuthorized { clinician: clinician.clinician_id, patient: patient_id })
    }
  }

  async fn load_document(&self, patient_id: Uuid) -> Result<HistoryDocument> {
    let raw = self
      .documents
      .history_document(patient_id)
      .await
      .map_err(Error::store)?;
    Ok(raw.as_ref().map(HistoryDocument::from_json).unwrap_or_default())
  }

  /// The merged view with every source required; used before writes.
  async fn strict_view(&self, patient_id: Uuid) -> Result<HistoryView> {
    let curated = self.records.list_curated(patient_id).await.map_err(Error::store)?;
    let document = self.load_document(patient_id).await?;
    let exclusions = self.records.suppressed_keys(patient_id).await.map_err(Error::store)?;
    Ok(reconcile(patient_id, curated, &document, &exclusions))
  }

  /// Fetch a curated row, treating rows of other patients as missing.
  async fn curated_for_patient(&self, id: Uuid, patient_id: Uuid) -> Result<CuratedEntry> {
    self
      .records
      .get_curated(id)
      .await
      .map_err(Error::store)?
      .filter(|row| row.patient_id == patient_id)
      .ok_or_else(|| Error::EntryNotFound(id.to_string()))
  }

  async fn apply(
    &self,
    entry_id: EntryId,
    revision: u32,
    change: CuratedChange,
  ) -> Result<CuratedEntry> {
    let EntryId::Curated(id) = entry_id else {
      return Err(Error::NotCurated(entry_id.to_string()));
    };
    match self
      .records
      .update_curated(id, revision, change)
      .await
      .map_err(Error::store)?
    {
      WriteOutcome::Applied(row) => Ok(row),
      WriteOutcome::Missing => Err(Error::EntryNotFound(entry_id.to_string())),
      WriteOutcome::Stale | WriteOutcome::Conflict => {
        Err(Error::ConcurrentModification(entry_id.to_string()))
      }
    }
  }
}

// ─── Free helpers ────────────────────────────────────────────────────────────

fn curated_id(entry_id: EntryId) -> Result<Uuid> {
  match entry_id {
    EntryId::Curated(id) => Ok(id),
    EntryId::Embedded { .. } => Err(Error::NotCurated(entry_id.to_string())),
  }
}

fn check_revision(row: &CuratedEntry, expected: Option<u32>) -> Result<()> {
  match expected {
    Some(rev) if rev != row.revision => {
      Err(Error::ConcurrentModification(row.entry_id.to_string()))
    }
    _ => Ok(()),
  }
}

fn validate_candidate(
  patient_id: Uuid,
  clinician: &Clinician,
  candidate: NewAntecedent,
) -> Result<NewCuratedEntry> {
  let required = |field: &str, value: String| {
    let value = value.trim().to_owned();
    if value.is_empty() {
      Err(Error::ValidationFailure(format!("{field} must not be blank")))
    } else {
      Ok(value)
    }
  };

  Ok(NewCuratedEntry {
    patient_id,
    code: required("code", candidate.code)?,
    system: required("system", candidate.system)?,
    label: required("label", candidate.label)?,
    entry_type: candidate.entry_type,
    defined_by: candidate.defined_by.unwrap_or(DefinedBy::Doctor),
    note: candidate
      .note
      .map(|n| n.trim().to_owned())
      .filter(|n| !n.is_empty()),
    doctor_id: Some(clinician.clinician_id),
  })
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use serde_json::{Value, json};

  use super::*;

  #[derive(Debug, thiserror::Error)]
  #[error("store offline")]
  struct Offline;

  /// In-memory store whose individual reads can be made to fail.
  #[derive(Default)]
  struct FlakyStore {
    known:           bool,
    curated:         Vec<CuratedEntry>,
    document:        Option<Value>,
    exclusions:      ExclusionSet,
    fail_curated:    bool,
    fail_document:   bool,
    fail_exclusions: bool,
  }

  impl RecordStore for FlakyStore {
    type Error = Offline;

    async fn patient_exists(&self, _patient_id: Uuid) -> Result<bool, Offline> { Ok(self.known) }

    async fn list_curated(&self, _patient_id: Uuid) -> Result<Vec<CuratedEntry>, Offline> {
      if self.fail_curated { Err(Offline) } else { Ok(self.curated.clone()) }
    }

    async fn get_curated(&self, entry_id: Uuid) -> Result<Option<CuratedEntry>, Offline> {
      Ok(self.curated.iter().find(|r| r.entry_id == entry_id).cloned())
    }

    async fn insert_curated(
      &self,
      _input: NewCuratedEntry,
    ) -> Result<WriteOutcome<CuratedEntry>, Offline> {
      Err(Offline)
    }

    async fn update_curated(
      &self,
      _entry_id: Uuid,
      _expected_revision: u32,
      _change: CuratedChange,
    ) -> Result<WriteOutcome<CuratedEntry>, Offline> {
      Err(Offline)
    }

    async fn delete_curated(
      &self,
      _entry_id: Uuid,
      _expected_revision: u32,
      _suppression: Suppression,
    ) -> Result<WriteOutcome<()>, Offline> {
      Err(Offline)
    }

    async fn suppressed_keys(&self, _patient_id: Uuid) -> Result<ExclusionSet, Offline> {
      if self.fail_exclusions { Err(Offline) } else { Ok(self.exclusions.clone()) }
    }

    async fn suppress_key(&self, _suppression: Suppression) -> Result<bool, Offline> {
      Err(Offline)
    }
  }

  impl DocumentStore for FlakyStore {
    type Error = Offline;

    async fn history_document(&self, _patient_id: Uuid) -> Result<Option<Value>, Offline> {
      if self.fail_document { Err(Offline) } else { Ok(self.document.clone()) }
    }
  }

  impl RelationshipStore for FlakyStore {
    type Error = Offline;

    async fn has_active_relationship(
      &self,
      _clinician_id: Uuid,
      _patient_id: Uuid,
    ) -> Result<bool, Offline> {
      Ok(true)
    }
  }

  fn clinician() -> Clinician {
    Clinician { clinician_id: Uuid::new_v4(), username: "dr.martin".to_owned() }
  }

  fn asthma_row(patient_id: Uuid) -> CuratedEntry {
    CuratedEntry {
      entry_id: Uuid::new_v4(),
      patient_id,
      code: "J45".to_owned(),
      system: "CIM-11".to_owned(),
      label: "Asthme".to_owned(),
      entry_type: EntryType::Medical,
      defined_by: DefinedBy::Doctor,
      validated_by_doctor: false,
      note: None,
      created_at: Utc::now(),
      doctor_id: None,
      revision: 0,
    }
  }

  /// A patient with one curated row and one embedded migraine.
  fn populated(patient_id: Uuid) -> FlakyStore {
    FlakyStore {
      known: true,
      curated: vec![asthma_row(patient_id)],
      document: Some(json!({ "history": { "medical": [ { "label": "Migraine" } ] } })),
      ..FlakyStore::default()
    }
  }

  async fn history_of(store: FlakyStore, patient_id: Uuid) -> Result<HistoryView> {
    let store = Arc::new(store);
    let service = AntecedentService::new(store.clone(), store.clone(), store);
    service.history(&clinician(), patient_id).await
  }

  fn codes(view: &HistoryView) -> Vec<&str> {
    view.medical.iter().map(|e| e.code.as_str()).collect()
  }

  #[tokio::test]
  async fn healthy_sources_give_a_full_view() {
    let patient_id = Uuid::new_v4();
    let view = history_of(populated(patient_id), patient_id).await.unwrap();

    assert_eq!(codes(&view), ["J45", "MIG"]);
    assert!(view.warnings.is_empty());
  }

  #[tokio::test]
  async fn curated_outage_serves_embedded_entries_with_a_warning() {
    let patient_id = Uuid::new_v4();
    let store = FlakyStore { fail_curated: true, ..populated(patient_id) };
    let view = history_of(store, patient_id).await.unwrap();

    assert_eq!(codes(&view), ["MIG"]);
    assert_eq!(view.medical[0].origin, Origin::Embedded);
    assert_eq!(view.warnings, ["curated entries are temporarily unavailable"]);
  }

  #[tokio::test]
  async fn exclusion_outage_withholds_embedded_entries() {
    let patient_id = Uuid::new_v4();
    let store = FlakyStore { fail_exclusions: true, ..populated(patient_id) };
    let view = history_of(store, patient_id).await.unwrap();

    assert_eq!(codes(&view), ["J45"]);
    assert_eq!(view.warnings, ["patient-declared entries are temporarily unavailable"]);
  }

  #[tokio::test]
  async fn document_outage_is_treated_as_empty() {
    let patient_id = Uuid::new_v4();
    let store = FlakyStore { fail_document: true, ..populated(patient_id) };
    let view = history_of(store, patient_id).await.unwrap();

    assert_eq!(codes(&view), ["J45"]);
    assert_eq!(view.warnings, ["patient-declared entries are temporarily unavailable"]);
  }

  #[tokio::test]
  async fn document_and_exclusion_outages_warn_once() {
    let patient_id = Uuid::new_v4();
    let store = FlakyStore { fail_document: true, fail_exclusions: true, ..populated(patient_id) };
    let view = history_of(store, patient_id).await.unwrap();

    assert_eq!(codes(&view), ["J45"]);
    assert_eq!(view.warnings.len(), 1);
  }

  #[tokio::test]
  async fn unknown_patient_is_not_found() {
    let patient_id = Uuid::new_v4();
    let store = FlakyStore { known: false, ..FlakyStore::default() };
    let err = history_of(store, patient_id).await.unwrap_err();

    assert!(matches!(err, Error::PatientNotFound(id) if id == patient_id));
  }
}
