//! Integration tests for `SqliteStore` against an in-memory database, both
//! directly and through the antecedent workflow.

use std::sync::Arc;

use anamnesis_core::{
  Error as CoreError,
  clinician::Clinician,
  entry::{DefinedBy, EntryId, EntryKey, EntryType, NewCuratedEntry, Origin},
  store::{CuratedChange, DocumentStore, RecordStore, RelationshipStore, Suppression, WriteOutcome},
  workflow::{AntecedentService, NewAntecedent, ValidateOutcome},
};
use serde_json::json;
use uuid::Uuid;

use crate::SqliteStore;

type Service = AntecedentService<SqliteStore, SqliteStore, SqliteStore>;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn service(s: &SqliteStore) -> Service {
  let shared = Arc::new(s.clone());
  AntecedentService::new(shared.clone(), shared.clone(), shared)
}

fn clinician() -> Clinician {
  Clinician { clinician_id: Uuid::new_v4(), username: "dr.martin".into() }
}

/// A patient under the care of a fresh clinician.
async fn patient_in_care(s: &SqliteStore) -> (Uuid, Clinician) {
  let patient = s.add_patient().await.unwrap();
  let doctor = clinician();
  s.grant_relationship(doctor.clinician_id, patient).await.unwrap();
  (patient, doctor)
}

fn new_row(patient_id: Uuid, code: &str, defined_by: DefinedBy) -> NewCuratedEntry {
  NewCuratedEntry {
    patient_id,
    code: code.into(),
    system: "CIM-11".into(),
    label: format!("label {code}"),
    entry_type: EntryType::Medical,
    defined_by,
    note: None,
    doctor_id: None,
  }
}

fn candidate(code: &str, label: &str, entry_type: EntryType) -> NewAntecedent {
  NewAntecedent {
    code: code.into(),
    label: label.into(),
    system: "CIM-11".into(),
    entry_type,
    note: None,
    defined_by: None,
  }
}

fn applied<T: std::fmt::Debug>(outcome: WriteOutcome<T>) -> T {
  match outcome {
    WriteOutcome::Applied(v) => v,
    other => panic!("expected Applied, got {other:?}"),
  }
}

// ─── Record store ────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get_curated() {
  let s = store().await;
  let patient = s.add_patient().await.unwrap();

  let row = applied(s.insert_curated(new_row(patient, "J45", DefinedBy::Doctor)).await.unwrap());
  assert_eq!(row.revision, 0);
  assert!(!row.validated_by_doctor);

  let fetched = s.get_curated(row.entry_id).await.unwrap().unwrap();
  assert_eq!(fetched, row);
  assert!(s.get_curated(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn list_curated_is_newest_first() {
  let s = store().await;
  let patient = s.add_patient().await.unwrap();

  for code in ["A01", "B02", "C03"] {
    applied(s.insert_curated(new_row(patient, code, DefinedBy::Doctor)).await.unwrap());
  }

  let codes: Vec<_> = s
    .list_curated(patient)
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.code)
    .collect();
  assert_eq!(codes, ["C03", "B02", "A01"]);
}

#[tokio::test]
async fn insert_duplicate_key_conflicts() {
  let s = store().await;
  let patient = s.add_patient().await.unwrap();

  applied(s.insert_curated(new_row(patient, "J45", DefinedBy::Doctor)).await.unwrap());
  let second = s.insert_curated(new_row(patient, "J45", DefinedBy::Patient)).await.unwrap();
  assert_eq!(second, WriteOutcome::Conflict);
}

#[tokio::test]
async fn insert_for_unknown_patient_is_missing() {
  let s = store().await;
  let outcome = s
    .insert_curated(new_row(Uuid::new_v4(), "J45", DefinedBy::Doctor))
    .await
    .unwrap();
  assert_eq!(outcome, WriteOutcome::Missing);
}

#[tokio::test]
async fn update_is_conditional_on_revision() {
  let s = store().await;
  let patient = s.add_patient().await.unwrap();
  let row = applied(s.insert_curated(new_row(patient, "J45", DefinedBy::Patient)).await.unwrap());
  let doctor = Uuid::new_v4();

  let updated = applied(
    s.update_curated(row.entry_id, 0, CuratedChange::Validate { doctor_id: doctor })
      .await
      .unwrap(),
  );
  assert!(updated.validated_by_doctor);
  assert_eq!(updated.revision, 1);
  assert_eq!(updated.doctor_id, Some(doctor));

  // A second writer holding revision 0 loses.
  let stale = s
    .update_curated(row.entry_id, 0, CuratedChange::Annotate { note: Some("x".into()) })
    .await
    .unwrap();
  assert_eq!(stale, WriteOutcome::Stale);

  let missing = s
    .update_curated(Uuid::new_v4(), 0, CuratedChange::Annotate { note: None })
    .await
    .unwrap();
  assert_eq!(missing, WriteOutcome::Missing);
}

#[tokio::test]
async fn delete_suppresses_key_atomically() {
  let s = store().await;
  let patient = s.add_patient().await.unwrap();
  let row = applied(s.insert_curated(new_row(patient, "J45", DefinedBy::Doctor)).await.unwrap());
  let suppression = Suppression {
    patient_id:   patient,
    key:          row.key(),
    clinician_id: Uuid::new_v4(),
  };

  assert_eq!(
    s.delete_curated(row.entry_id, 7, suppression.clone()).await.unwrap(),
    WriteOutcome::Stale,
  );
  assert!(s.suppressed_keys(patient).await.unwrap().is_empty());

  applied(s.delete_curated(row.entry_id, 0, suppression.clone()).await.unwrap());
  assert!(s.get_curated(row.entry_id).await.unwrap().is_none());
  assert!(s.suppressed_keys(patient).await.unwrap().contains(&row.key()));

  assert_eq!(
    s.delete_curated(row.entry_id, 0, suppression).await.unwrap(),
    WriteOutcome::Missing,
  );
}

#[tokio::test]
async fn suppress_key_unions_instead_of_replacing() {
  let s = store().await;
  let patient = s.add_patient().await.unwrap();
  let by = Uuid::new_v4();
  let a = EntryKey::new("J45", EntryType::Medical);
  let b = EntryKey::new("AST-BRO", EntryType::Allergy);

  let (first, second) = tokio::join!(
    s.suppress_key(Suppression { patient_id: patient, key: a.clone(), clinician_id: by }),
    s.suppress_key(Suppression { patient_id: patient, key: b.clone(), clinician_id: by }),
  );
  assert!(first.unwrap());
  assert!(second.unwrap());
  assert!(
    !s.suppress_key(Suppression { patient_id: patient, key: a.clone(), clinician_id: by })
      .await
      .unwrap()
  );

  let set = s.suppressed_keys(patient).await.unwrap();
  assert_eq!(set.len(), 2);
  assert!(set.contains(&a) && set.contains(&b));
}

// ─── Documents and relationships ─────────────────────────────────────────────

#[tokio::test]
async fn documents_round_trip_and_replace() {
  let s = store().await;
  let patient = s.add_patient().await.unwrap();
  assert!(s.history_document(patient).await.unwrap().is_none());

  s.put_document(patient, &json!({ "history": {} })).await.unwrap();
  let doc = json!({ "history": { "medical": [ { "label": "Asthme" } ] } });
  s.put_document(patient, &doc).await.unwrap();
  assert_eq!(s.history_document(patient).await.unwrap(), Some(doc));

  let err = s.put_document(Uuid::new_v4(), &json!({})).await.unwrap_err();
  assert!(matches!(err, crate::Error::PatientNotFound(_)));
}

#[tokio::test]
async fn relationships_can_be_granted_and_ended() {
  let s = store().await;
  let patient = s.add_patient().await.unwrap();
  let doctor = Uuid::new_v4();

  assert!(!s.has_active_relationship(doctor, patient).await.unwrap());
  s.grant_relationship(doctor, patient).await.unwrap();
  assert!(s.has_active_relationship(doctor, patient).await.unwrap());

  assert!(s.end_relationship(doctor, patient).await.unwrap());
  assert!(!s.has_active_relationship(doctor, patient).await.unwrap());
  assert!(!s.end_relationship(doctor, patient).await.unwrap());

  s.grant_relationship(doctor, patient).await.unwrap();
  assert!(s.has_active_relationship(doctor, patient).await.unwrap());
}

// ─── Workflow: reads ─────────────────────────────────────────────────────────

#[tokio::test]
async fn history_merges_curated_and_embedded() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  s.put_document(patient, &json!({ "history": {
    "medical": [ { "code": "J45", "label": "Asthme (ancien)" }, { "label": "Migraine" } ],
    "allergy": { "description": "Allergies", "entries": [ { "label": "Pénicilline" } ] },
  } }))
  .await
  .unwrap();

  let svc = service(&s);
  let added = svc
    .add(&doctor, patient, candidate("J45", "Asthme", EntryType::Medical))
    .await
    .unwrap_err();
  // The embedded J45 is visible, so adding it again is a duplicate.
  assert!(matches!(added, CoreError::DuplicateEntry(_)));

  applied(s.insert_curated(new_row(patient, "J45", DefinedBy::Doctor)).await.unwrap());
  let view = svc.history(&doctor, patient).await.unwrap();

  assert_eq!(view.medical.len(), 2);
  assert_eq!(view.medical[0].origin, Origin::Curated);
  assert_eq!(view.medical[0].code, "J45");
  assert_eq!(view.medical[1].code, "MIG");
  assert_eq!(view.allergy[0].code, "PÉN");
  assert!(view.warnings.is_empty());
}

#[tokio::test]
async fn history_requires_an_active_relationship() {
  let s = store().await;
  let (patient, _) = patient_in_care(&s).await;

  let err = service(&s).history(&clinician(), patient).await.unwrap_err();
  assert!(matches!(err, CoreError::NotAuthorized { .. }));
}

// ─── Workflow: add ───────────────────────────────────────────────────────────

#[tokio::test]
async fn add_creates_doctor_defined_row() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;

  let mut input = candidate(" E11 ", "Diabète de type 2", EntryType::Medical);
  input.note = Some("  ".into());
  let entry = service(&s).add(&doctor, patient, input).await.unwrap();

  assert_eq!(entry.code, "E11");
  assert_eq!(entry.defined_by, DefinedBy::Doctor);
  assert_eq!(entry.doctor_id, Some(doctor.clinician_id));
  assert!(entry.note.is_none());
  assert!(!entry.validated_by_doctor);
  assert_eq!(entry.revision, Some(0));
}

#[tokio::test]
async fn add_rejects_blank_fields_and_duplicates() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  let svc = service(&s);

  let err = svc
    .add(&doctor, patient, candidate("", "Asthme", EntryType::Medical))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::ValidationFailure(_)));

  svc.add(&doctor, patient, candidate("J45", "Asthme", EntryType::Medical)).await.unwrap();
  let err = svc
    .add(&doctor, patient, candidate("J45", "Asthme", EntryType::Medical))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::DuplicateEntry(ref k) if k.to_string() == "J45-medical"));

  // Same code, different section, is a different key.
  svc.add(&doctor, patient, candidate("J45", "Asthme", EntryType::Treatment)).await.unwrap();
}

#[tokio::test]
async fn add_collides_with_visible_embedded_entries_only() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  let svc = service(&s);
  s.put_document(patient, &json!({ "history": { "medical": [
    { "code": "J45", "label": "Asthme (déclaré)" },
  ] } }))
  .await
  .unwrap();

  let err = svc
    .add(&doctor, patient, candidate("J45", "Asthme", EntryType::Medical))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::DuplicateEntry(ref k) if k.to_string() == "J45-medical"));
  assert!(s.list_curated(patient).await.unwrap().is_empty());

  let removal = svc
    .remove(&doctor, patient, "emb-medical-0".parse().unwrap(), None)
    .await
    .unwrap();
  assert_eq!(removal.origin, Origin::Embedded);

  let entry = svc
    .add(&doctor, patient, candidate("J45", "Asthme", EntryType::Medical))
    .await
    .unwrap();
  assert_eq!(entry.origin, Origin::Curated);

  let view = svc.history(&doctor, patient).await.unwrap();
  assert_eq!(view.medical.len(), 1);
  assert_eq!(view.medical[0].id, entry.id);
}

#[tokio::test]
async fn add_for_unauthorized_clinician_touches_nothing() {
  let s = store().await;
  let (patient, _) = patient_in_care(&s).await;

  let err = service(&s)
    .add(&clinician(), patient, candidate("J45", "Asthme", EntryType::Medical))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::NotAuthorized { .. }));
  assert!(s.list_curated(patient).await.unwrap().is_empty());
}

// ─── Workflow: validate / annotate ───────────────────────────────────────────

#[tokio::test]
async fn validate_is_idempotent() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  let row = applied(s.insert_curated(new_row(patient, "J45", DefinedBy::Patient)).await.unwrap());
  let svc = service(&s);

  let first = svc
    .validate(&doctor, patient, EntryId::Curated(row.entry_id), Some(0))
    .await
    .unwrap();
  assert!(matches!(first, ValidateOutcome::Validated(_)));
  assert!(first.entry().validated_by_doctor);

  let again = svc
    .validate(&doctor, patient, EntryId::Curated(row.entry_id), None)
    .await
    .unwrap();
  assert!(matches!(again, ValidateOutcome::AlreadyValidated(_)));
  assert_eq!(again.entry().revision, Some(1));
}

#[tokio::test]
async fn validate_rejects_doctor_defined_and_embedded_entries() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  let row = applied(s.insert_curated(new_row(patient, "J45", DefinedBy::Doctor)).await.unwrap());
  let svc = service(&s);

  let err = svc
    .validate(&doctor, patient, EntryId::Curated(row.entry_id), None)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidTransition(_)));

  let embedded = EntryId::Embedded { section: EntryType::Medical, index: 0 };
  let err = svc.validate(&doctor, patient, embedded, None).await.unwrap_err();
  assert!(matches!(err, CoreError::NotCurated(_)));
}

#[tokio::test]
async fn stale_expected_revision_is_a_concurrent_modification() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  let row = applied(s.insert_curated(new_row(patient, "J45", DefinedBy::Patient)).await.unwrap());
  let id = EntryId::Curated(row.entry_id);
  let svc = service(&s);

  svc.annotate(&doctor, patient, id, Some("first".into()), Some(0)).await.unwrap();
  let err = svc
    .annotate(&doctor, patient, id, Some("second".into()), Some(0))
    .await
    .unwrap_err();
  assert!(err.is_retryable());

  let err = svc.validate(&doctor, patient, id, Some(0)).await.unwrap_err();
  assert!(matches!(err, CoreError::ConcurrentModification(_)));
}

#[tokio::test]
async fn annotate_sets_and_clears_note() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  let row = applied(s.insert_curated(new_row(patient, "J45", DefinedBy::Doctor)).await.unwrap());
  let id = EntryId::Curated(row.entry_id);
  let svc = service(&s);

  let entry = svc.annotate(&doctor, patient, id, Some(" depuis 2010 ".into()), None).await.unwrap();
  assert_eq!(entry.note.as_deref(), Some("depuis 2010"));

  let entry = svc.annotate(&doctor, patient, id, Some(String::new()), None).await.unwrap();
  assert!(entry.note.is_none());
  assert_eq!(entry.revision, Some(2));
}

#[tokio::test]
async fn entries_of_other_patients_are_not_found() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  let other = s.add_patient().await.unwrap();
  let row = applied(s.insert_curated(new_row(other, "J45", DefinedBy::Patient)).await.unwrap());

  let err = service(&s)
    .validate(&doctor, patient, EntryId::Curated(row.entry_id), None)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::EntryNotFound(_)));
}

// ─── Workflow: promote ───────────────────────────────────────────────────────

#[tokio::test]
async fn promote_then_validate_embedded_entry() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  s.put_document(patient, &json!({ "history": { "medical": [
    { "label": "Asthme bronchique chronique", "note": "enfance" },
  ] } }))
  .await
  .unwrap();
  let svc = service(&s);
  let embedded = EntryId::Embedded { section: EntryType::Medical, index: 0 };

  let promoted = svc.promote(&doctor, patient, embedded).await.unwrap();
  assert_eq!(promoted.origin, Origin::Curated);
  assert_eq!(promoted.code, "AST-BRO-CHR");
  assert_eq!(promoted.defined_by, DefinedBy::Patient);
  assert_eq!(promoted.note.as_deref(), Some("enfance"));

  // The embedded copy is now shadowed by the curated row.
  let view = svc.history(&doctor, patient).await.unwrap();
  assert_eq!(view.medical.len(), 1);
  assert_eq!(view.medical[0].id, promoted.id);

  let err = svc.promote(&doctor, patient, embedded).await.unwrap_err();
  assert!(matches!(err, CoreError::DuplicateEntry(_)));

  let outcome = svc.validate(&doctor, patient, promoted.id, None).await.unwrap();
  assert!(outcome.entry().validated_by_doctor);
}

// ─── Workflow: remove ────────────────────────────────────────────────────────

#[tokio::test]
async fn removed_curated_key_does_not_resurface_from_document() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  s.put_document(patient, &json!({ "history": { "medical": [
    { "code": "J45", "label": "Asthme (ancien)" },
  ] } }))
  .await
  .unwrap();
  applied(s.insert_curated(new_row(patient, "J45", DefinedBy::Doctor)).await.unwrap());
  let svc = service(&s);

  let view = svc.history(&doctor, patient).await.unwrap();
  let curated = view.medical[0].clone();
  assert_eq!(curated.origin, Origin::Curated);

  let removal = svc.remove(&doctor, patient, curated.id, curated.revision).await.unwrap();
  assert_eq!(removal.key, EntryKey::new("J45", EntryType::Medical));
  assert_eq!(removal.origin, Origin::Curated);

  for _ in 0..2 {
    let view = svc.history(&doctor, patient).await.unwrap();
    assert!(view.medical.iter().all(|e| e.code != "J45"), "{view:?}");
  }
}

#[tokio::test]
async fn removing_embedded_entry_only_suppresses() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  let document = json!({ "history": { "surgical": [ { "label": "Appendicectomie" } ] } });
  s.put_document(patient, &document).await.unwrap();
  let svc = service(&s);
  let id = EntryId::Embedded { section: EntryType::Surgical, index: 0 };

  let removal = svc.remove(&doctor, patient, id, None).await.unwrap();
  assert_eq!(removal.origin, Origin::Embedded);
  assert!(!removal.already_suppressed);

  // The document itself is untouched.
  assert_eq!(s.history_document(patient).await.unwrap(), Some(document));
  assert!(svc.history(&doctor, patient).await.unwrap().surgical.is_empty());

  let again = svc.remove(&doctor, patient, id, None).await.unwrap();
  assert!(again.already_suppressed);

  let err = svc
    .remove(&doctor, patient, EntryId::Embedded { section: EntryType::Surgical, index: 9 }, None)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::EntryNotFound(_)));
}

#[tokio::test]
async fn remove_after_relationship_ends_is_rejected() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  let row = applied(s.insert_curated(new_row(patient, "J45", DefinedBy::Doctor)).await.unwrap());
  s.end_relationship(doctor.clinician_id, patient).await.unwrap();

  let err = service(&s)
    .remove(&doctor, patient, EntryId::Curated(row.entry_id), None)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::NotAuthorized { .. }));
  assert!(s.get_curated(row.entry_id).await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_removals_of_different_entries_both_persist() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  let other_doctor = clinician();
  s.grant_relationship(other_doctor.clinician_id, patient).await.unwrap();
  let a = applied(s.insert_curated(new_row(patient, "A01", DefinedBy::Doctor)).await.unwrap());
  let b = applied(s.insert_curated(new_row(patient, "B02", DefinedBy::Doctor)).await.unwrap());
  let svc = service(&s);

  let (ra, rb) = tokio::join!(
    svc.remove(&doctor, patient, EntryId::Curated(a.entry_id), None),
    svc.remove(&other_doctor, patient, EntryId::Curated(b.entry_id), None),
  );
  ra.unwrap();
  rb.unwrap();

  let set = s.suppressed_keys(patient).await.unwrap();
  assert!(set.contains(&a.key()) && set.contains(&b.key()));
}

#[tokio::test]
async fn concurrent_removals_of_the_same_entry_succeed_once() {
  let s = store().await;
  let (patient, doctor) = patient_in_care(&s).await;
  let row = applied(s.insert_curated(new_row(patient, "J45", DefinedBy::Doctor)).await.unwrap());
  let svc = service(&s);
  let id = EntryId::Curated(row.entry_id);

  let (first, second) = tokio::join!(
    svc.remove(&doctor, patient, id, None),
    svc.remove(&doctor, patient, id, None),
  );
  let successes = [first.is_ok(), second.is_ok()].into_iter().filter(|ok| *ok).count();
  assert_eq!(successes, 1);
  for err in [first, second].into_iter().filter_map(Result::err) {
    assert!(matches!(
      err,
      CoreError::EntryNotFound(_) | CoreError::ConcurrentModification(_)
    ));
  }
}
