//! [`SqliteStore`]: the SQLite implementation of the Anamnesis store traits.

use std::path::Path;

use anamnesis_core::{
  entry::{CuratedEntry, NewCuratedEntry},
  exclusion::ExclusionSet,
  store::{
    CuratedChange, DocumentStore, RecordStore, RelationshipStore, Suppression,
    WriteOutcome,
  },
};
use chrono::{SubsecRound, Utc};
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawCurated, decode_key, encode_defined_by, encode_dt, encode_entry_type,
    encode_key, encode_uuid,
  },
  schema::SCHEMA,
};

const SELECT_CURATED: &str = "SELECT entry_id, patient_id, code, system, label, entry_type,
        defined_by, validated_by_doctor, note, created_at, doctor_id, revision
   FROM antecedents";

fn read_curated(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCurated> {
  Ok(RawCurated {
    entry_id:            row.get(0)?,
    patient_id:          row.get(1)?,
    code:                row.get(2)?,
    system:              row.get(3)?,
    label:               row.get(4)?,
    entry_type:          row.get(5)?,
    defined_by:          row.get(6)?,
    validated_by_doctor: row.get(7)?,
    note:                row.get(8)?,
    created_at:          row.get(9)?,
    doctor_id:           row.get(10)?,
    revision:            row.get(11)?,
  })
}

fn entry_exists(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM antecedents WHERE entry_id = ?1",
        rusqlite::params![id],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

/// Classify a failed INSERT: uniqueness → `Conflict`, foreign key → `Missing`.
fn constraint_outcome<T>(err: &rusqlite::Error) -> Option<WriteOutcome<T>> {
  let rusqlite::Error::SqliteFailure(e, _) = err else {
    return None;
  };
  match e.extended_code {
    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Some(WriteOutcome::Conflict),
    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(WriteOutcome::Missing),
    _ => None,
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An antecedent store backed by a single SQLite file.
///
/// The inner connection is reference-counted, so cloning is cheap.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Provisioning ──────────────────────────────────────────────────────
  //
  // Patients, documents and relationships are owned by other parts of the
  // portal; these helpers exist for provisioning and tests.

  /// Register a patient with a fresh UUID.
  pub async fn add_patient(&self) -> Result<Uuid> {
    let id = Uuid::new_v4();
    self.add_patient_with_id(id).await?;
    Ok(id)
  }

  /// Register a patient with a caller-supplied UUID. Idempotent.
  pub async fn add_patient_with_id(&self, patient_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(patient_id);
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO patients (patient_id, created_at) VALUES (?1, ?2)",
          rusqlite::params![id_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Replace the patient's document.
  pub async fn put_document(&self, patient_id: Uuid, document: &serde_json::Value) -> Result<()> {
    let id_str  = encode_uuid(patient_id);
    let doc_str = serde_json::to_string(document)?;
    let at_str  = encode_dt(Utc::now());

    let written = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO patient_documents (patient_id, document_json, updated_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (patient_id) DO UPDATE
             SET document_json = excluded.document_json,
                 updated_at    = excluded.updated_at",
          rusqlite::params![id_str, doc_str, at_str],
        );
        match result {
          Ok(_) => Ok(true),
          Err(e) if constraint_outcome::<()>(&e) == Some(WriteOutcome::Missing) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if written { Ok(()) } else { Err(Error::PatientNotFound(patient_id)) }
  }

  /// Open (or reopen) an active care relationship.
  pub async fn grant_relationship(&self, clinician_id: Uuid, patient_id: Uuid) -> Result<()> {
    let clinician_str = encode_uuid(clinician_id);
    let patient_str   = encode_uuid(patient_id);
    let at_str        = encode_dt(Utc::now());

    let written = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO care_relationships (clinician_id, patient_id, status, started_at)
           VALUES (?1, ?2, 'active', ?3)
           ON CONFLICT (clinician_id, patient_id) DO UPDATE
             SET status = 'active', started_at = excluded.started_at, ended_at = NULL",
          rusqlite::params![clinician_str, patient_str, at_str],
        );
        match result {
          Ok(_) => Ok(true),
          Err(e) if constraint_outcome::<()>(&e) == Some(WriteOutcome::Missing) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if written { Ok(()) } else { Err(Error::PatientNotFound(patient_id)) }
  }

  /// End a care relationship. Returns `false` if none was active.
  pub async fn end_relationship(&self, clinician_id: Uuid, patient_id: Uuid) -> Result<bool> {
    let clinician_str = encode_uuid(clinician_id);
    let patient_str   = encode_uuid(patient_id);
    let at_str        = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE care_relationships SET status = 'ended', ended_at = ?3
           WHERE clinician_id = ?1 AND patient_id = ?2 AND status = 'active'",
          rusqlite::params![clinician_str, patient_str, at_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  async fn patient_exists(&self, patient_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(patient_id);

    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM patients WHERE patient_id = ?1",
              rusqlite::params![id_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(exists)
  }

  async fn list_curated(&self, patient_id: Uuid) -> Result<Vec<CuratedEntry>> {
    let id_str = encode_uuid(patient_id);

    let raws: Vec<RawCurated> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "{SELECT_CURATED} WHERE patient_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], read_curated)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCurated::into_curated).collect()
  }

  async fn get_curated(&self, entry_id: Uuid) -> Result<Option<CuratedEntry>> {
    let id_str = encode_uuid(entry_id);

    let raw: Option<RawCurated> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("{SELECT_CURATED} WHERE entry_id = ?1"),
              rusqlite::params![id_str],
              read_curated,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCurated::into_curated).transpose()
  }

  async fn insert_curated(&self, input: NewCuratedEntry) -> Result<WriteOutcome<CuratedEntry>> {
    let entry = CuratedEntry {
      entry_id:            Uuid::new_v4(),
      patient_id:          input.patient_id,
      code:                input.code,
      system:              input.system,
      label:               input.label,
      entry_type:          input.entry_type,
      defined_by:          input.defined_by,
      validated_by_doctor: false,
      note:                input.note,
      created_at:          Utc::now().trunc_subsecs(6),
      doctor_id:           input.doctor_id,
      revision:            0,
    };

    let entry_id_str   = encode_uuid(entry.entry_id);
    let patient_id_str = encode_uuid(entry.patient_id);
    let code           = entry.code.clone();
    let system         = entry.system.clone();
    let label          = entry.label.clone();
    let entry_type_str = encode_entry_type(entry.entry_type);
    let defined_by_str = encode_defined_by(entry.defined_by);
    let note           = entry.note.clone();
    let created_at_str = encode_dt(entry.created_at);
    let doctor_id_str  = entry.doctor_id.map(encode_uuid);

    let outcome = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO antecedents (
             entry_id, patient_id, code, system, label, entry_type,
             defined_by, validated_by_doctor, note, created_at, doctor_id, revision
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?10, 0)",
          rusqlite::params![
            entry_id_str,
            patient_id_str,
            code,
            system,
            label,
            entry_type_str,
            defined_by_str,
            note,
            created_at_str,
            doctor_id_str,
          ],
        );
        match result {
          Ok(_) => Ok(WriteOutcome::Applied(())),
          Err(e) => match constraint_outcome(&e) {
            Some(outcome) => Ok(outcome),
            None => Err(e.into()),
          },
        }
      })
      .await?;

    debug!(entry_id = %entry.entry_id, ?outcome, "insert antecedent");
    outcome.try_map(|()| Ok(entry))
  }

  async fn update_curated(
    &self,
    entry_id:          Uuid,
    expected_revision: u32,
    change:            CuratedChange,
  ) -> Result<WriteOutcome<CuratedEntry>> {
    let id_str = encode_uuid(entry_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = match change {
          CuratedChange::Validate { doctor_id } => tx.execute(
            "UPDATE antecedents
                SET validated_by_doctor = 1, doctor_id = ?3, revision = revision + 1
              WHERE entry_id = ?1 AND revision = ?2",
            rusqlite::params![id_str, expected_revision, encode_uuid(doctor_id)],
          )?,
          CuratedChange::Annotate { note } => tx.execute(
            "UPDATE antecedents
                SET note = ?3, revision = revision + 1
              WHERE entry_id = ?1 AND revision = ?2",
            rusqlite::params![id_str, expected_revision, note],
          )?,
        };

        if changed == 0 {
          return Ok(if entry_exists(&tx, &id_str)? {
            WriteOutcome::Stale
          } else {
            WriteOutcome::Missing
          });
        }

        let raw = tx.query_row(
          &format!("{SELECT_CURATED} WHERE entry_id = ?1"),
          rusqlite::params![id_str],
          read_curated,
        )?;
        tx.commit()?;
        Ok(WriteOutcome::Applied(raw))
      })
      .await?;

    outcome.try_map(RawCurated::into_curated)
  }

  async fn delete_curated(
    &self,
    entry_id:          Uuid,
    expected_revision: u32,
    suppression:       Suppression,
  ) -> Result<WriteOutcome<()>> {
    let id_str        = encode_uuid(entry_id);
    let patient_str   = encode_uuid(suppression.patient_id);
    let key_str       = encode_key(&suppression.key);
    let clinician_str = encode_uuid(suppression.clinician_id);
    let at_str        = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let deleted = tx.execute(
          "DELETE FROM antecedents WHERE entry_id = ?1 AND revision = ?2",
          rusqlite::params![id_str, expected_revision],
        )?;

        if deleted == 0 {
          return Ok(if entry_exists(&tx, &id_str)? {
            WriteOutcome::Stale
          } else {
            WriteOutcome::Missing
          });
        }

        tx.execute(
          "INSERT OR IGNORE INTO suppressed_keys (patient_id, entry_key, clinician_id, recorded_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![patient_str, key_str, clinician_str, at_str],
        )?;
        tx.commit()?;
        Ok(WriteOutcome::Applied(()))
      })
      .await?;

    debug!(%entry_id, ?outcome, "delete antecedent");
    Ok(outcome)
  }

  async fn suppressed_keys(&self, patient_id: Uuid) -> Result<ExclusionSet> {
    let id_str = encode_uuid(patient_id);

    let keys: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT entry_key FROM suppressed_keys WHERE patient_id = ?1")?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    keys.iter().map(|k| decode_key(k)).collect()
  }

  async fn suppress_key(&self, suppression: Suppression) -> Result<bool> {
    let patient_str   = encode_uuid(suppression.patient_id);
    let key_str       = encode_key(&suppression.key);
    let clinician_str = encode_uuid(suppression.clinician_id);
    let at_str        = encode_dt(Utc::now());

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO suppressed_keys (patient_id, entry_key, clinician_id, recorded_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![patient_str, key_str, clinician_str, at_str],
        )?)
      })
      .await?;
    Ok(inserted > 0)
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteStore {
  type Error = Error;

  async fn history_document(&self, patient_id: Uuid) -> Result<Option<serde_json::Value>> {
    let id_str = encode_uuid(patient_id);

    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT document_json FROM patient_documents WHERE patient_id = ?1",
              rusqlite::params![id_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    // An unparseable document is treated as absent rather than fatal.
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
  }
}

// ─── RelationshipStore impl ──────────────────────────────────────────────────

impl RelationshipStore for SqliteStore {
  type Error = Error;

  async fn has_active_relationship(&self, clinician_id: Uuid, patient_id: Uuid) -> Result<bool> {
    let clinician_str = encode_uuid(clinician_id);
    let patient_str   = encode_uuid(patient_id);

    let active = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM care_relationships
                WHERE clinician_id = ?1 AND patient_id = ?2 AND status = 'active'",
              rusqlite::params![clinician_str, patient_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(active)
  }
}
