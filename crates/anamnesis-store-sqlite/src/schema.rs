//! SQL schema for the Anamnesis SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS patients (
    patient_id  TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL
);

-- One JSON document per patient, written by the document editor.
CREATE TABLE IF NOT EXISTS patient_documents (
    patient_id    TEXT PRIMARY KEY REFERENCES patients(patient_id),
    document_json TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS care_relationships (
    clinician_id TEXT NOT NULL,
    patient_id   TEXT NOT NULL REFERENCES patients(patient_id),
    status       TEXT NOT NULL,   -- 'active' | 'ended'
    started_at   TEXT NOT NULL,
    ended_at     TEXT,
    PRIMARY KEY (clinician_id, patient_id)
);

-- Curated rows. Every UPDATE/DELETE is conditional on `revision`.
CREATE TABLE IF NOT EXISTS antecedents (
    entry_id            TEXT PRIMARY KEY,
    patient_id          TEXT NOT NULL REFERENCES patients(patient_id),
    code                TEXT NOT NULL,
    system              TEXT NOT NULL,
    label               TEXT NOT NULL,
    entry_type          TEXT NOT NULL,   -- 'medical' | 'surgical' | 'allergy' | 'treatment'
    defined_by          TEXT NOT NULL,   -- 'patient' | 'doctor'
    validated_by_doctor INTEGER NOT NULL DEFAULT 0,
    note                TEXT,
    created_at          TEXT NOT NULL,   -- RFC 3339 UTC, fixed width; server-assigned
    doctor_id           TEXT,
    revision            INTEGER NOT NULL DEFAULT 0,
    UNIQUE (patient_id, code, entry_type),
    CHECK  (validated_by_doctor = 0 OR defined_by = 'patient')
);

-- Persisted exclusion set. Rows are only ever inserted, never replaced.
CREATE TABLE IF NOT EXISTS suppressed_keys (
    patient_id   TEXT NOT NULL REFERENCES patients(patient_id),
    entry_key    TEXT NOT NULL,   -- '<code>-<type>'
    clinician_id TEXT NOT NULL,
    recorded_at  TEXT NOT NULL,
    PRIMARY KEY (patient_id, entry_key)
);

CREATE INDEX IF NOT EXISTS antecedents_patient_idx ON antecedents(patient_id, created_at);

PRAGMA user_version = 1;
";
