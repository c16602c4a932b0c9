//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings so they sort
//! lexically. Enumerations are stored as their lowercase names. UUIDs are
//! stored as hyphenated lowercase strings.

use anamnesis_core::entry::{CuratedEntry, DefinedBy, EntryKey, EntryType};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enumerations ────────────────────────────────────────────────────────────

pub fn encode_entry_type(t: EntryType) -> &'static str {
  match t {
    EntryType::Medical => "medical",
    EntryType::Surgical => "surgical",
    EntryType::Allergy => "allergy",
    EntryType::Treatment => "treatment",
  }
}

pub fn decode_entry_type(s: &str) -> Result<EntryType> {
  s.parse().map_err(|_| Error::UnknownVariant { kind: "entry type", value: s.to_owned() })
}

pub fn encode_defined_by(d: DefinedBy) -> &'static str {
  match d {
    DefinedBy::Patient => "patient",
    DefinedBy::Doctor => "doctor",
  }
}

pub fn decode_defined_by(s: &str) -> Result<DefinedBy> {
  s.parse().map_err(|_| Error::UnknownVariant { kind: "defined_by", value: s.to_owned() })
}

// ─── EntryKey ────────────────────────────────────────────────────────────────

pub fn encode_key(key: &EntryKey) -> String { key.to_string() }

pub fn decode_key(s: &str) -> Result<EntryKey> { Ok(s.parse()?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `antecedents` row.
pub struct RawCurated {
  pub entry_id:            String,
  pub patient_id:          String,
  pub code:                String,
  pub system:              String,
  pub label:               String,
  pub entry_type:          String,
  pub defined_by:          String,
  pub validated_by_doctor: bool,
  pub note:                Option<String>,
  pub created_at:          String,
  pub doctor_id:           Option<String>,
  pub revision:            u32,
}

impl RawCurated {
  pub fn into_curated(self) -> Result<CuratedEntry> {
    Ok(CuratedEntry {
      entry_id:            decode_uuid(&self.entry_id)?,
      patient_id:          decode_uuid(&self.patient_id)?,
      code:                self.code,
      system:              self.system,
      label:               self.label,
      entry_type:          decode_entry_type(&self.entry_type)?,
      defined_by:          decode_defined_by(&self.defined_by)?,
      validated_by_doctor: self.validated_by_doctor,
      note:                self.note,
      created_at:          decode_dt(&self.created_at)?,
      doctor_id:           self.doctor_id.as_deref().map(decode_uuid).transpose()?,
      revision:            self.revision,
    })
  }
}
