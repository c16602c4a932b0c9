//! Antecedent entries: the unit of a patient's health history.
//!
//! Entries come from two places: curated rows owned by the clinician
//! workflow, and free-form items embedded in the patient's document. Both
//! are carried as a [`SourcedEntry`] and converted to the unified
//! [`AntecedentEntry`] view in exactly one place.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

/// `system` reported for embedded entries that name no vocabulary.
pub const FREE_TEXT_SYSTEM: &str = "free-text";

// ─── Enumerations ────────────────────────────────────────────────────────────

/// The history section an entry belongs to.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryType {
  Medical,
  Surgical,
  Allergy,
  Treatment,
}

impl EntryType {
  /// Sections that exist inside the patient document. Treatments are only
  /// ever curated.
  pub const DOCUMENT_SECTIONS: [EntryType; 3] =
    [EntryType::Medical, EntryType::Surgical, EntryType::Allergy];
}

/// Who declared the entry.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DefinedBy {
  #[default]
  Patient,
  Doctor,
}

/// Where the entry is stored.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Origin {
  Curated,
  Embedded,
}

// ─── EntryKey ────────────────────────────────────────────────────────────────

/// The `(code, type)` identity under which entries are deduplicated and
/// suppressed. Rendered as `<code>-<type>`, e.g. `J45-medical`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryKey {
  pub code:       String,
  pub entry_type: EntryType,
}

impl EntryKey {
  pub fn new(code: impl Into<String>, entry_type: EntryType) -> Self {
    Self { code: code.into(), entry_type }
  }
}

impl fmt::Display for EntryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.code, self.entry_type)
  }
}

impl FromStr for EntryKey {
  type Err = Error;

  // Codes may themselves contain `-` (surrogates do), so split on the last one.
  fn from_str(s: &str) -> Result<Self> {
    let (code, ty) = s
      .rsplit_once('-')
      .filter(|(code, _)| !code.is_empty())
      .ok_or_else(|| Error::ValidationFailure(format!("malformed entry key: {s:?}")))?;
    let entry_type = ty
      .parse()
      .map_err(|_| Error::ValidationFailure(format!("unknown entry type in key: {s:?}")))?;
    Ok(Self::new(code, entry_type))
  }
}

impl TryFrom<String> for EntryKey {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<EntryKey> for String {
  fn from(k: EntryKey) -> Self { k.to_string() }
}

// ─── EntryId ─────────────────────────────────────────────────────────────────

const EMBEDDED_ID_PREFIX: &str = "emb-";

/// Addressable identifier for an entry in the merged view.
///
/// Embedded entries have no identifier of their own; theirs is derived from
/// the section and the raw positional index, so it is stable as long as the
/// document is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntryId {
  Curated(Uuid),
  Embedded { section: EntryType, index: usize },
}

impl EntryId {
  pub fn origin(&self) -> Origin {
    match self {
      Self::Curated(_) => Origin::Curated,
      Self::Embedded { .. } => Origin::Embedded,
    }
  }
}

impl fmt::Display for EntryId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Curated(id) => write!(f, "{}", id.hyphenated()),
      Self::Embedded { section, index } => {
        write!(f, "{EMBEDDED_ID_PREFIX}{section}-{index}")
      }
    }
  }
}

impl FromStr for EntryId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let malformed = || Error::ValidationFailure(format!("malformed entry id: {s:?}"));

    if let Some(rest) = s.strip_prefix(EMBEDDED_ID_PREFIX) {
      let (section, index) = rest.split_once('-').ok_or_else(malformed)?;
      let section: EntryType = section.parse().map_err(|_| malformed())?;
      if !EntryType::DOCUMENT_SECTIONS.contains(&section) {
        return Err(malformed());
      }
      let index = index.parse().map_err(|_| malformed())?;
      return Ok(Self::Embedded { section, index });
    }

    Uuid::parse_str(s).map(Self::Curated).map_err(|_| malformed())
  }
}

impl TryFrom<String> for EntryId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<EntryId> for String {
  fn from(id: EntryId) -> Self { id.to_string() }
}

// ─── Curated ─────────────────────────────────────────────────────────────────

/// A row of the relational antecedents table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedEntry {
  pub entry_id:            Uuid,
  pub patient_id:          Uuid,
  pub code:                String,
  pub system:              String,
  pub label:               String,
  pub entry_type:          EntryType,
  pub defined_by:          DefinedBy,
  /// Only meaningful when `defined_by` is [`DefinedBy::Patient`].
  pub validated_by_doctor: bool,
  pub note:                Option<String>,
  /// Server-assigned; never changes after creation.
  pub created_at:          DateTime<Utc>,
  pub doctor_id:           Option<Uuid>,
  /// Incremented by the store on every mutation.
  pub revision:            u32,
}

impl CuratedEntry {
  pub fn key(&self) -> EntryKey { EntryKey::new(&self.code, self.entry_type) }
}

/// Input to [`crate::store::RecordStore::insert_curated`]. Identifier,
/// timestamp and revision are assigned by the store, and a new row is never
/// validated.
#[derive(Debug, Clone)]
pub struct NewCuratedEntry {
  pub patient_id: Uuid,
  pub code:       String,
  pub system:     String,
  pub label:      String,
  pub entry_type: EntryType,
  pub defined_by: DefinedBy,
  pub note:       Option<String>,
  pub doctor_id:  Option<Uuid>,
}

// ─── Embedded ────────────────────────────────────────────────────────────────

/// An item read out of a history section of the patient document.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedEntry {
  pub patient_id:  Uuid,
  pub section:     EntryType,
  /// Raw position inside the section, blanks and malformed items included.
  pub index:       usize,
  pub code:        String,
  /// `true` when `code` is a surrogate built from the label.
  pub synthesized: bool,
  pub system:      Option<String>,
  pub label:       String,
  pub note:        Option<String>,
  pub created_at:  Option<DateTime<Utc>>,
}

impl EmbeddedEntry {
  pub fn id(&self) -> EntryId {
    EntryId::Embedded { section: self.section, index: self.index }
  }

  pub fn key(&self) -> EntryKey { EntryKey::new(&self.code, self.section) }
}

// ─── Unified view ────────────────────────────────────────────────────────────

/// An entry from either source, before conversion to the unified view.
#[derive(Debug, Clone)]
pub enum SourcedEntry {
  Curated(CuratedEntry),
  Embedded(EmbeddedEntry),
}

impl SourcedEntry {
  pub fn key(&self) -> EntryKey {
    match self {
      Self::Curated(e) => e.key(),
      Self::Embedded(e) => e.key(),
    }
  }

  /// The single conversion from either storage shape to [`AntecedentEntry`].
  pub fn into_view(self) -> AntecedentEntry {
    match self {
      Self::Curated(e) => AntecedentEntry {
        id:                  EntryId::Curated(e.entry_id),
        code:                e.code,
        system:              e.system,
        label:               e.label,
        entry_type:          e.entry_type,
        defined_by:          e.defined_by,
        validated_by_doctor: e.defined_by == DefinedBy::Patient && e.validated_by_doctor,
        note:                e.note,
        created_at:          Some(e.created_at),
        origin:              Origin::Curated,
        patient_id:          e.patient_id,
        doctor_id:           e.doctor_id,
        revision:            Some(e.revision),
      },
      Self::Embedded(e) => AntecedentEntry {
        id:                  e.id(),
        code:                e.code,
        system:              e.system.unwrap_or_else(|| FREE_TEXT_SYSTEM.to_owned()),
        label:               e.label,
        entry_type:          e.section,
        defined_by:          DefinedBy::Patient,
        validated_by_doctor: false,
        note:                e.note,
        created_at:          e.created_at,
        origin:              Origin::Embedded,
        patient_id:          e.patient_id,
        doctor_id:           None,
        revision:            None,
      },
    }
  }
}

impl From<CuratedEntry> for AntecedentEntry {
  fn from(e: CuratedEntry) -> Self { SourcedEntry::Curated(e).into_view() }
}

impl From<EmbeddedEntry> for AntecedentEntry {
  fn from(e: EmbeddedEntry) -> Self { SourcedEntry::Embedded(e).into_view() }
}

/// One entry of the merged history view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntecedentEntry {
  pub id:                  EntryId,
  pub code:                String,
  pub system:              String,
  pub label:               String,
  #[serde(rename = "type")]
  pub entry_type:          EntryType,
  pub defined_by:          DefinedBy,
  pub validated_by_doctor: bool,
  pub note:                Option<String>,
  pub created_at:          Option<DateTime<Utc>>,
  pub origin:              Origin,
  pub patient_id:          Uuid,
  pub doctor_id:           Option<Uuid>,
  /// Present for curated entries; pass it back as `expected_revision`.
  pub revision:            Option<u32>,
}

impl AntecedentEntry {
  pub fn key(&self) -> EntryKey { EntryKey::new(&self.code, self.entry_type) }
}
