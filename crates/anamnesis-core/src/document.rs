//! History sections embedded in the patient document.
//!
//! The document is owned by a separate editor and is read here as untyped
//! JSON. Parsing is lenient: a missing or malformed section is an empty
//! section, and a malformed item is skipped without shifting the positional
//! index of the items after it.
//!
//! Expected shape (the `history` object and every section are optional):
//!
//! ```json
//! { "history": {
//!     "medical":  { "description": "...", "entries": [ { "label": "Asthme" } ] },
//!     "surgical": [ { "code": "LJ94", "label": "Appendicectomie" } ]
//! } }
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::entry::{EmbeddedEntry, EntryType};

/// Top-level document field holding the history sections.
pub const HISTORY_FIELD: &str = "history";

// ─── Raw shapes ──────────────────────────────────────────────────────────────

/// One item of a section, as written by the document editor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawEmbeddedEntry {
  #[serde(default)]
  pub code:       Option<String>,
  #[serde(default)]
  pub label:      String,
  #[serde(default)]
  pub system:     Option<String>,
  #[serde(default)]
  pub note:       Option<String>,
  #[serde(default, alias = "createdAt", deserialize_with = "lenient_datetime")]
  pub created_at: Option<DateTime<Utc>>,
}

/// A titled, ordered list of raw items. `None` marks an item that could not
/// be parsed; it still occupies its index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedHistorySection {
  pub description: String,
  pub entries:     Vec<Option<RawEmbeddedEntry>>,
}

impl EmbeddedHistorySection {
  fn from_json(value: &Value) -> Self {
    let (description, items) = match value {
      Value::Array(items) => (String::new(), items.as_slice()),
      Value::Object(map) => (
        map
          .get("description")
          .and_then(Value::as_str)
          .unwrap_or_default()
          .to_owned(),
        map
          .get("entries")
          .and_then(Value::as_array)
          .map(Vec::as_slice)
          .unwrap_or_default(),
      ),
      _ => return Self::default(),
    };

    let entries = items
      .iter()
      .map(|item| serde_json::from_value(item.clone()).ok())
      .collect();

    Self { description, entries }
  }
}

/// The three document sections, parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryDocument {
  pub medical:  EmbeddedHistorySection,
  pub surgical: EmbeddedHistorySection,
  pub allergy:  EmbeddedHistorySection,
}

impl HistoryDocument {
  /// Parse a patient document. Never fails; anything unrecognised is empty.
  pub fn from_json(document: &Value) -> Self {
    let Some(history) = document.get(HISTORY_FIELD) else {
      return Self::default();
    };
    let section = |name: EntryType| {
      history
        .get(name.as_ref())
        .map(EmbeddedHistorySection::from_json)
        .unwrap_or_default()
    };
    Self {
      medical:  section(EntryType::Medical),
      surgical: section(EntryType::Surgical),
      allergy:  section(EntryType::Allergy),
    }
  }

  pub fn section(&self, entry_type: EntryType) -> Option<&EmbeddedHistorySection> {
    match entry_type {
      EntryType::Medical => Some(&self.medical),
      EntryType::Surgical => Some(&self.surgical),
      EntryType::Allergy => Some(&self.allergy),
      EntryType::Treatment => None,
    }
  }

  /// Every usable embedded entry of one section, in document order.
  pub fn entries(&self, patient_id: Uuid, entry_type: EntryType) -> Vec<EmbeddedEntry> {
    self
      .section(entry_type)
      .map(|s| section_entries(patient_id, entry_type, s))
      .unwrap_or_default()
  }

  /// Every usable embedded entry across all sections.
  pub fn all_entries(&self, patient_id: Uuid) -> Vec<EmbeddedEntry> {
    EntryType::DOCUMENT_SECTIONS
      .into_iter()
      .flat_map(|t| self.entries(patient_id, t))
      .collect()
  }

  /// Look up the embedded entry at `(section, index)`.
  pub fn find(
    &self,
    patient_id: Uuid,
    section: EntryType,
    index: usize,
  ) -> Option<EmbeddedEntry> {
    self
      .entries(patient_id, section)
      .into_iter()
      .find(|e| e.index == index)
  }
}

// ─── Surrogate codes ─────────────────────────────────────────────────────────

/// Build a short code from a free-text label: the first three letters of
/// each of the first three words, uppercased and joined with `-`.
///
/// `"Asthme bronchique chronique"` → `"AST-BRO-CHR"`.
pub fn surrogate_code(label: &str) -> String {
  label
    .split_whitespace()
    .map(|word| {
      word
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_uppercase()
    })
    .filter(|part| !part.is_empty())
    .take(3)
    .collect::<Vec<_>>()
    .join("-")
}

fn normalize_label(label: &str) -> String {
  label
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

fn section_entries(
  patient_id: Uuid,
  section: EntryType,
  raw: &EmbeddedHistorySection,
) -> Vec<EmbeddedEntry> {
  // Surrogate code -> normalised label that claimed it.
  let mut claimed: HashMap<String, String> = HashMap::new();
  let mut out = Vec::new();

  for (index, item) in raw.entries.iter().enumerate() {
    let Some(item) = item else { continue };
    let label = item.label.trim();
    if label.is_empty() {
      continue;
    }

    let explicit = item
      .code
      .as_deref()
      .map(str::trim)
      .filter(|c| !c.is_empty());

    let (code, synthesized) = match explicit {
      Some(code) => (code.to_owned(), false),
      None => {
        let base = surrogate_code(label);
        if base.is_empty() {
          continue;
        }
        (disambiguate(&mut claimed, base, normalize_label(label)), true)
      }
    };

    out.push(EmbeddedEntry {
      patient_id,
      section,
      index,
      code,
      synthesized,
      system: non_blank(item.system.as_deref()),
      label: label.to_owned(),
      note: non_blank(item.note.as_deref()),
      created_at: item.created_at,
    });
  }

  out
}

/// Distinct labels that collide on a surrogate get `-2`, `-3`, … in order
/// of appearance; identical labels share the code.
fn disambiguate(
  claimed: &mut HashMap<String, String>,
  base: String,
  normalized: String,
) -> String {
  let mut candidate = base.clone();
  let mut counter = 1;
  loop {
    match claimed.get(&candidate) {
      None => {
        claimed.insert(candidate.clone(), normalized);
        return candidate;
      }
      Some(owner) if *owner == normalized => return candidate,
      Some(_) => {
        counter += 1;
        candidate = format!("{base}-{counter}");
      }
    }
  }
}

fn non_blank(s: Option<&str>) -> Option<String> {
  s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let raw = Option::<Value>::deserialize(deserializer)?;
  Ok(raw.as_ref().and_then(Value::as_str).and_then(|s| {
    DateTime::parse_from_rfc3339(s)
      .map(|dt| dt.with_timezone(&Utc))
      .ok()
  }))
}
