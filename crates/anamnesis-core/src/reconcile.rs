//! ReconciliationEngine: merges curated rows and embedded document entries
//! into one deduplicated, ordered view.
//!
//! Rules, in order of precedence:
//!
//! 1. Curated entries appear in store order (newest first).
//! 2. An embedded entry is dropped when a curated entry shares its key, or
//!    when its key is in the patient's [`ExclusionSet`].
//! 3. Across both sources, the first entry for a key wins.
//!
//! The function is pure: identical inputs give identical output, in the same
//! order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  document::HistoryDocument,
  entry::{AntecedentEntry, CuratedEntry, EntryId, EntryKey, EntryType, SourcedEntry},
  exclusion::ExclusionSet,
};

// ─── View ────────────────────────────────────────────────────────────────────

/// The merged history of one patient, split by section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryView {
  pub patient_id: Uuid,
  pub medical:    Vec<AntecedentEntry>,
  pub surgical:   Vec<AntecedentEntry>,
  pub allergy:    Vec<AntecedentEntry>,
  pub treatment:  Vec<AntecedentEntry>,
  /// Recoverable problems met while assembling the view.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub warnings:   Vec<String>,
}

impl HistoryView {
  pub fn new(patient_id: Uuid) -> Self { Self { patient_id, ..Self::default() } }

  pub fn section(&self, entry_type: EntryType) -> &[AntecedentEntry] {
    match entry_type {
      EntryType::Medical => &self.medical,
      EntryType::Surgical => &self.surgical,
      EntryType::Allergy => &self.allergy,
      EntryType::Treatment => &self.treatment,
    }
  }

  fn section_mut(&mut self, entry_type: EntryType) -> &mut Vec<AntecedentEntry> {
    match entry_type {
      EntryType::Medical => &mut self.medical,
      EntryType::Surgical => &mut self.surgical,
      EntryType::Allergy => &mut self.allergy,
      EntryType::Treatment => &mut self.treatment,
    }
  }

  pub fn entries(&self) -> impl Iterator<Item = &AntecedentEntry> {
    self
      .medical
      .iter()
      .chain(&self.surgical)
      .chain(&self.allergy)
      .chain(&self.treatment)
  }

  pub fn contains_key(&self, key: &EntryKey) -> bool {
    self.section(key.entry_type).iter().any(|e| e.code == key.code)
  }

  pub fn find(&self, id: &EntryId) -> Option<&AntecedentEntry> {
    self.entries().find(|e| e.id == *id)
  }

  fn push(&mut self, entry: SourcedEntry) {
    let view = entry.into_view();
    self.section_mut(view.entry_type).push(view);
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Merge `curated` (in store order) with the embedded entries of `document`,
/// hiding any embedded key found in `exclusions`.
pub fn reconcile(
  patient_id: Uuid,
  curated: Vec<CuratedEntry>,
  document: &HistoryDocument,
  exclusions: &ExclusionSet,
) -> HistoryView {
  let mut view = HistoryView::new(patient_id);
  let mut seen: HashSet<EntryKey> = HashSet::new();

  for entry in curated {
    if seen.insert(entry.key()) {
      view.push(SourcedEntry::Curated(entry));
    }
  }

  for entry in document.all_entries(patient_id) {
    let key = entry.key();
    if exclusions.contains(&key) || !seen.insert(key) {
      continue;
    }
    view.push(SourcedEntry::Embedded(entry));
  }

  view
}
