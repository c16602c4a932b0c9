//! ExclusionSet: keys hidden from the merged view.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entry::EntryKey;

/// Per-patient set of `(code, type)` keys that must never resurface from the
/// document, whatever the document currently contains.
///
/// Persisted by [`crate::store::RecordStore`]; this type is the in-memory
/// snapshot loaded at reconciliation time. Writers union single keys into the
/// persisted set rather than replacing it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionSet(BTreeSet<EntryKey>);

impl ExclusionSet {
  pub fn new() -> Self { Self::default() }

  pub fn contains(&self, key: &EntryKey) -> bool { self.0.contains(key) }

  /// Returns `true` if the key was not already present.
  pub fn insert(&mut self, key: EntryKey) -> bool { self.0.insert(key) }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = &EntryKey> { self.0.iter() }
}

impl FromIterator<EntryKey> for ExclusionSet {
  fn from_iter<I: IntoIterator<Item = EntryKey>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

impl Extend<EntryKey> for ExclusionSet {
  fn extend<I: IntoIterator<Item = EntryKey>>(&mut self, iter: I) { self.0.extend(iter) }
}
