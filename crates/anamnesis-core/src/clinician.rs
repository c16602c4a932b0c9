//! Clinician: the identified caller behind every mutation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A caller that has been resolved to a known clinician account.
///
/// Resolution (credentials, sessions) happens outside this crate; holding a
/// `Clinician` only proves identity, not a relationship with any patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clinician {
  pub clinician_id: Uuid,
  pub username:     String,
}
