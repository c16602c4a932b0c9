//! HTTP Basic-auth extractor resolving the caller to a clinician.

use anamnesis_core::{Error, clinician::Clinician};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// One clinician allowed to sign in.
#[derive(Debug, Clone, Deserialize)]
pub struct ClinicianAccount {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
  pub clinician_id:  Uuid,
}

/// Accounts accepted by this server instance.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
  pub accounts: Vec<ClinicianAccount>,
}

impl AuthConfig {
  pub fn new(accounts: Vec<ClinicianAccount>) -> Self { Self { accounts } }

  fn account(&self, username: &str) -> Option<&ClinicianAccount> {
    self.accounts.iter().find(|a| a.username == username)
  }
}

/// The clinician behind the current request.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Clinician);

/// Verify Basic credentials from `headers` against the configured accounts.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<Clinician, Error> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthenticated)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(Error::Unauthenticated)?;

  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthenticated)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| Error::Unauthenticated)?;

  let (username, password) = creds.split_once(':').ok_or(Error::Unauthenticated)?;

  let Some(account) = config.account(username) else {
    debug!(%username, "unknown clinician");
    return Err(Error::Unauthenticated);
  };

  let parsed_hash = PasswordHash::new(&account.password_hash)
    .map_err(|_| Error::Unauthenticated)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| Error::Unauthenticated)?;

  Ok(Clinician { clinician_id: account.clinician_id, username: account.username.clone() })
}

impl<S> FromRequestParts<AppState<S>> for Authenticated
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    Ok(Authenticated(verify_auth(&parts.headers, &state.auth)?))
  }
}
