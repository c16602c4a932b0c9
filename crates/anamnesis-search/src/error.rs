//! Error types for `anamnesis-search`.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single upstream branch. Recovered inside the aggregator and
/// never returned to callers of a search.
#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("no answer within {0:?}")]
  Timeout(Duration),

  #[error("upstream returned status {0}")]
  Status(u16),

  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("malformed response: {0}")]
  Decode(String),
}

/// Failure of a whole search request.
#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid query: {0}")]
  InvalidQuery(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Longest query text accepted by either search.
pub const MAX_QUERY_CHARS: usize = 200;

/// Trim a raw query and reject text no upstream should ever see.
///
/// Returns `None` when the trimmed text is shorter than `min_chars`, in
/// which case the search answers empty without calling anything.
pub(crate) fn normalize_query(raw: &str, min_chars: usize) -> Result<Option<String>> {
  let text = raw.trim();
  if text.chars().any(char::is_control) {
    return Err(Error::InvalidQuery("query contains control characters".to_owned()));
  }
  let len = text.chars().count();
  if len > MAX_QUERY_CHARS {
    return Err(Error::InvalidQuery(format!(
      "query is {len} characters long, at most {MAX_QUERY_CHARS} are accepted"
    )));
  }
  Ok((len >= min_chars).then(|| text.to_owned()))
}
