//! Generic fan-out and merge shared by terminology and catalog search.
//!
//! Each [`Source`] is called concurrently and raced against the same
//! timeout. All branches are joined before the merge runs; a branch that
//! misses its deadline is dropped and counts as failed. A source may carry
//! a fallback provider, used when the primary fails or answers nothing.

use std::{
  cmp::Ordering,
  collections::HashSet,
  sync::Arc,
  time::{Duration, Instant},
};

use futures_util::future::{BoxFuture, join_all};
use tracing::{debug, warn};

use crate::ProviderError;

// ─── Provider ────────────────────────────────────────────────────────────────

/// One upstream answering queries of type `Q` with items of type `T`.
pub trait Provider<Q, T>: Send + Sync {
  /// Name reported in `sources_used` / `failed_sources`.
  fn name(&self) -> &str;

  fn fetch<'a>(&'a self, query: &'a Q) -> BoxFuture<'a, Result<Vec<T>, ProviderError>>;
}

/// A provider plus an optional fallback.
pub struct Source<Q, T> {
  primary:  Arc<dyn Provider<Q, T>>,
  fallback: Option<Arc<dyn Provider<Q, T>>>,
}

impl<Q, T> Clone for Source<Q, T> {
  fn clone(&self) -> Self {
    Self { primary: Arc::clone(&self.primary), fallback: self.fallback.clone() }
  }
}

impl<Q, T> Source<Q, T> {
  pub fn new(primary: Arc<dyn Provider<Q, T>>) -> Self { Self { primary, fallback: None } }

  pub fn with_fallback(mut self, fallback: Arc<dyn Provider<Q, T>>) -> Self {
    self.fallback = Some(fallback);
    self
  }

  pub fn name(&self) -> &str { self.primary.name() }
}

// ─── Ranking ─────────────────────────────────────────────────────────────────

/// How merged items are scored, deduplicated, ordered and capped.
pub trait Ranking<Q, T> {
  /// Maximum number of items kept after sorting.
  fn limit(&self) -> usize;

  /// Adjust an item before it is merged (assign a score, tag it, ...).
  fn rank(&self, _query: &Q, _item: &mut T) {}

  /// Items sharing a key are collapsed; the first one in source order wins.
  fn dedup_key(&self, _item: &T) -> Option<String> { None }

  /// Final order. The sort is stable, so ties keep source order.
  fn compare(&self, a: &T, b: &T) -> Ordering;
}

/// Merged answer of all sources.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregated<T> {
  pub items:          Vec<T>,
  /// Providers whose answer was merged, in source order.
  pub sources_used:   Vec<String>,
  /// Providers that failed with no fallback to cover them.
  pub failed_sources: Vec<String>,
}

impl<T> Default for Aggregated<T> {
  fn default() -> Self {
    Self { items: Vec::new(), sources_used: Vec::new(), failed_sources: Vec::new() }
  }
}

impl<T> Aggregated<T> {
  /// Nothing answered at all; the caller may retry later.
  pub fn all_failed(&self) -> bool {
    self.sources_used.is_empty() && !self.failed_sources.is_empty()
  }
}

// ─── Fan-out ─────────────────────────────────────────────────────────────────

struct Branch<T> {
  source:  String,
  outcome: Result<Vec<T>, ProviderError>,
}

async fn call<Q, T>(
  provider: &dyn Provider<Q, T>,
  query: &Q,
  timeout: Duration,
) -> Result<Vec<T>, ProviderError> {
  let started = Instant::now();
  let outcome = match tokio::time::timeout(timeout, provider.fetch(query)).await {
    Ok(outcome) => outcome,
    Err(_) => Err(ProviderError::Timeout(timeout)),
  };
  debug!(
    provider = provider.name(),
    elapsed_ms = started.elapsed().as_millis() as u64,
    ok = outcome.is_ok(),
    "provider call finished"
  );
  outcome
}

async fn run_source<Q, T>(source: &Source<Q, T>, query: &Q, timeout: Duration) -> Branch<T> {
  let outcome = call(source.primary.as_ref(), query, timeout).await;

  let Some(fallback) = &source.fallback else {
    if let Err(e) = &outcome {
      warn!(provider = source.name(), error = %e, "provider failed");
    }
    return Branch { source: source.name().to_owned(), outcome };
  };

  match outcome {
    Ok(items) if !items.is_empty() => {
      return Branch { source: source.name().to_owned(), outcome: Ok(items) };
    }
    Ok(_) => warn!(
      provider = source.name(),
      fallback = fallback.name(),
      "provider returned nothing; using fallback"
    ),
    Err(e) => warn!(
      provider = source.name(),
      fallback = fallback.name(),
      error = %e,
      "provider failed; using fallback"
    ),
  }

  Branch {
    source:  fallback.name().to_owned(),
    outcome: call(fallback.as_ref(), query, timeout).await,
  }
}

/// Query every source concurrently and merge the answers.
///
/// Items are taken in source order, ranked, deduplicated (first wins),
/// stably sorted with [`Ranking::compare`] and capped at
/// [`Ranking::limit`]. Never fails; failed sources are listed instead.
pub async fn aggregate<Q, T, R>(
  sources: &[Source<Q, T>],
  query: &Q,
  timeout: Duration,
  ranking: &R,
) -> Aggregated<T>
where
  Q: Sync,
  T: Send,
  R: Ranking<Q, T> + Sync,
{
  let branches = join_all(sources.iter().map(|s| run_source(s, query, timeout))).await;

  let mut merged = Aggregated::default();
  let mut seen = HashSet::new();

  for branch in branches {
    let Ok(items) = branch.outcome else {
      merged.failed_sources.push(branch.source);
      continue;
    };
    merged.sources_used.push(branch.source);

    for mut item in items {
      if let Some(key) = ranking.dedup_key(&item) {
        if !seen.insert(key) {
          continue;
        }
      }
      ranking.rank(query, &mut item);
      merged.items.push(item);
    }
  }

  merged.items.sort_by(|a, b| ranking.compare(a, b));
  merged.items.truncate(ranking.limit());
  merged
}
