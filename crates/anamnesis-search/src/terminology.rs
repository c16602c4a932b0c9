//! Terminology search over the CIM-11 and CISP2 vocabularies.
//!
//! Both vocabularies are always queried together; the target section only
//! decides which one wins ties and whether surgical hints are attached.

use std::{cmp::Ordering, sync::Arc, time::Duration};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tracing::debug;

use crate::{
  ProviderError, Result,
  aggregate::{Provider, Ranking, Source, aggregate},
  error::normalize_query,
};

/// Shorter queries answer empty without calling any vocabulary.
pub const MIN_QUERY_CHARS: usize = 3;
pub const MAX_RESULTS: usize = 20;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Hint attached to CISP2 procedure codes surfacing in a medical search.
pub const SURGICAL_HINT: &str = "suggested surgical";

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum Vocabulary {
  #[serde(rename = "CIM-11")]
  #[strum(serialize = "CIM-11")]
  Cim11,
  #[serde(rename = "CISP2")]
  #[strum(serialize = "CISP2")]
  Cisp2,
}

/// The history section a search is feeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SearchTarget {
  Medical,
  Surgical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerminologyQuery {
  pub text:   String,
  pub target: SearchTarget,
}

/// One selectable terminology entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCandidate {
  pub code:                 String,
  pub label:                String,
  pub system:               Vocabulary,
  pub score:                f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cross_reference_hint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminologyResults {
  pub candidates:     Vec<SearchCandidate>,
  /// Vocabularies that answered, even with nothing.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub sources_used:   Vec<String>,
  /// Vocabularies that failed to answer.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub failed_sources: Vec<String>,
}

impl TerminologyResults {
  /// Every vocabulary failed; the empty list is not a real answer.
  pub fn retriable(&self) -> bool { self.sources_used.is_empty() && !self.failed_sources.is_empty() }
}

/// Relevance of a code/label pair to a query, in `0.0..=1.0`.
pub fn relevance(query: &str, code: &str, label: &str) -> f64 {
  let query = query.trim().to_lowercase();
  if query.is_empty() {
    return 0.0;
  }
  let code = code.to_lowercase();
  let label = label.to_lowercase();

  if code == query {
    1.0
  } else if label.starts_with(&query) {
    0.9
  } else if code.starts_with(&query) {
    0.8
  } else if label.split_whitespace().any(|w| w.starts_with(&query)) {
    0.7
  } else if label.contains(&query) {
    0.5
  } else {
    0.0
  }
}

// ─── Ranking ─────────────────────────────────────────────────────────────────

struct ByScore;

impl Ranking<TerminologyQuery, SearchCandidate> for ByScore {
  fn limit(&self) -> usize { MAX_RESULTS }

  fn rank(&self, query: &TerminologyQuery, item: &mut SearchCandidate) {
    if query.target == SearchTarget::Medical
      && item.code.starts_with(['Z', 'z'])
      && item.cross_reference_hint.is_none()
    {
      item.cross_reference_hint = Some(SURGICAL_HINT.to_owned());
    }
  }

  fn compare(&self, a: &SearchCandidate, b: &SearchCandidate) -> Ordering {
    b.score.total_cmp(&a.score)
  }
}

// ─── Aggregator ──────────────────────────────────────────────────────────────

/// Stateless terminology search; cheap to clone and safe to call
/// repeatedly. Callers are expected to debounce keystrokes.
#[derive(Clone)]
pub struct TerminologySearch {
  cim11:   Source<TerminologyQuery, SearchCandidate>,
  cisp2:   Source<TerminologyQuery, SearchCandidate>,
  timeout: Duration,
}

impl TerminologySearch {
  pub fn new(
    cim11: Arc<dyn Provider<TerminologyQuery, SearchCandidate>>,
    cisp2: Arc<dyn Provider<TerminologyQuery, SearchCandidate>>,
  ) -> Self {
    Self { cim11: Source::new(cim11), cisp2: Source::new(cisp2), timeout: DEFAULT_TIMEOUT }
  }

  /// Search backed only by the built-in vocabularies.
  pub fn offline() -> Self {
    Self::new(
      Arc::new(StaticVocabulary::builtin(Vocabulary::Cim11)),
      Arc::new(StaticVocabulary::builtin(Vocabulary::Cisp2)),
    )
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub async fn search(&self, text: &str, target: SearchTarget) -> Result<TerminologyResults> {
    let Some(text) = normalize_query(text, MIN_QUERY_CHARS)? else {
      return Ok(TerminologyResults::default());
    };

    // Source order is the tie-break priority.
    let sources = match target {
      SearchTarget::Medical => [self.cim11.clone(), self.cisp2.clone()],
      SearchTarget::Surgical => [self.cisp2.clone(), self.cim11.clone()],
    };
    let query = TerminologyQuery { text, target };
    let merged = aggregate(&sources, &query, self.timeout, &ByScore).await;

    debug!(
      query = %query.text,
      %target,
      results = merged.items.len(),
      failed = merged.failed_sources.len(),
      "terminology search"
    );
    Ok(TerminologyResults {
      candidates:     merged.items,
      sources_used:   merged.sources_used,
      failed_sources: merged.failed_sources,
    })
  }
}

// ─── HTTP vocabulary ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawCandidate {
  code:  String,
  #[serde(alias = "title")]
  label: String,
  score: Option<f64>,
}

/// A vocabulary served over HTTP: `GET <url>?q=<text>&type=<target>`
/// answering a JSON list of `{code, label | title, score?}`.
pub struct HttpVocabulary {
  vocabulary: Vocabulary,
  url:        String,
  client:     reqwest::Client,
}

impl HttpVocabulary {
  pub fn new(vocabulary: Vocabulary, url: impl Into<String>, client: reqwest::Client) -> Self {
    Self { vocabulary, url: url.into(), client }
  }

  async fn fetch_inner(&self, query: &TerminologyQuery) -> Result<Vec<SearchCandidate>, ProviderError> {
    let resp = self
      .client
      .get(&self.url)
      .query(&[("q", query.text.as_str()), ("type", query.target.to_string().as_str())])
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(ProviderError::Status(resp.status().as_u16()));
    }
    let raw: Vec<RawCandidate> = resp
      .json()
      .await
      .map_err(|e| ProviderError::Decode(e.to_string()))?;

    Ok(
      raw
        .into_iter()
        .filter(|c| !c.code.trim().is_empty() && !c.label.trim().is_empty())
        .map(|c| SearchCandidate {
          score: c.score.unwrap_or_else(|| relevance(&query.text, &c.code, &c.label)),
          code: c.code,
          label: c.label,
          system: self.vocabulary,
          cross_reference_hint: None,
        })
        .collect(),
    )
  }
}

impl Provider<TerminologyQuery, SearchCandidate> for HttpVocabulary {
  fn name(&self) -> &str { self.vocabulary.as_ref() }

  fn fetch<'a>(
    &'a self,
    query: &'a TerminologyQuery,
  ) -> BoxFuture<'a, Result<Vec<SearchCandidate>, ProviderError>> {
    Box::pin(self.fetch_inner(query))
  }
}

// ─── Static vocabulary ───────────────────────────────────────────────────────

const CIM11_SEED: &[(&str, &str)] = &[
  ("5A10", "Diabète sucré de type 1"),
  ("5A11", "Diabète sucré de type 2"),
  ("5A13", "Diabète sucré, type non précisé"),
  ("5A00", "Hypothyroïdie"),
  ("5A02", "Thyrotoxicose"),
  ("BA00", "Hypertension essentielle"),
  ("BA41", "Infarctus aigu du myocarde"),
  ("BC81", "Fibrillation auriculaire"),
  ("CA23", "Asthme"),
  ("CA22", "Bronchopneumopathie chronique obstructive"),
  ("8A80", "Migraine"),
  ("8A60", "Épilepsie"),
  ("6A70", "Épisode dépressif unique"),
  ("6B00", "Trouble anxieux généralisé"),
  ("DA22", "Reflux gastro-œsophagien"),
  ("DB10", "Appendicite aiguë"),
  ("DC11", "Lithiase biliaire"),
  ("FA01", "Gonarthrose"),
  ("GB61", "Maladie rénale chronique"),
  ("4A84", "Allergie aux médicaments"),
];

const CISP2_SEED: &[(&str, &str)] = &[
  ("T89", "Diabète insulino-dépendant"),
  ("T90", "Diabète non insulino-dépendant"),
  ("T86", "Hypothyroïdie, myxœdème"),
  ("K86", "Hypertension sans complication"),
  ("K78", "Fibrillation auriculaire, flutter"),
  ("R96", "Asthme"),
  ("R95", "Bronchopneumopathie chronique obstructive"),
  ("N89", "Migraine"),
  ("P76", "Dépression"),
  ("D88", "Appendicite"),
  ("D98", "Cholécystite, cholélithiase"),
  ("L90", "Gonarthrose"),
  ("A12", "Allergie, réaction allergique"),
];

/// A fixed in-process vocabulary, scored with [`relevance`].
pub struct StaticVocabulary {
  vocabulary: Vocabulary,
  entries:    Vec<(String, String)>,
}

impl StaticVocabulary {
  pub fn new(vocabulary: Vocabulary, entries: Vec<(String, String)>) -> Self {
    Self { vocabulary, entries }
  }

  /// The small seed list shipped with the server.
  pub fn builtin(vocabulary: Vocabulary) -> Self {
    let seed = match vocabulary {
      Vocabulary::Cim11 => CIM11_SEED,
      Vocabulary::Cisp2 => CISP2_SEED,
    };
    let entries = seed.iter().map(|(c, l)| ((*c).to_owned(), (*l).to_owned())).collect();
    Self::new(vocabulary, entries)
  }

  fn lookup(&self, query: &TerminologyQuery) -> Vec<SearchCandidate> {
    self
      .entries
      .iter()
      .filter_map(|(code, label)| {
        let score = relevance(&query.text, code, label);
        (score > 0.0).then(|| SearchCandidate {
          code: code.clone(),
          label: label.clone(),
          system: self.vocabulary,
          score,
          cross_reference_hint: None,
        })
      })
      .collect()
  }
}

impl Provider<TerminologyQuery, SearchCandidate> for StaticVocabulary {
  fn name(&self) -> &str { self.vocabulary.as_ref() }

  fn fetch<'a>(
    &'a self,
    query: &'a TerminologyQuery,
  ) -> BoxFuture<'a, Result<Vec<SearchCandidate>, ProviderError>> {
    Box::pin(async move { Ok(self.lookup(query)) })
  }
}
