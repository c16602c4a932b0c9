//! Medication catalog search across jurisdictions.
//!
//! Every jurisdiction has one upstream provider backed by a static seed
//! catalog. A provider that times out, fails or finds nothing is replaced
//! by its seed, so a search always answers.

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

pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_RESULTS: usize = 20;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub const SCORE_NAME_PREFIX: u32 = 100;
pub const SCORE_NAME_INNER: u32 = 50;
pub const SCORE_GENERIC: u32 = 25;

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Jurisdiction {
  Fr,
  Us,
}

/// Which jurisdictions a search covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JurisdictionFilter {
  Fr,
  Us,
  #[default]
  All,
}

impl JurisdictionFilter {
  /// Selected jurisdictions in query order.
  pub fn jurisdictions(self) -> &'static [Jurisdiction] {
    match self {
      Self::Fr => &[Jurisdiction::Fr],
      Self::Us => &[Jurisdiction::Us],
      Self::All => &[Jurisdiction::Fr, Jurisdiction::Us],
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
  pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
  pub id:                 String,
  pub name:               String,
  pub generic_name:       Option<String>,
  pub manufacturer:       Option<String>,
  #[serde(default)]
  pub active_ingredients: Vec<String>,
  pub dosage:             Option<String>,
  pub strength:           Option<String>,
  pub country:            Jurisdiction,
  /// Provider that produced the item.
  pub source:             String,
  #[serde(default)]
  pub score:              u32,
}

impl CatalogItem {
  /// Key under which items from different providers are collapsed.
  pub fn dedup_key(&self) -> String {
    format!(
      "{}-{}",
      self.name.trim(),
      self.generic_name.as_deref().unwrap_or_default().trim()
    )
    .trim()
    .to_lowercase()
  }

  /// Case-insensitive substring match on name, generic name or any active
  /// ingredient. `needle` must already be lowercase.
  fn matches(&self, needle: &str) -> bool {
    self.name.to_lowercase().contains(needle)
      || self
        .generic_name
        .as_deref()
        .is_some_and(|g| g.to_lowercase().contains(needle))
      || self
        .active_ingredients
        .iter()
        .any(|i| i.to_lowercase().contains(needle))
  }
}

/// Relevance of an item to a query.
///
/// Brand name starting with the query scores 100, the query occurring
/// further inside the brand name adds 50, the generic name containing it
/// adds 25.
pub fn score_item(query: &str, item: &CatalogItem) -> u32 {
  let needle = query.trim().to_lowercase();
  if needle.is_empty() {
    return 0;
  }
  let name = item.name.to_lowercase();

  let mut score = 0;
  if name.starts_with(&needle) {
    score += SCORE_NAME_PREFIX;
  }
  if name.match_indices(&needle).any(|(at, _)| at > 0) {
    score += SCORE_NAME_INNER;
  }
  if item
    .generic_name
    .as_deref()
    .is_some_and(|g| g.to_lowercase().contains(&needle))
  {
    score += SCORE_GENERIC;
  }
  score
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResults {
  pub items:        Vec<CatalogItem>,
  pub sources_used: Vec<String>,
}

// ─── Ranking ─────────────────────────────────────────────────────────────────

struct FrenchFirst;

impl Ranking<CatalogQuery, CatalogItem> for FrenchFirst {
  fn limit(&self) -> usize { MAX_RESULTS }

  fn rank(&self, query: &CatalogQuery, item: &mut CatalogItem) {
    item.score = score_item(&query.text, item);
  }

  fn dedup_key(&self, item: &CatalogItem) -> Option<String> { Some(item.dedup_key()) }

  fn compare(&self, a: &CatalogItem, b: &CatalogItem) -> Ordering {
    let bucket = |i: &CatalogItem| u8::from(i.country != Jurisdiction::Fr);
    bucket(a).cmp(&bucket(b)).then(b.score.cmp(&a.score))
  }
}

// ─── Aggregator ──────────────────────────────────────────────────────────────

/// Catalog search across the `fr` and `us` providers.
#[derive(Clone)]
pub struct CatalogSearch {
  fr:      Source<CatalogQuery, CatalogItem>,
  us:      Source<CatalogQuery, CatalogItem>,
  timeout: Duration,
}

impl CatalogSearch {
  /// Wrap each provider with its jurisdiction's seed catalog.
  pub fn new(
    fr: Arc<dyn Provider<CatalogQuery, CatalogItem>>,
    us: Arc<dyn Provider<CatalogQuery, CatalogItem>>,
  ) -> Self {
    Self {
      fr:      Source::new(fr).with_fallback(Arc::new(SeedCatalog::builtin(Jurisdiction::Fr))),
      us:      Source::new(us).with_fallback(Arc::new(SeedCatalog::builtin(Jurisdiction::Us))),
      timeout: DEFAULT_TIMEOUT,
    }
  }

  /// Search that answers from the seed catalogs only.
  pub fn offline() -> Self {
    Self::new(
      Arc::new(Unconfigured(Jurisdiction::Fr)),
      Arc::new(Unconfigured(Jurisdiction::Us)),
    )
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Fails only on a malformed query; provider failures are absorbed.
  pub async fn search(&self, text: &str, filter: JurisdictionFilter) -> Result<CatalogResults> {
    let Some(text) = normalize_query(text, MIN_QUERY_CHARS)? else {
      return Ok(CatalogResults::default());
    };

    let sources: Vec<_> = filter
      .jurisdictions()
      .iter()
      .map(|j| match j {
        Jurisdiction::Fr => self.fr.clone(),
        Jurisdiction::Us => self.us.clone(),
      })
      .collect();
    let query = CatalogQuery { text };
    let merged = aggregate(&sources, &query, self.timeout, &FrenchFirst).await;

    debug!(
      query = %query.text,
      %filter,
      results = merged.items.len(),
      sources = ?merged.sources_used,
      "catalog search"
    );
    Ok(CatalogResults { items: merged.items, sources_used: merged.sources_used })
  }
}

// ─── Providers ───────────────────────────────────────────────────────────────

/// Placeholder for a jurisdiction with no upstream configured; always
/// answers empty so the seed catalog takes over.
pub struct Unconfigured(pub Jurisdiction);

impl Provider<CatalogQuery, CatalogItem> for Unconfigured {
  fn name(&self) -> &str {
    match self.0 {
      Jurisdiction::Fr => "unconfigured:fr",
      Jurisdiction::Us => "unconfigured:us",
    }
  }

  fn fetch<'a>(
    &'a self,
    _query: &'a CatalogQuery,
  ) -> BoxFuture<'a, Result<Vec<CatalogItem>, ProviderError>> {
    Box::pin(async { Ok(Vec::new()) })
  }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCatalogItem {
  id:                 Option<String>,
  name:               String,
  generic_name:       Option<String>,
  manufacturer:       Option<String>,
  #[serde(default)]
  active_ingredients: Vec<String>,
  dosage:             Option<String>,
  strength:           Option<String>,
}

/// A catalog served over HTTP: `GET <url>?q=<text>` answering a JSON list
/// of catalog-item shaped objects.
pub struct HttpCatalog {
  name:         String,
  jurisdiction: Jurisdiction,
  url:          String,
  client:       reqwest::Client,
}

impl HttpCatalog {
  pub fn new(
    name: impl Into<String>,
    jurisdiction: Jurisdiction,
    url: impl Into<String>,
    client: reqwest::Client,
  ) -> Self {
    Self { name: name.into(), jurisdiction, url: url.into(), client }
  }

  async fn fetch_inner(&self, query: &CatalogQuery) -> Result<Vec<CatalogItem>, ProviderError> {
    let resp = self
      .client
      .get(&self.url)
      .query(&[("q", query.text.as_str())])
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(ProviderError::Status(resp.status().as_u16()));
    }
    let raw: Vec<RawCatalogItem> = resp
      .json()
      .await
      .map_err(|e| ProviderError::Decode(e.to_string()))?;

    Ok(
      raw
        .into_iter()
        .filter(|r| !r.name.trim().is_empty())
        .enumerate()
        .map(|(n, r)| CatalogItem {
          id:                 r.id.unwrap_or_else(|| format!("{}-{n}", self.name)),
          name:               r.name,
          generic_name:       r.generic_name,
          manufacturer:       r.manufacturer,
          active_ingredients: r.active_ingredients,
          dosage:             r.dosage,
          strength:           r.strength,
          country:            self.jurisdiction,
          source:             self.name.clone(),
          score:              0,
        })
        .collect(),
    )
  }
}

impl Provider<CatalogQuery, CatalogItem> for HttpCatalog {
  fn name(&self) -> &str { &self.name }

  fn fetch<'a>(
    &'a self,
    query: &'a CatalogQuery,
  ) -> BoxFuture<'a, Result<Vec<CatalogItem>, ProviderError>> {
    Box::pin(self.fetch_inner(query))
  }
}

#[derive(Deserialize)]
struct FdaResponse {
  #[serde(default)]
  results: Vec<FdaProduct>,
}

#[derive(Deserialize)]
struct FdaProduct {
  product_ndc:        String,
  brand_name:         Option<String>,
  generic_name:       Option<String>,
  labeler_name:       Option<String>,
  dosage_form:        Option<String>,
  #[serde(default)]
  active_ingredients: Vec<FdaIngredient>,
}

#[derive(Deserialize)]
struct FdaIngredient {
  name:     String,
  strength: Option<String>,
}

/// The openFDA NDC directory (`https://api.fda.gov/drug/ndc.json`).
pub struct OpenFdaCatalog {
  url:    String,
  client: reqwest::Client,
}

impl OpenFdaCatalog {
  pub const NAME: &'static str = "openfda";
  pub const DEFAULT_URL: &'static str = "https://api.fda.gov/drug/ndc.json";

  pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
    Self { url: url.into(), client }
  }

  async fn fetch_inner(&self, query: &CatalogQuery) -> Result<Vec<CatalogItem>, ProviderError> {
    let term = query.text.replace('"', "");
    let search = format!("brand_name:\"{term}\" generic_name:\"{term}\"");
    let resp = self
      .client
      .get(&self.url)
      .query(&[("search", search.as_str()), ("limit", "20")])
      .send()
      .await?;

    // openFDA answers 404 when nothing matches.
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(Vec::new());
    }
    if !resp.status().is_success() {
      return Err(ProviderError::Status(resp.status().as_u16()));
    }
    let body: FdaResponse = resp
      .json()
      .await
      .map_err(|e| ProviderError::Decode(e.to_string()))?;

    Ok(body.results.into_iter().filter_map(fda_item).collect())
  }
}

fn fda_item(p: FdaProduct) -> Option<CatalogItem> {
  let name = p.brand_name.filter(|n| !n.trim().is_empty())?;
  let strengths: Vec<_> = p
    .active_ingredients
    .iter()
    .filter_map(|i| i.strength.clone())
    .collect();

  Some(CatalogItem {
    id: p.product_ndc,
    name,
    generic_name: p.generic_name,
    manufacturer: p.labeler_name,
    active_ingredients: p.active_ingredients.into_iter().map(|i| i.name).collect(),
    dosage: p.dosage_form,
    strength: (!strengths.is_empty()).then(|| strengths.join("; ")),
    country: Jurisdiction::Us,
    source: OpenFdaCatalog::NAME.to_owned(),
    score: 0,
  })
}

impl Provider<CatalogQuery, CatalogItem> for OpenFdaCatalog {
  fn name(&self) -> &str { Self::NAME }

  fn fetch<'a>(
    &'a self,
    query: &'a CatalogQuery,
  ) -> BoxFuture<'a, Result<Vec<CatalogItem>, ProviderError>> {
    Box::pin(self.fetch_inner(query))
  }
}

// ─── Seed catalogs ───────────────────────────────────────────────────────────

struct SeedRow {
  name:         &'static str,
  generic:      &'static str,
  manufacturer: &'static str,
  ingredients:  &'static [&'static str],
  dosage:       &'static str,
  strength:     &'static str,
}

const FR_SEED: &[SeedRow] = &[
  SeedRow { name: "DOLIPRANE 1000 mg", generic: "paracétamol", manufacturer: "Sanofi", ingredients: &["paracétamol"], dosage: "comprimé", strength: "1000 mg" },
  SeedRow { name: "DOLIPRANE 500 mg", generic: "paracétamol", manufacturer: "Sanofi", ingredients: &["paracétamol"], dosage: "gélule", strength: "500 mg" },
  SeedRow { name: "EFFERALGAN 1 g", generic: "paracétamol", manufacturer: "UPSA", ingredients: &["paracétamol"], dosage: "comprimé effervescent", strength: "1 g" },
  SeedRow { name: "DAFALGAN 500 mg", generic: "paracétamol", manufacturer: "UPSA", ingredients: &["paracétamol"], dosage: "gélule", strength: "500 mg" },
  SeedRow { name: "ADVIL 200 mg", generic: "ibuprofène", manufacturer: "Pfizer", ingredients: &["ibuprofène"], dosage: "comprimé enrobé", strength: "200 mg" },
  SeedRow { name: "SPASFON", generic: "phloroglucinol", manufacturer: "Teva", ingredients: &["phloroglucinol", "triméthylphloroglucinol"], dosage: "comprimé enrobé", strength: "80 mg" },
  SeedRow { name: "KARDEGIC 75 mg", generic: "acétylsalicylate de lysine", manufacturer: "Sanofi", ingredients: &["acétylsalicylate de lysine"], dosage: "poudre pour solution buvable", strength: "75 mg" },
  SeedRow { name: "LEVOTHYROX 50 µg", generic: "lévothyroxine sodique", manufacturer: "Merck", ingredients: &["lévothyroxine sodique"], dosage: "comprimé sécable", strength: "50 µg" },
  SeedRow { name: "AMOXICILLINE BIOGARAN 1 g", generic: "amoxicilline", manufacturer: "Biogaran", ingredients: &["amoxicilline"], dosage: "comprimé dispersible", strength: "1 g" },
  SeedRow { name: "VENTOLINE 100 µg", generic: "salbutamol", manufacturer: "GlaxoSmithKline", ingredients: &["salbutamol"], dosage: "suspension pour inhalation", strength: "100 µg/dose" },
  SeedRow { name: "METFORMINE ARROW 850 mg", generic: "metformine", manufacturer: "Arrow", ingredients: &["chlorhydrate de metformine"], dosage: "comprimé pelliculé", strength: "850 mg" },
];

const US_SEED: &[SeedRow] = &[
  SeedRow { name: "TYLENOL Extra Strength", generic: "acetaminophen", manufacturer: "Johnson & Johnson", ingredients: &["acetaminophen"], dosage: "tablet", strength: "500 mg" },
  SeedRow { name: "ADVIL", generic: "ibuprofen", manufacturer: "Pfizer", ingredients: &["ibuprofen"], dosage: "tablet, coated", strength: "200 mg" },
  SeedRow { name: "LIPITOR", generic: "atorvastatin calcium", manufacturer: "Pfizer", ingredients: &["atorvastatin calcium trihydrate"], dosage: "tablet, film coated", strength: "20 mg" },
  SeedRow { name: "GLUCOPHAGE", generic: "metformin hydrochloride", manufacturer: "Bristol-Myers Squibb", ingredients: &["metformin hydrochloride"], dosage: "tablet, film coated", strength: "500 mg" },
  SeedRow { name: "SYNTHROID", generic: "levothyroxine sodium", manufacturer: "AbbVie", ingredients: &["levothyroxine sodium anhydrous"], dosage: "tablet", strength: "50 ug" },
  SeedRow { name: "VENTOLIN HFA", generic: "albuterol sulfate", manufacturer: "GlaxoSmithKline", ingredients: &["albuterol sulfate"], dosage: "aerosol, metered", strength: "90 ug/1" },
  SeedRow { name: "ZOLOFT", generic: "sertraline hydrochloride", manufacturer: "Viatris", ingredients: &["sertraline hydrochloride"], dosage: "tablet, film coated", strength: "50 mg" },
  SeedRow { name: "AMOXIL", generic: "amoxicillin", manufacturer: "GlaxoSmithKline", ingredients: &["amoxicillin"], dosage: "capsule", strength: "500 mg" },
];

/// A static, curated list of well-known products for one jurisdiction.
pub struct SeedCatalog {
  name:  String,
  items: Vec<CatalogItem>,
}

impl SeedCatalog {
  pub fn new(jurisdiction: Jurisdiction, items: Vec<CatalogItem>) -> Self {
    Self { name: format!("seed:{jurisdiction}"), items }
  }

  pub fn builtin(jurisdiction: Jurisdiction) -> Self {
    let rows = match jurisdiction {
      Jurisdiction::Fr => FR_SEED,
      Jurisdiction::Us => US_SEED,
    };
    let source = format!("seed:{jurisdiction}");
    let items = rows
      .iter()
      .enumerate()
      .map(|(n, row)| CatalogItem {
        id:                 format!("{source}-{n}"),
        name:               row.name.to_owned(),
        generic_name:       Some(row.generic.to_owned()),
        manufacturer:       Some(row.manufacturer.to_owned()),
        active_ingredients: row.ingredients.iter().map(|i| (*i).to_owned()).collect(),
        dosage:             Some(row.dosage.to_owned()),
        strength:           Some(row.strength.to_owned()),
        country:            jurisdiction,
        source:             source.clone(),
        score:              0,
      })
      .collect();
    Self::new(jurisdiction, items)
  }

  fn lookup(&self, query: &CatalogQuery) -> Vec<CatalogItem> {
    let needle = query.text.trim().to_lowercase();
    self.items.iter().filter(|i| i.matches(&needle)).cloned().collect()
  }
}

impl Provider<CatalogQuery, CatalogItem> for SeedCatalog {
  fn name(&self) -> &str { &self.name }

  fn fetch<'a>(
    &'a self,
    query: &'a CatalogQuery,
  ) -> BoxFuture<'a, Result<Vec<CatalogItem>, ProviderError>> {
    Box::pin(async move { Ok(self.lookup(query)) })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Hangs far past any test timeout.
  struct Hanging;

  impl Provider<CatalogQuery, CatalogItem> for Hanging {
    fn name(&self) -> &str { "hanging" }

    fn fetch<'a>(
      &'a self,
      _query: &'a CatalogQuery,
    ) -> BoxFuture<'a, Result<Vec<CatalogItem>, ProviderError>> {
      Box::pin(async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
      })
    }
  }

  /// Answers a fixed list.
  struct Listing(&'static str, Vec<CatalogItem>);

  impl Provider<CatalogQuery, CatalogItem> for Listing {
    fn name(&self) -> &str { self.0 }

    fn fetch<'a>(
      &'a self,
      _query: &'a CatalogQuery,
    ) -> BoxFuture<'a, Result<Vec<CatalogItem>, ProviderError>> {
      Box::pin(async move { Ok(self.1.clone()) })
    }
  }

  fn item(name: &str, generic: &str, country: Jurisdiction, source: &str) -> CatalogItem {
    CatalogItem {
      id:                 name.to_owned(),
      name:               name.to_owned(),
      generic_name:       Some(generic.to_owned()),
      manufacturer:       None,
      active_ingredients: vec![generic.to_owned()],
      dosage:             None,
      strength:           None,
      country,
      source:             source.to_owned(),
      score:              0,
    }
  }

  #[tokio::test]
  async fn timed_out_provider_falls_back_to_seed() {
    let search = CatalogSearch::new(Arc::new(Hanging), Arc::new(Hanging))
      .with_timeout(Duration::from_millis(50));
    let out = search.search("dolipra", JurisdictionFilter::Fr).await.unwrap();

    let doliprane = out
      .items
      .iter()
      .find(|i| i.name == "DOLIPRANE 1000 mg")
      .expect("seed item present");
    assert_eq!(doliprane.score, 100);
    assert_eq!(doliprane.country, Jurisdiction::Fr);
    assert_eq!(out.sources_used, vec!["seed:fr"]);
    assert!(out.items.iter().all(|i| i.source == "seed:fr"));
  }

  #[tokio::test]
  async fn seed_matches_generic_and_ingredients() {
    let out = CatalogSearch::offline()
      .search("metformin", JurisdictionFilter::All)
      .await
      .unwrap();

    let names: Vec<_> = out.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["METFORMINE ARROW 850 mg", "GLUCOPHAGE"]);
    assert_eq!(out.sources_used, vec!["seed:fr", "seed:us"]);
  }

  #[tokio::test]
  async fn french_items_always_come_first() {
    let fr = Listing("bdpm", vec![item("XADVIL", "ibuprofène", Jurisdiction::Fr, "bdpm")]);
    let us = Listing("openfda", vec![item("ADVIL", "ibuprofen", Jurisdiction::Us, "openfda")]);
    let out = CatalogSearch::new(Arc::new(fr), Arc::new(us))
      .search("advil", JurisdictionFilter::All)
      .await
      .unwrap();

    assert_eq!(out.items[0].name, "XADVIL");
    assert_eq!(out.items[0].score, 50);
    assert_eq!(out.items[1].name, "ADVIL");
    assert_eq!(out.items[1].score, 100);
    assert_eq!(out.sources_used, vec!["bdpm", "openfda"]);
  }

  #[tokio::test]
  async fn duplicates_keep_the_first_jurisdiction() {
    let fr = Listing("bdpm", vec![item("Amoxil", "amoxicillin", Jurisdiction::Fr, "bdpm")]);
    let us = Listing("openfda", vec![item(" AMOXIL ", "Amoxicillin", Jurisdiction::Us, "openfda")]);
    let out = CatalogSearch::new(Arc::new(fr), Arc::new(us))
      .search("amox", JurisdictionFilter::All)
      .await
      .unwrap();

    assert_eq!(out.items.len(), 1);
    assert_eq!(out.items[0].source, "bdpm");
  }

  #[tokio::test]
  async fn short_query_is_empty() {
    let out = CatalogSearch::new(Arc::new(Hanging), Arc::new(Hanging))
      .search("d", JurisdictionFilter::All)
      .await
      .unwrap();
    assert!(out.items.is_empty());
    assert!(out.sources_used.is_empty());
  }

  #[tokio::test]
  async fn malformed_query_is_an_error() {
    let err = CatalogSearch::offline()
      .search("dol\u{0}iprane", JurisdictionFilter::Fr)
      .await
      .unwrap_err();
    assert!(matches!(err, crate::Error::InvalidQuery(_)));
  }

  #[tokio::test]
  async fn results_are_capped() {
    let many = (0..30)
      .map(|n| item(&format!("PARA {n}"), "paracétamol", Jurisdiction::Fr, "bdpm"))
      .collect();
    let out = CatalogSearch::new(Arc::new(Listing("bdpm", many)), Arc::new(Hanging))
      .search("para", JurisdictionFilter::Fr)
      .await
      .unwrap();
    assert_eq!(out.items.len(), MAX_RESULTS);
  }

  #[test]
  fn scoring_is_additive() {
    let i = item("PARALYOC PARA", "paracétamol", Jurisdiction::Fr, "x");
    assert_eq!(score_item("para", &i), 175);
    assert_eq!(score_item("cétamol", &i), 25);
    assert_eq!(score_item("lyoc", &i), 50);
    assert_eq!(score_item("zzz", &i), 0);
  }

  #[test]
  fn fda_products_map_to_items() {
    let body = serde_json::json!({ "results": [
      {
        "product_ndc": "50580-451",
        "brand_name": "TYLENOL",
        "generic_name": "acetaminophen",
        "labeler_name": "Kenvue",
        "dosage_form": "TABLET",
        "active_ingredients": [ { "name": "ACETAMINOPHEN", "strength": "500 mg/1" } ]
      },
      { "product_ndc": "0000-000" }
    ] });
    let parsed: FdaResponse = serde_json::from_value(body).unwrap();
    let items: Vec<_> = parsed.results.into_iter().filter_map(fda_item).collect();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].strength.as_deref(), Some("500 mg/1"));
    assert_eq!(items[0].country, Jurisdiction::Us);
    assert_eq!(items[0].source, "openfda");
  }
}
