//! JSON API for the Anamnesis antecedent workflow and search aggregators.
//!
//! Exposes an axum [`Router`] backed by any store implementing the record,
//! document and relationship traits of `anamnesis-core`. Every route
//! requires HTTP Basic credentials that resolve to a configured clinician.

pub mod antecedents;
pub mod auth;
pub mod catalog;
pub mod error;
pub mod history;
pub mod terminology;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anamnesis_core::{
  store::{DocumentStore, RecordStore, RelationshipStore},
  workflow::AntecedentService,
};
use anamnesis_search::{
  Provider,
  catalog::{
    CatalogItem, CatalogQuery, CatalogSearch, HttpCatalog, Jurisdiction, OpenFdaCatalog,
    Unconfigured,
  },
  terminology::{
    HttpVocabulary, SearchCandidate, StaticVocabulary, TerminologyQuery, TerminologySearch,
    Vocabulary,
  },
};
use axum::{
  Router,
  routing::{delete, get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, ClinicianAccount};

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  #[serde(default)]
  pub clinicians: Vec<ClinicianAccount>,
  #[serde(default)]
  pub search:     SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
  #[serde(default = "default_provider_timeout_ms")]
  pub provider_timeout_ms: u64,
  #[serde(default)]
  pub terminology:         TerminologyConfig,
  #[serde(default)]
  pub catalog:             CatalogConfig,
}

/// Vocabulary endpoints; an unset URL selects the built-in vocabulary.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TerminologyConfig {
  pub cim11_url: Option<String>,
  pub cisp2_url: Option<String>,
}

/// Catalog endpoints; an unset URL always falls back to the seed catalog.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CatalogConfig {
  pub fr_url: Option<String>,
  pub us_url: Option<String>,
}

fn default_provider_timeout_ms() -> u64 { 5_000 }

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      provider_timeout_ms: default_provider_timeout_ms(),
      terminology:         TerminologyConfig::default(),
      catalog:             CatalogConfig::default(),
    }
  }
}

impl SearchConfig {
  pub fn provider_timeout(&self) -> Duration { Duration::from_millis(self.provider_timeout_ms) }

  pub fn terminology_search(&self, client: &reqwest::Client) -> TerminologySearch {
    let vocabulary = |v: Vocabulary, url: &Option<String>| -> Arc<dyn Provider<TerminologyQuery, SearchCandidate>> {
      match url {
        Some(url) => Arc::new(HttpVocabulary::new(v, url.clone(), client.clone())),
        None => Arc::new(StaticVocabulary::builtin(v)),
      }
    };
    TerminologySearch::new(
      vocabulary(Vocabulary::Cim11, &self.terminology.cim11_url),
      vocabulary(Vocabulary::Cisp2, &self.terminology.cisp2_url),
    )
    .with_timeout(self.provider_timeout())
  }

  pub fn catalog_search(&self, client: &reqwest::Client) -> CatalogSearch {
    let fr: Arc<dyn Provider<CatalogQuery, CatalogItem>> = match &self.catalog.fr_url {
      Some(url) => Arc::new(HttpCatalog::new("bdpm", Jurisdiction::Fr, url.clone(), client.clone())),
      None => Arc::new(Unconfigured(Jurisdiction::Fr)),
    };
    let us: Arc<dyn Provider<CatalogQuery, CatalogItem>> = match &self.catalog.us_url {
      Some(url) => Arc::new(OpenFdaCatalog::new(url.clone(), client.clone())),
      None => Arc::new(Unconfigured(Jurisdiction::Us)),
    };
    CatalogSearch::new(fr, us).with_timeout(self.provider_timeout())
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// A single backend serving every store trait.
pub trait Backend:
  RecordStore + DocumentStore + RelationshipStore + Send + Sync + 'static
{
}

impl<T> Backend for T where
  T: RecordStore + DocumentStore + RelationshipStore + Send + Sync + 'static
{
}

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub service:     AntecedentService<S, S, S>,
  pub terminology: TerminologySearch,
  pub catalog:     CatalogSearch,
  pub auth:        Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      service:     self.service.clone(),
      terminology: self.terminology.clone(),
      catalog:     self.catalog.clone(),
      auth:        Arc::clone(&self.auth),
    }
  }
}

impl<S: Backend> AppState<S> {
  pub fn new(
    store: Arc<S>,
    auth: AuthConfig,
    terminology: TerminologySearch,
    catalog: CatalogSearch,
  ) -> Self {
    Self {
      service: AntecedentService::new(Arc::clone(&store), Arc::clone(&store), store),
      terminology,
      catalog,
      auth: Arc::new(auth),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
pub fn router<S: Backend>(state: AppState<S>) -> Router {
  Router::new()
    // History and antecedents
    .route("/patients/{patient_id}/history", get(history::get::<S>))
    .route("/patients/{patient_id}/antecedents", post(antecedents::add::<S>))
    .route("/patients/{patient_id}/antecedents/{entry_id}", delete(antecedents::remove::<S>))
    .route(
      "/patients/{patient_id}/antecedents/{entry_id}/validate",
      post(antecedents::validate::<S>),
    )
    .route(
      "/patients/{patient_id}/antecedents/{entry_id}/annotate",
      post(antecedents::annotate::<S>),
    )
    .route(
      "/patients/{patient_id}/antecedents/{entry_id}/promote",
      post(antecedents::promote::<S>),
    )
    // Search
    .route("/terminology/search", get(terminology::search::<S>))
    .route("/catalog/search", get(catalog::search::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
