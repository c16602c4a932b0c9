//! Search aggregation for the Anamnesis portal.
//!
//! Both searches fan a query out to several upstream providers
//! concurrently, bound each branch by a timeout, and merge whatever came
//! back through one generic [`aggregate`] routine. Provider failures never
//! reach the caller: terminology search degrades to the vocabularies that
//! answered, catalog search falls back to a built-in seed catalog.

pub mod aggregate;
pub mod catalog;
pub mod error;
pub mod terminology;

pub use aggregate::{Aggregated, Provider, Ranking, Source, aggregate};
pub use error::{Error, ProviderError, Result};
