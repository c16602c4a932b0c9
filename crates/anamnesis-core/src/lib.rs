//! Core types and trait definitions for the Anamnesis antecedent store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! It owns the data model, the reconciliation of curated and embedded
//! history entries, and the validation workflow that mutates curated rows.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clinician;
pub mod document;
pub mod entry;
pub mod error;
pub mod exclusion;
pub mod reconcile;
pub mod store;
pub mod workflow;

pub use error::{Error, Result};
