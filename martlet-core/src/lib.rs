//! # Martlet Core
//!
//! Core library for the martlet analytics pipeline.
//! Provides the synthetic source generator, CSV ingest, the embedded
//! warehouse handle, the declarative model registry, the validation suite,
//! and the documentation, catalog and dashboard emitters.

pub mod catalog;
pub mod checks;
pub mod config;
pub mod dashboard;
pub mod docs;
pub mod error;
pub mod ingest;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod schema;
pub mod synth;
pub mod warehouse;

// Re-export commonly used types at the crate root.
pub use catalog::{CATALOG, CatalogQuery, CatalogResult};
pub use checks::{CheckKind, CheckReport, CheckResult, CheckStatus, DEFAULT_CHECKS, run_checks};
pub use config::{PipelineConfig, config_exists, load_config};
pub use error::{MartletError, Result};
pub use ingest::{LoadReport, SOURCES, load_sources};
pub use models::{BuiltModel, Layer, MODELS, ModelSpec, build_models};
pub use pipeline::{Pipeline, RunSummary};
pub use warehouse::{QueryBatch, Warehouse};
