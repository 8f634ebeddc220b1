//! End-to-end run orchestration.
//!
//! A `Pipeline` drives one batch run in a fixed order: load the raw CSVs,
//! rebuild every model view bottom-up, validate the marts, then emit the
//! documentation snapshot, the reporting catalog and the dashboard page.
//! Paths and the run anchor are resolved once at construction, so every
//! stage sees the same picture of the run. Load and build failures abort
//! with `?`; failing validation checks are collected into the summary and
//! never abort.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{run_catalog, write_catalog};
use crate::checks::{CheckReport, DEFAULT_CHECKS, run_checks};
use crate::config::{PathsConfig, PipelineConfig};
use crate::dashboard::write_dashboard;
use crate::docs::{build_snapshot, write_snapshot};
use crate::error::Result;
use crate::ingest::{LoadReport, load_sources};
use crate::models::{BuiltModel, Layer, build_models};
use crate::synth::{SynthReport, generate};
use crate::warehouse::{QueryBatch, Warehouse};

/// Everything one full run writes, already resolved to absolute paths.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactPaths {
    pub database: PathBuf,
    pub docs: PathBuf,
    pub queries_dir: PathBuf,
    pub manifest: PathBuf,
    pub dashboard: PathBuf,
}

/// Arithmetic spot check over the finished fact layer: a few sample order
/// lines plus the count of rows whose stored `line_total` disagrees with
/// `quantity * unit_price` by more than a cent.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub sample: QueryBatch,
    pub mismatches: i64,
}

/// What one full run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub as_of: DateTime<Utc>,
    pub load: LoadReport,
    pub models: Vec<BuiltModel>,
    pub checks: CheckReport,
    pub queries_validated: usize,
    pub verification: Verification,
    pub artifacts: ArtifactPaths,
}

impl RunSummary {
    /// Number of built models in one layer.
    pub fn layer_count(&self, layer: Layer) -> usize {
        self.models.iter().filter(|m| m.layer == layer).count()
    }
}

/// Orchestrates the stages of a run against one workspace.
pub struct Pipeline {
    config: PipelineConfig,
    paths: PathsConfig,
    as_of: DateTime<Utc>,
}

impl Pipeline {
    /// Bind a configuration to a workspace root and a run anchor.
    ///
    /// Configuration warnings are logged here, once, rather than by each
    /// stage that trips over them.
    pub fn new(config: PipelineConfig, workspace: &Path, as_of: DateTime<Utc>) -> Self {
        for warning in config.validate() {
            warn!("{warning}");
        }
        let paths = config.paths.resolved(workspace);
        Self {
            config,
            paths,
            as_of,
        }
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths {
            database: self.paths.database.clone(),
            docs: self.paths.out_dir.join("docs.json"),
            queries_dir: self.paths.out_dir.join("queries"),
            manifest: self.paths.out_dir.join("queries.json"),
            dashboard: self.paths.out_dir.join("dashboard.html"),
        }
    }

    /// Generate the synthetic source CSVs into the data directory.
    pub fn seed(&self) -> Result<SynthReport> {
        generate(&self.config.synth, &self.paths.data_dir, self.as_of)
    }

    /// Open the file-backed warehouse this pipeline is configured for.
    pub fn open_warehouse(&self) -> Result<Warehouse> {
        Warehouse::open(&self.paths.database)
    }

    /// Load every raw source present in the data directory.
    pub fn load(&self, warehouse: &mut Warehouse) -> Result<LoadReport> {
        load_sources(warehouse, &self.paths.data_dir)
    }

    /// Rebuild all model views from the loaded raw relations.
    pub fn build(&self, warehouse: &Warehouse) -> Result<Vec<BuiltModel>> {
        build_models(warehouse, self.as_of)
    }

    /// Run the default validation battery.
    pub fn check(&self, warehouse: &Warehouse) -> CheckReport {
        let report = run_checks(warehouse, DEFAULT_CHECKS);
        if report.all_passed() {
            info!(
                passed = report.passed(),
                total = report.total(),
                "All checks passed"
            );
        } else {
            warn!(
                passed = report.passed(),
                total = report.total(),
                unhealthy = ?report.unhealthy(),
                "Validation found problems"
            );
        }
        report
    }

    /// Build the docs snapshot and write it to the output directory.
    pub fn document(&self, warehouse: &Warehouse, checks: &CheckReport) -> Result<PathBuf> {
        let snapshot = build_snapshot(warehouse, &self.config.project, checks, self.as_of)?;
        let path = self.artifact_paths().docs;
        write_snapshot(&snapshot, &path)?;
        Ok(path)
    }

    /// Validate every reporting query against the live marts, then persist
    /// the anchored SQL files and their manifest.
    pub fn publish_catalog(&self, warehouse: &Warehouse) -> Result<usize> {
        let results = run_catalog(warehouse, self.as_of)?;
        write_catalog(&self.paths.out_dir, self.as_of)?;
        Ok(results.len())
    }

    /// Render the dashboard page and write it to the output directory.
    pub fn render_dashboard(&self, warehouse: &Warehouse) -> Result<PathBuf> {
        let path = self.artifact_paths().dashboard;
        write_dashboard(warehouse, &self.config.dashboard, self.as_of, &path)?;
        Ok(path)
    }

    /// Spot-check the fact layer's stored arithmetic.
    pub fn verify(&self, warehouse: &Warehouse) -> Result<Verification> {
        let sample = warehouse.query(
            "SELECT order_id, product_id, quantity, unit_price, line_total \
             FROM fct_orders LIMIT 3",
        )?;
        let mismatches = warehouse.scalar_i64(
            "SELECT COALESCE(SUM(CASE WHEN ABS(line_total - (quantity * unit_price)) > 0.01 \
             THEN 1 ELSE 0 END), 0) FROM fct_orders",
        )?;
        if mismatches > 0 {
            warn!(mismatches, "line_total disagrees with quantity * unit_price");
        } else {
            info!(
                sampled = sample.row_count(),
                "Fact arithmetic spot check clean"
            );
        }
        Ok(Verification { sample, mismatches })
    }

    /// The whole run: load, build, check, document, catalog, dashboard.
    pub fn run(&self) -> Result<RunSummary> {
        info!(as_of = %self.as_of, "Pipeline run starting");

        let mut warehouse = self.open_warehouse()?;
        let load = self.load(&mut warehouse)?;
        let models = self.build(&warehouse)?;
        let checks = self.check(&warehouse);
        self.document(&warehouse, &checks)?;
        let queries_validated = self.publish_catalog(&warehouse)?;
        self.render_dashboard(&warehouse)?;
        let verification = self.verify(&warehouse)?;
        warehouse.close()?;

        let summary = RunSummary {
            as_of: self.as_of,
            load,
            models,
            checks,
            queries_validated,
            verification,
            artifacts: self.artifact_paths(),
        };
        info!(
            staging = summary.layer_count(Layer::Staging),
            dimensions = summary.layer_count(Layer::Dimension),
            facts = summary.layer_count(Layer::Fact),
            checks_passed = summary.checks.passed(),
            checks_total = summary.checks.total(),
            "Pipeline run finished"
        );
        Ok(summary)
    }
}
