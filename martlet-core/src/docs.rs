//! Documentation snapshot generation.
//!
//! The snapshot is assembled from the model registry, the source registry
//! and live relation state, so it can be regenerated at any moment without
//! run history. It is a point-in-time picture, not an accumulating log: the
//! same warehouse contents and anchor always produce the same document.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::checks::{CheckReport, CheckResult};
use crate::error::Result;
use crate::ingest::SOURCES;
use crate::models::{Layer, MODELS, ModelSpec, models_in};
use crate::persistence::atomic_write_json;
use crate::warehouse::Warehouse;

/// The complete documentation/metadata document written to `docs.json`.
#[derive(Debug, Clone, Serialize)]
pub struct DocsSnapshot {
    pub project: String,
    /// Run anchor in RFC 3339, not wall clock, so regeneration with the
    /// same anchor is byte-identical.
    pub generated_at: String,
    pub models: ModelTree,
    pub tests: Vec<CheckResult>,
    /// Live row counts for raw and mart relations. Relations absent from
    /// the warehouse (a skipped source file) are omitted rather than
    /// reported as zero.
    pub row_counts: BTreeMap<String, i64>,
    pub descriptions: BTreeMap<String, String>,
    pub sources: BTreeMap<String, String>,
    pub models_detailed: BTreeMap<String, ModelDetail>,
    pub layers: LayerTree,
}

/// Relation names grouped by layer.
#[derive(Debug, Clone, Serialize)]
pub struct ModelTree {
    pub raw: Vec<String>,
    pub staging: Vec<String>,
    pub marts: MartTree,
}

#[derive(Debug, Clone, Serialize)]
pub struct MartTree {
    pub dimensions: Vec<String>,
    pub facts: Vec<String>,
}

/// Full per-model documentation: prose, grain, lineage and column glossary.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDetail {
    pub description: String,
    pub grain: String,
    pub sources: Vec<String>,
    pub columns: Vec<ColumnDoc>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub use_case: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl ModelDetail {
    fn from_spec(spec: &ModelSpec) -> Self {
        Self {
            description: spec.description.to_string(),
            grain: spec.grain.to_string(),
            sources: spec.sources.iter().map(|s| s.to_string()).collect(),
            columns: spec
                .columns
                .iter()
                .map(|c| ColumnDoc {
                    name: c.name.to_string(),
                    description: c.description.to_string(),
                })
                .collect(),
            use_case: spec.use_case.to_string(),
            notes: spec.notes.to_string(),
        }
    }
}

/// One glossary entry. Kept as an array element rather than a map key so
/// the glossary preserves the view's column order.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDoc {
    pub name: String,
    pub description: String,
}

/// Per-layer contracts.
#[derive(Debug, Clone, Serialize)]
pub struct LayerTree {
    pub raw: LayerDoc,
    pub staging: LayerDoc,
    pub marts: MartLayerDoc,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerDoc {
    pub description: String,
    pub tables: Vec<String>,
    pub contract: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MartLayerDoc {
    pub description: String,
    pub dimensions: Vec<String>,
    pub facts: Vec<String>,
    pub contract: String,
}

/// Assemble the snapshot from the registries, live row counts and the
/// latest validation report.
pub fn build_snapshot(
    warehouse: &Warehouse,
    project: &str,
    checks: &CheckReport,
    as_of: DateTime<Utc>,
) -> Result<DocsSnapshot> {
    let raw: Vec<String> = SOURCES.iter().map(|s| s.relation.to_string()).collect();
    let staging: Vec<String> = models_in(Layer::Staging)
        .map(|m| m.name.to_string())
        .collect();
    let dimensions: Vec<String> = models_in(Layer::Dimension)
        .map(|m| m.name.to_string())
        .collect();
    let facts: Vec<String> = models_in(Layer::Fact).map(|m| m.name.to_string()).collect();

    let mut row_counts = BTreeMap::new();
    for relation in raw.iter().chain(dimensions.iter()).chain(facts.iter()) {
        if warehouse.relation_exists(relation)? {
            row_counts.insert(relation.clone(), warehouse.count(relation)?);
        }
    }

    let descriptions: BTreeMap<String, String> = MODELS
        .iter()
        .map(|m| (m.name.to_string(), m.description.to_string()))
        .collect();
    let sources: BTreeMap<String, String> = SOURCES
        .iter()
        .map(|s| (s.relation.to_string(), s.description.to_string()))
        .collect();
    let models_detailed: BTreeMap<String, ModelDetail> = MODELS
        .iter()
        .map(|m| (m.name.to_string(), ModelDetail::from_spec(m)))
        .collect();

    let layers = LayerTree {
        raw: LayerDoc {
            description: "Raw relations loaded 1:1 from the source CSV files, column types inferred, values otherwise untouched.".to_string(),
            tables: raw.clone(),
            contract: "Source of truth; no transformations.".to_string(),
        },
        staging: LayerDoc {
            description: "Typed views over raw: casts, renames and simple derived columns. No joins, no aggregation.".to_string(),
            tables: staging.clone(),
            contract: "One row per source entity, 1:1 with the raw relation.".to_string(),
        },
        marts: MartLayerDoc {
            description: "Business-ready layer: dimensions describe entities, facts measure processes.".to_string(),
            dimensions: dimensions.clone(),
            facts: facts.clone(),
            contract: "Unique grain per fact; foreign keys resolve against the dimensions.".to_string(),
        },
    };

    Ok(DocsSnapshot {
        project: project.to_string(),
        generated_at: as_of.to_rfc3339(),
        models: ModelTree {
            raw,
            staging,
            marts: MartTree { dimensions, facts },
        },
        tests: checks.results.clone(),
        row_counts,
        descriptions,
        sources,
        models_detailed,
        layers,
    })
}

/// Write the snapshot to disk as pretty-printed JSON.
pub fn write_snapshot(snapshot: &DocsSnapshot, path: &Path) -> Result<()> {
    atomic_write_json(path, snapshot)?;
    info!(path = %path.display(), "Wrote documentation snapshot");
    Ok(())
}
