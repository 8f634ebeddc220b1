//! Raw source loading.
//!
//! Each declared source maps one CSV file in the data directory to one raw
//! warehouse table. Tables are dropped and recreated on every load, with
//! column types inferred from the data, and all inserts for a table run in
//! a single transaction. A missing source file is a warning rather than an
//! error: its relation is simply absent, and downstream models that need it
//! fail their dependency pre-flight with a named error instead.

use std::path::Path;

use rusqlite::types::Value;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{LoadError, Result};
use crate::schema::{ColumnType, infer_schema, parse_csv};
use crate::warehouse::Warehouse;

/// Declarative description of one raw source.
#[derive(Debug, Clone, Copy)]
pub struct SourceSpec {
    /// File stem under the data directory ("users" reads users.csv).
    pub file: &'static str,
    /// Name of the raw relation this file becomes.
    pub relation: &'static str,
    /// Short description carried into the generated documentation.
    pub description: &'static str,
    /// Columns that must be strictly positive in every loaded row. Rows
    /// violating this would poison ratio math downstream, so the load fails
    /// outright rather than deferring the problem.
    pub positive_columns: &'static [&'static str],
}

/// The five raw sources of the e-commerce schema.
pub const SOURCES: &[SourceSpec] = &[
    SourceSpec {
        file: "users",
        relation: "raw_users",
        description: "Raw user accounts as exported to CSV",
        positive_columns: &[],
    },
    SourceSpec {
        file: "products",
        relation: "raw_products",
        description: "Raw product catalog with list price and cost",
        positive_columns: &["price"],
    },
    SourceSpec {
        file: "orders",
        relation: "raw_orders",
        description: "Raw order headers with status and total",
        positive_columns: &[],
    },
    SourceSpec {
        file: "order_items",
        relation: "raw_order_items",
        description: "Raw order line items priced at order time",
        positive_columns: &[],
    },
    SourceSpec {
        file: "events",
        relation: "raw_events",
        description: "Raw behavioral events from site tracking",
        positive_columns: &[],
    },
];

/// One successfully loaded source.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedSource {
    pub relation: String,
    pub rows: usize,
}

/// Outcome of a full load pass over the declared sources.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<LoadedSource>,
    /// Relations whose source file was absent.
    pub missing: Vec<String>,
}

impl LoadReport {
    pub fn rows_for(&self, relation: &str) -> Option<usize> {
        self.loaded
            .iter()
            .find(|s| s.relation == relation)
            .map(|s| s.rows)
    }
}

/// Load every declared source from `data_dir` into the warehouse.
pub fn load_sources(warehouse: &mut Warehouse, data_dir: &Path) -> Result<LoadReport> {
    let mut report = LoadReport::default();

    for spec in SOURCES {
        let path = data_dir.join(format!("{}.csv", spec.file));
        if !path.exists() {
            warn!(
                "Source file {} not found, skipping relation {}",
                path.display(),
                spec.relation
            );
            report.missing.push(spec.relation.to_string());
            continue;
        }

        let rows = load_source(warehouse, &path, spec)?;
        info!(relation = spec.relation, rows, "Loaded source");
        report.loaded.push(LoadedSource {
            relation: spec.relation.to_string(),
            rows,
        });
    }

    Ok(report)
}

/// Load a single source file. Returns the number of rows inserted.
fn load_source(warehouse: &mut Warehouse, path: &Path, spec: &SourceSpec) -> Result<usize> {
    let table = parse_csv(path)?;
    let schema = infer_schema(&table);

    let column_defs: Vec<String> = schema
        .iter()
        .map(|c| format!("{} {}", c.name, c.dtype.sql_name()))
        .collect();
    warehouse.execute_batch(&format!(
        "DROP TABLE IF EXISTS {rel};\nCREATE TABLE {rel} ({});",
        column_defs.join(", "),
        rel = spec.relation,
    ))?;

    let placeholders = vec!["?"; schema.len()].join(", ");
    let insert_sql = format!("INSERT INTO {} VALUES ({placeholders})", spec.relation);

    let tx = warehouse.transaction()?;
    {
        let mut stmt = tx.prepare(&insert_sql)?;
        for row in &table.rows {
            let values: Vec<Value> = row
                .iter()
                .zip(schema.iter())
                .map(|(raw, col)| bind_value(raw, col.dtype))
                .collect();
            stmt.execute(rusqlite::params_from_iter(values))?;
        }
    }
    tx.commit()?;

    for column in spec.positive_columns {
        let bad = warehouse.scalar_i64(&format!(
            "SELECT COUNT(*) FROM {} WHERE {column} <= 0",
            spec.relation
        ))?;
        if bad > 0 {
            return Err(LoadError::NonPositive {
                relation: spec.relation.to_string(),
                column: column.to_string(),
                rows: bad as usize,
            }
            .into());
        }
    }

    Ok(table.row_count())
}

/// Convert one raw CSV field to a SQLite value under the inferred type.
/// Empty fields become NULL; a field that fails to parse under its column's
/// type also degrades to NULL rather than aborting the load.
fn bind_value(raw: &str, dtype: ColumnType) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    match dtype {
        ColumnType::Integer => raw.parse::<i64>().map(Value::Integer).unwrap_or(Value::Null),
        ColumnType::Real => raw.parse::<f64>().map(Value::Real).unwrap_or(Value::Null),
        ColumnType::Text => Value::Text(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MartletError;

    fn data_dir_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn test_load_sources_creates_typed_tables() {
        let dir = data_dir_with(&[
            (
                "users.csv",
                "id,email,created_at\n1,a@example.com,2024-01-01T00:00:00\n2,b@example.com,2024-02-01T00:00:00\n",
            ),
            (
                "products.csv",
                "id,name,price,cost\n1,Product 1,19.99,8.00\n",
            ),
        ]);
        let mut wh = Warehouse::open_in_memory().unwrap();
        let report = load_sources(&mut wh, dir.path()).unwrap();

        assert_eq!(report.rows_for("raw_users"), Some(2));
        assert_eq!(report.rows_for("raw_products"), Some(1));
        assert_eq!(report.missing, vec!["raw_orders", "raw_order_items", "raw_events"]);

        // Types survived the round trip into SQLite storage classes
        let batch = wh
            .query("SELECT typeof(id), typeof(email), typeof(created_at) FROM raw_users LIMIT 1")
            .unwrap();
        assert_eq!(
            batch.rows[0],
            vec![
                serde_json::json!("integer"),
                serde_json::json!("text"),
                serde_json::json!("text")
            ]
        );
        let batch = wh.query("SELECT typeof(price) FROM raw_products").unwrap();
        assert_eq!(batch.rows[0][0], serde_json::json!("real"));
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = data_dir_with(&[]);
        let mut wh = Warehouse::open_in_memory().unwrap();
        let report = load_sources(&mut wh, dir.path()).unwrap();
        assert!(report.loaded.is_empty());
        assert_eq!(report.missing.len(), SOURCES.len());
    }

    #[test]
    fn test_reload_replaces_rows() {
        let dir = data_dir_with(&[("users.csv", "id\n1\n2\n3\n")]);
        let mut wh = Warehouse::open_in_memory().unwrap();
        load_sources(&mut wh, dir.path()).unwrap();
        load_sources(&mut wh, dir.path()).unwrap();
        assert_eq!(wh.count("raw_users").unwrap(), 3);
    }

    #[test]
    fn test_non_positive_price_fails_load() {
        let dir = data_dir_with(&[(
            "products.csv",
            "id,name,price,cost\n1,Product 1,19.99,8.00\n2,Product 2,0.00,1.00\n",
        )]);
        let mut wh = Warehouse::open_in_memory().unwrap();
        let err = load_sources(&mut wh, dir.path()).unwrap_err();
        match err {
            MartletError::Load(LoadError::NonPositive {
                relation,
                column,
                rows,
            }) => {
                assert_eq!(relation, "raw_products");
                assert_eq!(column, "price");
                assert_eq!(rows, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_fields_load_as_null() {
        let dir = data_dir_with(&[("users.csv", "id,state\n1,CA\n2,\n")]);
        let mut wh = Warehouse::open_in_memory().unwrap();
        load_sources(&mut wh, dir.path()).unwrap();
        let nulls = wh
            .scalar_i64("SELECT COUNT(*) FROM raw_users WHERE state IS NULL")
            .unwrap();
        assert_eq!(nulls, 1);
    }
}
