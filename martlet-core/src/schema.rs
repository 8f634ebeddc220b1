//! CSV parsing and column type inference for raw sources.
//!
//! Source files are plain comma-separated text with a header row. Values
//! carry no type information, so the loader infers one SQL storage type per
//! column from the data before creating the raw table.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};

/// Timestamp layout used throughout the raw data. Naive seconds-precision
/// ISO-8601, the form SQLite's date functions parse directly.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// SQL storage type for a raw column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    /// The type name used in `CREATE TABLE` statements.
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Inferred schema for a single raw column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnType,
}

/// A parsed CSV file: header names plus untyped string rows.
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Parse a CSV file into header and rows.
///
/// Fields are trimmed and surrounding double quotes stripped. Blank lines are
/// skipped. A row whose field count differs from the header is an error, as
/// is a file with no header row at all.
pub fn parse_csv(path: &Path) -> Result<CsvTable> {
    let content = std::fs::read_to_string(path)?;
    let mut lines = content.lines().enumerate();

    let columns: Vec<String> = lines
        .next()
        .ok_or_else(|| LoadError::MissingHeader {
            path: path.to_path_buf(),
        })?
        .1
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect();

    let mut rows = Vec::new();
    for (idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let row: Vec<String> = line
            .split(',')
            .map(|s| s.trim().trim_matches('"').to_string())
            .collect();
        if row.len() != columns.len() {
            return Err(LoadError::RaggedRow {
                path: path.to_path_buf(),
                line: idx + 1,
                expected: columns.len(),
                found: row.len(),
            }
            .into());
        }
        rows.push(row);
    }

    Ok(CsvTable { columns, rows })
}

/// Infer the storage type of one column from its raw string values.
///
/// Precedence is integer, then real, then text: a column is INTEGER only if
/// every non-empty value parses as i64, REAL if every non-empty value parses
/// as f64, TEXT otherwise. Empty strings count as missing and do not affect
/// the inference.
pub fn infer_column_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut has_real = false;
    let mut seen_any = false;

    for v in values {
        if v.is_empty() {
            continue;
        }
        seen_any = true;
        if v.parse::<i64>().is_ok() {
            continue;
        }
        if v.parse::<f64>().is_ok() {
            has_real = true;
            continue;
        }
        return ColumnType::Text;
    }

    if !seen_any {
        // All values missing: fall back to TEXT, the most permissive affinity.
        return ColumnType::Text;
    }
    if has_real {
        ColumnType::Real
    } else {
        ColumnType::Integer
    }
}

/// Infer a full schema from a parsed CSV table.
pub fn infer_schema(table: &CsvTable) -> Vec<ColumnSchema> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| ColumnSchema {
            name: name.clone(),
            dtype: infer_column_type(table.rows.iter().filter_map(|r| r.get(i).map(|s| s.as_str()))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MartletError;

    fn write_csv(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_csv_basic() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_csv(&dir, "users.csv", "id,email\n1,a@example.com\n2,b@example.com\n");
        let table = parse_csv(&path).unwrap();
        assert_eq!(table.columns, vec!["id", "email"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[1], vec!["2", "b@example.com"]);
    }

    #[test]
    fn test_parse_csv_strips_quotes_and_whitespace() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_csv(&dir, "q.csv", "\"name\", category\n\"Product 1\" , Books\n");
        let table = parse_csv(&path).unwrap();
        assert_eq!(table.columns, vec!["name", "category"]);
        assert_eq!(table.rows[0], vec!["Product 1", "Books"]);
    }

    #[test]
    fn test_parse_csv_skips_blank_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_csv(&dir, "b.csv", "id\n1\n\n2\n");
        let table = parse_csv(&path).unwrap();
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_parse_csv_empty_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_csv(&dir, "empty.csv", "");
        let err = parse_csv(&path).unwrap_err();
        assert!(matches!(
            err,
            MartletError::Load(LoadError::MissingHeader { .. })
        ));
    }

    #[test]
    fn test_parse_csv_ragged_row_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_csv(&dir, "r.csv", "a,b,c\n1,2,3\n4,5\n");
        let err = parse_csv(&path).unwrap_err();
        match err {
            MartletError::Load(LoadError::RaggedRow {
                line,
                expected,
                found,
                ..
            }) => {
                assert_eq!(line, 3);
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_infer_integer_column() {
        let values = ["1", "42", "-7"];
        assert_eq!(
            infer_column_type(values.iter().copied()),
            ColumnType::Integer
        );
    }

    #[test]
    fn test_infer_real_column() {
        let values = ["19.99", "5", "250.00"];
        assert_eq!(infer_column_type(values.iter().copied()), ColumnType::Real);
    }

    #[test]
    fn test_infer_text_column() {
        let values = ["2024-01-15T10:00:00", "2024-02-01T00:00:00"];
        assert_eq!(infer_column_type(values.iter().copied()), ColumnType::Text);
    }

    #[test]
    fn test_infer_ignores_empty_values() {
        let values = ["", "3", ""];
        assert_eq!(
            infer_column_type(values.iter().copied()),
            ColumnType::Integer
        );
    }

    #[test]
    fn test_infer_all_empty_is_text() {
        let values = ["", ""];
        assert_eq!(infer_column_type(values.iter().copied()), ColumnType::Text);
    }

    #[test]
    fn test_infer_schema_per_column() {
        let table = CsvTable {
            columns: vec!["id".into(), "price".into(), "name".into()],
            rows: vec![
                vec!["1".into(), "19.99".into(), "Widget".into()],
                vec!["2".into(), "5.00".into(), "Gadget".into()],
            ],
        };
        let schema = infer_schema(&table);
        assert_eq!(schema[0].dtype, ColumnType::Integer);
        assert_eq!(schema[1].dtype, ColumnType::Real);
        assert_eq!(schema[2].dtype, ColumnType::Text);
        assert_eq!(schema[2].name, "name");
    }

    #[test]
    fn test_sql_names() {
        assert_eq!(ColumnType::Integer.sql_name(), "INTEGER");
        assert_eq!(ColumnType::Real.sql_name(), "REAL");
        assert_eq!(ColumnType::Text.sql_name(), "TEXT");
    }
}
