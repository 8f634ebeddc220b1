//! The embedded warehouse handle.
//!
//! A `Warehouse` wraps a single SQLite connection, opened once per pipeline
//! run and passed by reference through every stage. There is no global
//! connection and no pooling; the pipeline is strictly sequential, so one
//! handle is the whole story. Dropping the handle closes the database, but
//! `close()` is preferred at the end of a run because it surfaces errors.

use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A batch of query results: column names plus rows of JSON values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryBatch {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Index of a named column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at (row index, column name). `None` if either is out of range.
    pub fn value(&self, row: usize, column: &str) -> Option<&serde_json::Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// All values of a named column as f64, skipping non-numeric cells.
    pub fn column_f64(&self, name: &str) -> Vec<f64> {
        match self.column_index(name) {
            Some(idx) => self
                .rows
                .iter()
                .filter_map(|r| r.get(idx).and_then(|v| v.as_f64()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// All values of a named column as i64, skipping non-integer cells.
    pub fn column_i64(&self, name: &str) -> Vec<i64> {
        match self.column_index(name) {
            Some(idx) => self
                .rows
                .iter()
                .filter_map(|r| r.get(idx).and_then(|v| v.as_i64()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// All values of a named column as strings, skipping non-text cells.
    pub fn column_str(&self, name: &str) -> Vec<String> {
        match self.column_index(name) {
            Some(idx) => self
                .rows
                .iter()
                .filter_map(|r| r.get(idx).and_then(|v| v.as_str()).map(str::to_string))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Handle to the embedded analytic database.
pub struct Warehouse {
    conn: Connection,
}

impl Warehouse {
    /// Open (or create) a file-backed warehouse.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open a private in-memory warehouse. Used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Execute one or more statements, discarding results.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Begin a transaction. The loader wraps each table's inserts in one.
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Run a query and collect every row as JSON values.
    pub fn query(&self, sql: &str) -> Result<QueryBatch> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let columns: Vec<String> = (0..column_count)
            .map(|i| stmt.column_name(i).unwrap_or("?").to_string())
            .collect();

        let mut rows = Vec::new();
        let mut result_rows = stmt.query([])?;
        while let Some(row) = result_rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let val = match row.get_ref(i) {
                    Ok(rusqlite::types::ValueRef::Null) => serde_json::Value::Null,
                    Ok(rusqlite::types::ValueRef::Integer(n)) => serde_json::json!(n),
                    Ok(rusqlite::types::ValueRef::Real(f)) => serde_json::Number::from_f64(f)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null),
                    Ok(rusqlite::types::ValueRef::Text(t)) => {
                        serde_json::Value::String(String::from_utf8_lossy(t).into_owned())
                    }
                    Ok(rusqlite::types::ValueRef::Blob(_)) => {
                        serde_json::Value::String("<blob>".to_string())
                    }
                    Err(_) => serde_json::Value::Null,
                };
                values.push(val);
            }
            rows.push(values);
        }

        Ok(QueryBatch { columns, rows })
    }

    /// Run a query expected to return a single integer.
    pub fn scalar_i64(&self, sql: &str) -> Result<i64> {
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }

    /// `COUNT(*)` of a relation.
    pub fn count(&self, relation: &str) -> Result<i64> {
        self.scalar_i64(&format!("SELECT COUNT(*) FROM {relation}"))
    }

    /// Whether a table or view with this name exists.
    pub fn relation_exists(&self, name: &str) -> Result<bool> {
        let found: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1 AND type IN ('table', 'view')",
            [name],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }

    /// Close the connection, surfacing any pending error.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }
}
