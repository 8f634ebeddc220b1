//! Error types for the Martlet pipeline core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering ingest, modeling, and artifact generation domains.

use std::path::PathBuf;

/// Top-level error type for the Martlet core library.
#[derive(Debug, thiserror::Error)]
pub enum MartletError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] rusqlite::Error),

    #[error("Template error: {0}")]
    Template(#[from] Box<handlebars::RenderError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from loading raw source files into the warehouse.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Source file has no header row: {path}")]
    MissingHeader { path: PathBuf },

    #[error("Row {line} of {path} has {found} fields, expected {expected}")]
    RaggedRow {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Relation '{relation}' has {rows} rows with non-positive {column}")]
    NonPositive {
        relation: String,
        column: String,
        rows: usize,
    },
}

/// Errors from building the model layers.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Relation '{relation}' required by '{needed_by}' does not exist")]
    MissingDependency { relation: String, needed_by: String },
}

/// A type alias for results using the top-level `MartletError`.
pub type Result<T> = std::result::Result<T, MartletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_load() {
        let err = MartletError::Load(LoadError::NonPositive {
            relation: "raw_products".into(),
            column: "price".into(),
            rows: 3,
        });
        assert_eq!(
            err.to_string(),
            "Load error: Relation 'raw_products' has 3 rows with non-positive price"
        );
    }

    #[test]
    fn test_error_display_missing_header() {
        let err = LoadError::MissingHeader {
            path: PathBuf::from("data/users.csv"),
        };
        assert_eq!(
            err.to_string(),
            "Source file has no header row: data/users.csv"
        );
    }

    #[test]
    fn test_error_display_ragged_row() {
        let err = LoadError::RaggedRow {
            path: PathBuf::from("data/orders.csv"),
            line: 17,
            expected: 5,
            found: 4,
        };
        assert_eq!(
            err.to_string(),
            "Row 17 of data/orders.csv has 4 fields, expected 5"
        );
    }

    #[test]
    fn test_error_display_missing_dependency() {
        let err = MartletError::Model(ModelError::MissingDependency {
            relation: "raw_events".into(),
            needed_by: "stg_events".into(),
        });
        assert_eq!(
            err.to_string(),
            "Model error: Relation 'raw_events' required by 'stg_events' does not exist"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MartletError = io_err.into();
        assert!(matches!(err, MartletError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: MartletError = serde_err.into();
        assert!(matches!(err, MartletError::Serialization(_)));
    }

    #[test]
    fn test_error_from_sqlite() {
        let sql_err = rusqlite::Error::InvalidQuery;
        let err: MartletError = sql_err.into();
        assert!(matches!(err, MartletError::Warehouse(_)));
    }
}
