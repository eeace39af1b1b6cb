//! Domain error types
//!
//! Every failure the pipeline can surface is expressed here. Third-party error
//! types are converted at the boundary and never leak through the public API.

use thiserror::Error;

/// Main Corridor error type
#[derive(Debug, Error)]
pub enum CorridorError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A raw snapshot is missing or unreadable
    #[error("Source '{source_id}' unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// A raw snapshot no longer carries a column the adapter requires
    #[error("Schema drift in source '{source_id}': required column '{column}' is missing")]
    SchemaDrift { source_id: String, column: String },

    /// Aggregation could not be computed
    #[error("Transform error: {0}")]
    Transform(String),

    /// One or more fatal validation rules failed; nothing was published
    #[error("Data quality violation: fatal rules failed: {}", fatal_rules.join(", "))]
    DataQualityViolation { fatal_rules: Vec<String> },

    /// A build stopped before publishing; the listed tables were not built
    #[error("Build aborted ({cause}); unbuilt tables: {}", unbuilt.join(", "))]
    BuildAborted {
        cause: Box<CorridorError>,
        unbuilt: Vec<String>,
    },

    /// Another build holds the lock for this raw snapshot
    #[error("Build already in progress: {0}")]
    BuildInProgress(String),

    /// Read-side request rejected or failed
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// No aggregated store has been published yet
    #[error("No published aggregated store found at {0}")]
    NotPublished(String),

    /// Raw snapshot download errors
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

/// Errors raised by the query layer before or while running a view
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// View name not present in the view catalog
    #[error("Unknown view '{0}'")]
    UnknownView(String),

    /// Filter key outside the fixed key set
    #[error("Unknown filter key '{0}'")]
    UnknownFilter(String),

    /// Known filter key that the view does not accept
    #[error("Filter '{filter}' is not supported by view '{view}'")]
    UnsupportedFilter { view: String, filter: String },

    /// Filter value failed to parse or is out of range
    #[error("Invalid value for filter '{filter}': {reason}")]
    InvalidValue { filter: String, reason: String },

    /// Requested or returned rows exceed the view's budget
    #[error("View '{view}' exceeded its row budget of {budget}")]
    RowBudgetExceeded { view: String, budget: usize },

    /// Per-call timeout elapsed
    #[error("Query on view '{view}' timed out after {seconds}s")]
    Timeout { view: String, seconds: u64 },
}

impl CorridorError {
    /// Map the error onto the CLI exit code contract
    ///
    /// 2 configuration, 3 fatal validation, 4 source or store unavailable,
    /// 5 anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            CorridorError::Configuration(_) => 2,
            CorridorError::DataQualityViolation { .. } => 3,
            CorridorError::SourceUnavailable { .. }
            | CorridorError::NotPublished(_)
            | CorridorError::Database(_)
            | CorridorError::BuildInProgress(_) => 4,
            CorridorError::BuildAborted { cause, .. } => cause.exit_code(),
            _ => 5,
        }
    }
}

impl From<std::io::Error> for CorridorError {
    fn from(err: std::io::Error) -> Self {
        CorridorError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CorridorError {
    fn from(err: serde_json::Error) -> Self {
        CorridorError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CorridorError {
    fn from(err: toml::de::Error) -> Self {
        CorridorError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<csv::Error> for CorridorError {
    fn from(err: csv::Error) -> Self {
        CorridorError::Serialization(format!("CSV error: {err}"))
    }
}

impl From<tokio_postgres::Error> for CorridorError {
    fn from(err: tokio_postgres::Error) -> Self {
        CorridorError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_drift_names_source_and_column() {
        let err = CorridorError::SchemaDrift {
            source_id: "transit_ridership".to_string(),
            column: "calenadr_year".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("transit_ridership"));
        assert!(message.contains("calenadr_year"));
    }

    #[test]
    fn test_query_error_conversion() {
        let err: CorridorError = QueryError::UnknownView("nope".to_string()).into();
        assert!(matches!(err, CorridorError::Query(QueryError::UnknownView(_))));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CorridorError::Configuration("x".into()).exit_code(), 2);
        assert_eq!(
            CorridorError::DataQualityViolation {
                fatal_rules: vec!["a".into()]
            }
            .exit_code(),
            3
        );
        assert_eq!(CorridorError::NotPublished("/tmp".into()).exit_code(), 4);
        assert_eq!(CorridorError::Transform("x".into()).exit_code(), 5);
    }

    #[test]
    fn test_build_aborted_uses_cause_exit_code() {
        let err = CorridorError::BuildAborted {
            cause: Box::new(CorridorError::SourceUnavailable {
                source_id: "vmt_pems".into(),
                reason: "missing".into(),
            }),
            unbuilt: vec!["vmt_trends".into()],
        };
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("vmt_trends"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: CorridorError = io_err.into();
        assert!(matches!(err, CorridorError::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: CorridorError = toml_err.into();
        assert!(err.to_string().contains("TOML parse error"));
    }
}
