//! Domain models and types for Corridor.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Identifiers** ([`SourceId`], [`TableName`], [`BuildId`])
//! - **Typed cells and relations** ([`Value`], [`SemanticType`], [`Relation`], [`RawDataset`])
//! - **Data-quality signals** ([`CastFailure`], [`FilterAudit`], [`NormalizationStats`])
//! - **Error types** ([`CorridorError`], [`QueryError`]) and the [`Result`] alias
//!
//! ```rust
//! use corridor::domain::{SemanticType, Value};
//!
//! let year = Value::Int(2021);
//! assert_eq!(year.as_i64(), Some(2021));
//! assert_eq!(SemanticType::Integer.sql_type(), "BIGINT");
//! ```

pub mod errors;
pub mod ids;
pub mod quality;
pub mod relation;
pub mod result;
pub mod value;

pub use errors::{CorridorError, QueryError};
pub use ids::{BuildId, SourceId, TableName};
pub use quality::{CastFailure, CastFailureSummary, FilterAudit, NormalizationStats, Severity};
pub use relation::{Column, RawDataset, RawFormat, Relation, Row};
pub use result::Result;
pub use value::{SemanticType, Value};
