//! Source Adapter Catalog
//!
//! Per-source normalization: column identity fixes, sentinel nulls, type
//! coercion with recorded cast failures, explicit boolean reconstruction,
//! canonical series filters and column pruning. Each source is described by
//! a declarative [`SourceAdapterSpec`] held in a registry keyed by source id.

pub mod catalog;
pub mod engine;
pub mod spec;

pub use catalog::{adapter_for, source_catalog};
pub use engine::{normalize, NormalizedRelation};
pub use spec::{BoolMapping, NormalizeStep, RowFilter, SourceAdapterSpec, SourceColumn};
