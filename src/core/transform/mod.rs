//! Transform Engine
//!
//! Turns normalized source relations into the fixed catalog of aggregated
//! tables. Each table is a declarative [`TableDefinition`]: optional row
//! filters, a projection or a grouping with measures, an optional lookup
//! against the route reference relation, and a total ordering.
//!
//! Output is deterministic: an unchanged raw snapshot yields byte-identical
//! table payloads.

pub mod catalog;
pub mod definition;
pub mod engine;
pub mod snapshot;

pub use catalog::{
    auxiliary_catalog, table_catalog, table_definition, unbuilt_tables, ROUTE_REFERENCE,
    YOUTH_PASS_COMMUNITIES,
};
pub use definition::{Measure, RowBand, TableDefinition, TableShape};
pub use engine::{build_aggregates, build_table};
pub use snapshot::{AggregatedSnapshot, AggregatedTable, Lineage, StoreManifest, TableManifest};
