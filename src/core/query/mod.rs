//! Query Layer
//!
//! Parameterized, injection-safe reads over the published tables:
//!
//! 1. [`views`] - the static view catalog (the only source of column names)
//! 2. [`predicate`] - filter validation and `(predicate, bound values)` building
//! 3. [`plan`] - executable plans, rendered as SQL or evaluated in memory
//! 4. [`service`] - per-call execution with timeout and row budgets, plus the
//!    composite `filter_options` and `overview` helpers

pub mod plan;
pub mod predicate;
pub mod service;
pub mod views;

pub use plan::{Projection, QueryPlan, QueryRows};
pub use predicate::{build_predicate, Predicate};
pub use service::{FilterOptions, Overview, QueryRequest, QueryService};
pub use views::{view_catalog, view_definition, FilterKey, ViewDefinition};
