//! Validation Engine
//!
//! A catalog of declarative rules evaluated against the aggregated tables.
//! Every rule runs on every validation; a failed fatal rule makes the
//! snapshot unpublishable, warnings never block.

pub mod catalog;
pub mod engine;
pub mod report;
pub mod rule;

pub use catalog::{expected_columns, rule_catalog};
pub use engine::{evaluate, validate};
pub use report::{RuleResult, ValidationReport};
pub use rule::{RuleCheck, ValidationRule};
