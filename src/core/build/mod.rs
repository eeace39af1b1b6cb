//! End-to-end build
//!
//! Drives a raw snapshot through normalization, aggregation and validation,
//! and publishes the result when no fatal rule failed.

pub mod lock;
pub mod pipeline;
pub mod summary;

pub use lock::BuildLock;
pub use pipeline::{BuildOptions, BuildPipeline};
pub use summary::{BuildOutcome, BuildSummary};
