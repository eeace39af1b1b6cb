//! Aggregated store abstraction
//!
//! The build pipeline is the only writer; validation and the query layer
//! only read. Every read resolves the published build once at call start, so
//! a concurrent publish is seen either entirely or not at all.

use crate::config::StoreTarget;
use crate::core::query::{QueryPlan, QueryRows};
use crate::core::transform::{AggregatedSnapshot, AggregatedTable, StoreManifest};
use crate::domain::{BuildId, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait AggregateStore: Send + Sync {
    fn backend(&self) -> StoreTarget;

    /// Human-readable location, with credentials redacted
    fn location(&self) -> String;

    /// Replaces the published tables with `snapshot`, all or nothing
    ///
    /// # Errors
    ///
    /// On error the previously published build stays current.
    async fn publish(
        &self,
        snapshot: &AggregatedSnapshot,
        build_id: &BuildId,
        built_at: DateTime<Utc>,
    ) -> Result<StoreManifest>;

    /// Manifest of the current build, `None` before the first publish
    async fn current_manifest(&self) -> Result<Option<StoreManifest>>;

    /// One table of the current build
    ///
    /// # Errors
    ///
    /// Returns [`crate::domain::CorridorError::NotPublished`] before the first
    /// publish.
    async fn load_table(&self, name: &str) -> Result<AggregatedTable>;

    /// Every table of the current build, read from a single build
    async fn load_snapshot(&self) -> Result<AggregatedSnapshot>;

    /// Runs one plan against the current build
    async fn run_query(&self, plan: &QueryPlan) -> Result<QueryRows>;
}
