//! Raw snapshot ingestion
//!
//! Downloads each source from the regional Socrata portal or the city file
//! host into the raw directory. Ingestion is a separate step from the build:
//! the build only ever reads what is already on disk.

pub mod client;
pub mod endpoints;

pub use client::{IngestOutcome, IngestSummary, RawIngestor, SourceIngest};
pub use endpoints::{endpoint_catalog, Endpoint, EndpointKind};
