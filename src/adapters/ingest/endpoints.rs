//! Download locations of every source

use crate::config::IngestConfig;
use crate::core::normalize::catalog::{
    FLEXIBLE_FLEET, HIGHWAY_TRAVEL_TIMES, SWITRS_DETAILED, SWITRS_SUMMARY, TRAFFIC_COLLISIONS,
    TRAFFIC_VOLUMES, TRANSIT_RIDERSHIP, TRANSIT_ROUTES, VMT_PEMS, YOUTH_OPP_PASS,
};
use crate::domain::RawFormat;

/// Where a source is published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Socrata resource, fetched as JSON with an explicit row limit
    Socrata { resource: &'static str, limit: u32 },
    /// Static CSV file on the city file host
    Seshat { path: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub source_id: &'static str,
    pub kind: EndpointKind,
}

impl Endpoint {
    pub fn format(&self) -> RawFormat {
        match self.kind {
            EndpointKind::Socrata { .. } => RawFormat::Json,
            EndpointKind::Seshat { .. } => RawFormat::Csv,
        }
    }

    pub fn url(&self, config: &IngestConfig) -> String {
        match self.kind {
            EndpointKind::Socrata { resource, limit } => format!(
                "{}/resource/{resource}.json?$limit={limit}",
                config.socrata_base_url.trim_end_matches('/')
            ),
            EndpointKind::Seshat { path } => {
                format!("{}/{path}", config.seshat_base_url.trim_end_matches('/'))
            }
        }
    }
}

const fn socrata(source_id: &'static str, resource: &'static str, limit: u32) -> Endpoint {
    Endpoint {
        source_id,
        kind: EndpointKind::Socrata { resource, limit },
    }
}

const fn seshat(source_id: &'static str, path: &'static str) -> Endpoint {
    Endpoint {
        source_id,
        kind: EndpointKind::Seshat { path },
    }
}

pub fn endpoint_catalog() -> Vec<Endpoint> {
    vec![
        socrata(TRANSIT_RIDERSHIP, "q5rv-a6w8", 5_000),
        socrata(VMT_PEMS, "kzvf-xgyu", 5_000),
        socrata(HIGHWAY_TRAVEL_TIMES, "sx8b-e5xp", 5_000),
        socrata(SWITRS_SUMMARY, "ta2f-7tx9", 5_000),
        socrata(SWITRS_DETAILED, "uzct-sb5t", 300_000),
        socrata(YOUTH_OPP_PASS, "34ep-6uyj", 150_000),
        socrata(FLEXIBLE_FLEET, "bkj2-54gq", 50_000),
        seshat(TRAFFIC_VOLUMES, "traffic_adt_counts/traffic_counts_datasd.csv"),
        seshat(TRAFFIC_COLLISIONS, "traffic_collisions/pd_collisions_datasd.csv"),
        seshat(TRANSIT_ROUTES, "gis_transit_routes/transit_routes_datasd.csv"),
    ]
}
