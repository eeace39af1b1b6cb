//! Adapter registry for the ten raw sources

use super::spec::{
    optional, renamed, required, BoolMapping, NormalizeStep, RowFilter, SourceAdapterSpec,
};
use crate::domain::{RawFormat, SemanticType};

use NormalizeStep::{Boolean, Cast, DeriveYear, Drop, Filter, NullMarkers, TruncateToMonth};
use SemanticType::{Date, Float, Integer, Timestamp};

pub const TRANSIT_RIDERSHIP: &str = "transit_ridership";
pub const VMT_PEMS: &str = "vmt_pems";
pub const HIGHWAY_TRAVEL_TIMES: &str = "highway_travel_times";
pub const SWITRS_SUMMARY: &str = "switrs_summary";
pub const SWITRS_DETAILED: &str = "switrs_detailed";
pub const YOUTH_OPP_PASS: &str = "youth_opp_pass";
pub const FLEXIBLE_FLEET: &str = "flexible_fleet";
pub const TRAFFIC_VOLUMES: &str = "traffic_volumes";
pub const TRAFFIC_COLLISIONS: &str = "traffic_collisions";
pub const TRANSIT_ROUTES: &str = "transit_routes";

/// Canonical youth pass series
pub const YOUTH_PASS_CANONICAL_CATEGORY: &str = "Total Rides";

/// Canonical flexible fleet slice
pub const FLEX_FLEET_TOTAL: &str = "Total";

const SENTINELS: &[&str] = &["NULL", ""];

/// All source adapters, in build order
pub fn source_catalog() -> Vec<SourceAdapterSpec> {
    vec![
        transit_ridership(),
        vmt_pems(),
        highway_travel_times(),
        switrs_summary(),
        switrs_detailed(),
        youth_opp_pass(),
        flexible_fleet(),
        traffic_volumes(),
        traffic_collisions(),
        transit_routes(),
    ]
}

/// Looks up the adapter for a source id
pub fn adapter_for(source_id: &str) -> Option<SourceAdapterSpec> {
    source_catalog()
        .into_iter()
        .find(|spec| spec.source_id == source_id)
}

fn transit_ridership() -> SourceAdapterSpec {
    SourceAdapterSpec {
        source_id: TRANSIT_RIDERSHIP,
        format: RawFormat::Json,
        columns: vec![
            // Upstream misspells the year column
            renamed("year", &["calenadr_year", "calendar_year"]),
            required("route"),
            renamed("avg_weekday_boardings", &["average_weekday_boardings"]),
        ],
        steps: vec![
            NullMarkers(SENTINELS),
            Cast { column: "year", to: Integer },
            Cast { column: "avg_weekday_boardings", to: Float },
            Filter(RowFilter::RequireNonNull("year")),
        ],
    }
}

fn vmt_pems() -> SourceAdapterSpec {
    SourceAdapterSpec {
        source_id: VMT_PEMS,
        format: RawFormat::Json,
        columns: vec![
            required("year"),
            required("peak"),
            required("freeway"),
            required("vmt"),
        ],
        steps: vec![
            NullMarkers(SENTINELS),
            Cast { column: "year", to: Integer },
            Cast { column: "vmt", to: Float },
            Filter(RowFilter::RequireNonNull("year")),
        ],
    }
}

fn highway_travel_times() -> SourceAdapterSpec {
    SourceAdapterSpec {
        source_id: HIGHWAY_TRAVEL_TIMES,
        format: RawFormat::Json,
        columns: vec![
            required("year"),
            required("route"),
            required("peak"),
            renamed("mean_minutes", &["mean"]),
        ],
        steps: vec![
            NullMarkers(SENTINELS),
            Cast { column: "year", to: Integer },
            Cast { column: "mean_minutes", to: Float },
            Filter(RowFilter::RequireNonNull("year")),
        ],
    }
}

fn switrs_summary() -> SourceAdapterSpec {
    SourceAdapterSpec {
        source_id: SWITRS_SUMMARY,
        format: RawFormat::Json,
        columns: vec![
            renamed("year", &["accident_year"]),
            required("collision_severity"),
            renamed("num_collisions", &["number_of_collisions"]),
        ],
        steps: vec![
            NullMarkers(SENTINELS),
            Cast { column: "year", to: Integer },
            Cast { column: "num_collisions", to: Integer },
            Filter(RowFilter::RequireNonNull("year")),
        ],
    }
}

fn switrs_detailed() -> SourceAdapterSpec {
    SourceAdapterSpec {
        source_id: SWITRS_DETAILED,
        format: RawFormat::Json,
        columns: vec![
            renamed("year", &["accident_year"]),
            required("collision_severity"),
            required("type_of_collision"),
            optional("pcf_violation_category", &["pcf_viol_category"]),
            optional("weather", &["weather_1"]),
            optional("lighting", &["lighting"]),
            // Socrata omits keys whose value is null, so flag columns may vanish
            optional("is_bicycle", &["bicycle_accident"]),
            optional("is_pedestrian", &["pedestrian_accident"]),
            optional("is_motorcycle", &["motorcycle_accident"]),
            optional("latitude", &["latitude_sandag"]),
            optional("longitude", &["longitude_sandag"]),
            renamed("killed_victims", &["number_killed"]),
            renamed("injured_victims", &["number_injured"]),
        ],
        steps: vec![
            NullMarkers(SENTINELS),
            Cast { column: "year", to: Integer },
            Boolean { column: "is_bicycle", mapping: BoolMapping::FLAG },
            Boolean { column: "is_pedestrian", mapping: BoolMapping::FLAG },
            Boolean { column: "is_motorcycle", mapping: BoolMapping::FLAG },
            Cast { column: "latitude", to: Float },
            Cast { column: "longitude", to: Float },
            Cast { column: "killed_victims", to: Integer },
            Cast { column: "injured_victims", to: Integer },
            Filter(RowFilter::RequireNonNull("year")),
        ],
    }
}

fn youth_opp_pass() -> SourceAdapterSpec {
    SourceAdapterSpec {
        source_id: YOUTH_OPP_PASS,
        format: RawFormat::Json,
        columns: vec![
            required("route"),
            optional("service", &["service"]),
            required("month"),
            required("category"),
            required("rides"),
            required("community"),
            optional("vehicle", &["vehicle"]),
        ],
        steps: vec![
            NullMarkers(SENTINELS),
            Cast { column: "month", to: Date },
            TruncateToMonth("month"),
            Cast { column: "rides", to: Float },
            Filter(RowFilter::RequireNonNull("month")),
            // Other categories are breakdowns of the total and would double count
            Filter(RowFilter::KeepSlice {
                dimensions: &[("category", YOUTH_PASS_CANONICAL_CATEGORY)],
                measure: "rides",
            }),
        ],
    }
}

fn flexible_fleet() -> SourceAdapterSpec {
    SourceAdapterSpec {
        source_id: FLEXIBLE_FLEET,
        format: RawFormat::Json,
        columns: vec![
            required("month"),
            required("location_name"),
            required("am_pm"),
            required("weekday_weekend"),
            required("value"),
            required("category"),
        ],
        steps: vec![
            NullMarkers(SENTINELS),
            Cast { column: "month", to: Date },
            TruncateToMonth("month"),
            Cast { column: "value", to: Float },
            Filter(RowFilter::RequireNonNull("month")),
            // EAV layout: only the Total x Total cell is the aggregate
            Filter(RowFilter::KeepSlice {
                dimensions: &[("am_pm", FLEX_FLEET_TOTAL), ("weekday_weekend", FLEX_FLEET_TOTAL)],
                measure: "value",
            }),
            Drop(&["am_pm", "weekday_weekend"]),
        ],
    }
}

fn traffic_volumes() -> SourceAdapterSpec {
    SourceAdapterSpec {
        source_id: TRAFFIC_VOLUMES,
        format: RawFormat::Csv,
        columns: vec![
            required("street_name"),
            optional("limits", &["limits"]),
            required("total_count"),
            required("date_count"),
        ],
        steps: vec![
            NullMarkers(SENTINELS),
            Cast { column: "total_count", to: Integer },
            Cast { column: "date_count", to: Date },
            DeriveYear { from: "date_count", into: "year" },
            Filter(RowFilter::RequireNonNull("total_count")),
        ],
    }
}

fn traffic_collisions() -> SourceAdapterSpec {
    SourceAdapterSpec {
        source_id: TRAFFIC_COLLISIONS,
        format: RawFormat::Csv,
        columns: vec![
            required("report_id"),
            required("date_time"),
            optional("police_beat", &["police_beat"]),
            optional("address_road_primary", &["address_road_primary"]),
            optional("charge_desc", &["charge_desc"]),
            required("injured"),
            required("killed"),
        ],
        steps: vec![
            NullMarkers(SENTINELS),
            Cast { column: "date_time", to: Timestamp },
            DeriveYear { from: "date_time", into: "year" },
            Cast { column: "injured", to: Integer },
            Cast { column: "killed", to: Integer },
            Filter(RowFilter::RequireNonNull("date_time")),
        ],
    }
}

fn transit_routes() -> SourceAdapterSpec {
    SourceAdapterSpec {
        source_id: TRANSIT_ROUTES,
        format: RawFormat::Csv,
        columns: vec![
            renamed("route", &["route", "route_id", "rte_num", "route_short_name"]),
            optional(
                "route_name",
                &["route_name", "route_long_name", "rte_name", "long_name", "description"],
            ),
        ],
        steps: vec![
            NullMarkers(SENTINELS),
            Filter(RowFilter::RequireNonNull("route")),
        ],
    }
}
