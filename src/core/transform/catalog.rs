//! The fixed catalog of aggregated tables

use super::definition::{
    asc, desc, measure, Lookup, Measure, RowBand, TableDefinition, TableFilter, TableShape,
};
use crate::core::normalize::catalog::{
    FLEXIBLE_FLEET, HIGHWAY_TRAVEL_TIMES, SWITRS_DETAILED, SWITRS_SUMMARY, TRAFFIC_COLLISIONS,
    TRAFFIC_VOLUMES, TRANSIT_RIDERSHIP, TRANSIT_ROUTES, VMT_PEMS, YOUTH_OPP_PASS,
};

pub const RIDERSHIP_TRENDS: &str = "ridership_trends";
pub const RIDERSHIP_BY_ROUTE: &str = "ridership_by_route";
pub const VMT_TRENDS: &str = "vmt_trends";
pub const TRAVEL_TIME_TRENDS: &str = "travel_time_trends";
pub const COLLISION_SEVERITY: &str = "collision_severity";
pub const COLLISION_BY_TYPE: &str = "collision_by_type";
pub const COLLISION_MAP_POINTS: &str = "collision_map_points";
pub const CITY_COLLISION_TRENDS: &str = "city_collision_trends";
pub const TRAFFIC_VOLUME_TRENDS: &str = "traffic_volume_trends";
pub const TRAFFIC_VOLUME_STREETS: &str = "traffic_volume_streets";
pub const YOUTH_PASS_TRENDS: &str = "youth_pass_trends";
pub const FLEX_FLEET_TRENDS: &str = "flex_fleet_trends";

/// Route reference relation derived from the transit route list
pub const ROUTE_REFERENCE: &str = "route_reference";

/// Youth pass rides per community, published next to the twelve tables
pub const YOUTH_PASS_COMMUNITIES: &str = "youth_pass_communities";

/// Source of the route reference relation
pub const ROUTE_REFERENCE_SOURCE: &str = TRANSIT_ROUTES;

/// Regional bounding box for collision map points
pub const LATITUDE_RANGE: (f64, f64) = (32.5, 33.3);
pub const LONGITUDE_RANGE: (f64, f64) = (-117.7, -116.8);

/// All twelve published tables, in a stable order
pub fn table_catalog() -> Vec<TableDefinition> {
    vec![
        TableDefinition {
            name: RIDERSHIP_TRENDS,
            source: TRANSIT_RIDERSHIP,
            filters: vec![],
            shape: TableShape::Aggregate {
                group_by: &["year"],
                measures: vec![
                    measure("total_weekday_boardings", Measure::Sum("avg_weekday_boardings")),
                    measure("num_routes", Measure::CountDistinct("route")),
                ],
            },
            lookup: None,
            order_by: vec![asc("year")],
            row_band: RowBand::between(1, 50),
            key_columns: &["year"],
            year_coverage: Some((2019, 2024)),
        },
        TableDefinition {
            name: RIDERSHIP_BY_ROUTE,
            source: TRANSIT_RIDERSHIP,
            filters: vec![],
            shape: TableShape::Project(&["year", "route", "avg_weekday_boardings"]),
            lookup: Some(Lookup {
                key: "route",
                column: "route_name",
            }),
            order_by: vec![asc("year"), asc("route")],
            row_band: RowBand::between(1, 10_000),
            key_columns: &["year", "route"],
            year_coverage: None,
        },
        TableDefinition {
            name: VMT_TRENDS,
            source: VMT_PEMS,
            filters: vec![],
            shape: TableShape::Project(&["year", "peak", "freeway", "vmt"]),
            lookup: None,
            order_by: vec![asc("year"), asc("peak"), asc("freeway")],
            row_band: RowBand::between(1, 5_000),
            key_columns: &["year"],
            year_coverage: Some((2013, 2024)),
        },
        TableDefinition {
            name: TRAVEL_TIME_TRENDS,
            source: HIGHWAY_TRAVEL_TIMES,
            filters: vec![],
            shape: TableShape::Project(&["year", "route", "peak", "mean_minutes"]),
            lookup: None,
            order_by: vec![asc("year"), asc("route"), asc("peak")],
            row_band: RowBand::between(1, 5_000),
            key_columns: &["year"],
            year_coverage: Some((2019, 2024)),
        },
        TableDefinition {
            name: COLLISION_SEVERITY,
            source: SWITRS_SUMMARY,
            filters: vec![],
            shape: TableShape::Project(&["year", "collision_severity", "num_collisions"]),
            lookup: None,
            order_by: vec![asc("year"), asc("collision_severity")],
            row_band: RowBand::between(1, 1_000),
            key_columns: &["year"],
            year_coverage: Some((2006, 2024)),
        },
        TableDefinition {
            name: COLLISION_BY_TYPE,
            source: SWITRS_DETAILED,
            filters: vec![],
            shape: TableShape::Aggregate {
                group_by: &[
                    "year",
                    "collision_severity",
                    "type_of_collision",
                    "is_bicycle",
                    "is_pedestrian",
                    "is_motorcycle",
                    "weather",
                    "lighting",
                ],
                measures: vec![
                    measure("num_collisions", Measure::Count),
                    measure("total_killed", Measure::Sum("killed_victims")),
                    measure("total_injured", Measure::Sum("injured_victims")),
                ],
            },
            lookup: None,
            order_by: vec![asc("year"), desc("num_collisions")],
            row_band: RowBand::between(1, 300_000),
            key_columns: &["year", "is_bicycle", "is_pedestrian", "is_motorcycle"],
            year_coverage: None,
        },
        TableDefinition {
            name: COLLISION_MAP_POINTS,
            source: SWITRS_DETAILED,
            filters: vec![
                TableFilter::NotNull("latitude"),
                TableFilter::NotNull("longitude"),
                TableFilter::Between {
                    column: "latitude",
                    min: LATITUDE_RANGE.0,
                    max: LATITUDE_RANGE.1,
                },
                TableFilter::Between {
                    column: "longitude",
                    min: LONGITUDE_RANGE.0,
                    max: LONGITUDE_RANGE.1,
                },
            ],
            shape: TableShape::Project(&[
                "year",
                "collision_severity",
                "type_of_collision",
                "is_bicycle",
                "is_pedestrian",
                "is_motorcycle",
                "latitude",
                "longitude",
                "killed_victims",
                "injured_victims",
            ]),
            lookup: None,
            order_by: vec![asc("year")],
            row_band: RowBand::between(1, 300_000),
            key_columns: &["year", "latitude", "longitude"],
            year_coverage: None,
        },
        TableDefinition {
            name: CITY_COLLISION_TRENDS,
            source: TRAFFIC_COLLISIONS,
            filters: vec![TableFilter::NotNull("year")],
            shape: TableShape::Aggregate {
                group_by: &["year"],
                measures: vec![
                    measure("num_collisions", Measure::Count),
                    measure("total_injured", Measure::Sum("injured")),
                    measure("total_killed", Measure::Sum("killed")),
                    measure(
                        "injury_collision_rate",
                        Measure::ratio(Measure::CountPositive("injured"), Measure::Count),
                    ),
                ],
            },
            lookup: None,
            order_by: vec![asc("year")],
            row_band: RowBand::between(1, 50),
            key_columns: &["year"],
            year_coverage: Some((2015, 2026)),
        },
        TableDefinition {
            name: TRAFFIC_VOLUME_TRENDS,
            source: TRAFFIC_VOLUMES,
            filters: vec![TableFilter::NotNull("year")],
            shape: TableShape::Aggregate {
                group_by: &["year"],
                measures: vec![
                    measure("num_counts", Measure::Count),
                    measure("avg_daily_traffic", Measure::Avg("total_count")),
                    measure("total_volume", Measure::Sum("total_count")),
                ],
            },
            lookup: None,
            order_by: vec![asc("year")],
            row_band: RowBand::between(1, 50),
            key_columns: &["year"],
            year_coverage: Some((2005, 2022)),
        },
        TableDefinition {
            name: TRAFFIC_VOLUME_STREETS,
            source: TRAFFIC_VOLUMES,
            filters: vec![TableFilter::NotNull("year")],
            shape: TableShape::Project(&[
                "street_name",
                "limits",
                "year",
                "total_count",
                "date_count",
            ]),
            lookup: None,
            order_by: vec![desc("total_count")],
            row_band: RowBand::between(1, 100_000),
            key_columns: &["year", "total_count"],
            year_coverage: None,
        },
        TableDefinition {
            name: YOUTH_PASS_TRENDS,
            source: YOUTH_OPP_PASS,
            filters: vec![],
            shape: TableShape::Aggregate {
                group_by: &["month"],
                measures: vec![
                    measure("total_rides", Measure::Sum("rides")),
                    measure("num_routes", Measure::CountDistinct("route")),
                    measure("num_communities", Measure::CountDistinct("community")),
                ],
            },
            lookup: None,
            order_by: vec![asc("month")],
            row_band: RowBand::between(1, 99),
            key_columns: &["month"],
            year_coverage: None,
        },
        TableDefinition {
            name: FLEX_FLEET_TRENDS,
            source: FLEXIBLE_FLEET,
            filters: vec![],
            shape: TableShape::Aggregate {
                group_by: &["month", "location_name", "category"],
                measures: vec![measure("total_value", Measure::Sum("value"))],
            },
            lookup: None,
            order_by: vec![asc("month"), asc("location_name"), asc("category")],
            row_band: RowBand::between(1, 4_999),
            key_columns: &["month"],
            year_coverage: None,
        },
    ]
}

/// Auxiliary relations built from a single source like the catalog tables
///
/// They are published and queryable but carry only schema-level rules.
pub fn auxiliary_catalog() -> Vec<TableDefinition> {
    vec![TableDefinition {
        name: YOUTH_PASS_COMMUNITIES,
        source: YOUTH_OPP_PASS,
        filters: vec![TableFilter::NotNull("community")],
        shape: TableShape::Aggregate {
            group_by: &["community"],
            measures: vec![measure("total_rides", Measure::Sum("rides"))],
        },
        lookup: None,
        order_by: vec![desc("total_rides")],
        row_band: RowBand::between(1, 500),
        key_columns: &["community"],
        year_coverage: None,
    }]
}

pub fn table_definition(name: &str) -> Option<TableDefinition> {
    table_catalog()
        .into_iter()
        .chain(auxiliary_catalog())
        .find(|def| def.name == name)
}

/// Tables that cannot be built when `source_id` is unavailable
pub fn unbuilt_tables(source_id: &str) -> Vec<String> {
    table_catalog()
        .into_iter()
        .chain(auxiliary_catalog())
        .filter(|def| {
            def.source == source_id
                || (def.lookup.is_some() && source_id == ROUTE_REFERENCE_SOURCE)
        })
        .map(|def| def.name.to_string())
        .collect()
}
