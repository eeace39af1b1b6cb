//! The static view catalog
//!
//! Column names that reach query text come from here and nowhere else.

use crate::core::transform::catalog::{
    CITY_COLLISION_TRENDS, COLLISION_BY_TYPE, COLLISION_MAP_POINTS, COLLISION_SEVERITY,
    FLEX_FLEET_TRENDS, RIDERSHIP_BY_ROUTE, RIDERSHIP_TRENDS, TRAFFIC_VOLUME_STREETS,
    TRAFFIC_VOLUME_TRENDS, TRAVEL_TIME_TRENDS, VMT_TRENDS, YOUTH_PASS_COMMUNITIES,
    YOUTH_PASS_TRENDS,
};
use crate::core::transform::definition::{asc, desc, SortKey};
use std::fmt;

/// The fixed filter key set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKey {
    YearMin,
    YearMax,
    Mode,
    Category,
    Peak,
    Freeway,
    Route,
    Severity,
    Location,
}

impl FilterKey {
    pub const ALL: [FilterKey; 9] = [
        FilterKey::YearMin,
        FilterKey::YearMax,
        FilterKey::Mode,
        FilterKey::Category,
        FilterKey::Peak,
        FilterKey::Freeway,
        FilterKey::Route,
        FilterKey::Severity,
        FilterKey::Location,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKey::YearMin => "year_min",
            FilterKey::YearMax => "year_max",
            FilterKey::Mode => "mode",
            FilterKey::Category => "category",
            FilterKey::Peak => "peak",
            FilterKey::Freeway => "freeway",
            FilterKey::Route => "route",
            FilterKey::Severity => "severity",
            FilterKey::Location => "location",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Travel modes accepted by the `mode` filter, with the flag column each selects
pub const MODES: &[(&str, &str)] = &[
    ("bicycle", "is_bicycle"),
    ("pedestrian", "is_pedestrian"),
    ("motorcycle", "is_motorcycle"),
];

/// One named read-side view over a single aggregated table
#[derive(Debug, Clone, PartialEq)]
pub struct ViewDefinition {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
    /// Accepted filters and the column each one constrains
    ///
    /// `year_min`/`year_max` constrain `year`; `mode` picks a flag column
    /// from [`MODES`].
    pub filters: Vec<(FilterKey, &'static str)>,
    /// Year range applied when the caller leaves it open
    pub default_years: Option<(i64, i64)>,
    pub order_by: Vec<SortKey>,
    pub limit: Option<usize>,
    /// Most rows a call may return
    pub row_budget: usize,
}

impl ViewDefinition {
    pub fn filter_column(&self, key: FilterKey) -> Option<&'static str> {
        self.filters
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, column)| *column)
    }

    pub fn accepts(&self, key: FilterKey) -> bool {
        self.filter_column(key).is_some()
    }
}

fn years() -> Vec<(FilterKey, &'static str)> {
    vec![(FilterKey::YearMin, "year"), (FilterKey::YearMax, "year")]
}

fn with_years(extra: &[(FilterKey, &'static str)]) -> Vec<(FilterKey, &'static str)> {
    let mut filters = years();
    filters.extend_from_slice(extra);
    filters
}

pub fn view_catalog() -> Vec<ViewDefinition> {
    use FilterKey::*;

    vec![
        ViewDefinition {
            name: "ridership_trends",
            table: RIDERSHIP_TRENDS,
            columns: &["year", "total_weekday_boardings", "num_routes"],
            filters: years(),
            default_years: Some((2019, 2024)),
            order_by: vec![asc("year")],
            limit: None,
            row_budget: 100,
        },
        ViewDefinition {
            name: "ridership_by_route",
            table: RIDERSHIP_BY_ROUTE,
            columns: &["year", "route", "route_name", "avg_weekday_boardings"],
            filters: with_years(&[(Route, "route")]),
            default_years: Some((2019, 2024)),
            order_by: vec![desc("avg_weekday_boardings")],
            limit: Some(20),
            row_budget: 20,
        },
        ViewDefinition {
            name: "vmt",
            table: VMT_TRENDS,
            columns: &["year", "peak", "freeway", "vmt"],
            filters: with_years(&[(Peak, "peak"), (Freeway, "freeway")]),
            default_years: Some((2013, 2024)),
            order_by: vec![asc("year"), asc("freeway")],
            limit: None,
            row_budget: 5_000,
        },
        ViewDefinition {
            name: "travel_times",
            table: TRAVEL_TIME_TRENDS,
            columns: &["year", "route", "peak", "mean_minutes"],
            filters: with_years(&[(Peak, "peak"), (Route, "route")]),
            default_years: Some((2019, 2024)),
            order_by: vec![asc("year"), asc("route")],
            limit: None,
            row_budget: 5_000,
        },
        ViewDefinition {
            name: "collision_summary",
            table: COLLISION_SEVERITY,
            columns: &["year", "collision_severity", "num_collisions"],
            filters: with_years(&[(Severity, "collision_severity")]),
            default_years: Some((2006, 2024)),
            order_by: vec![asc("year")],
            limit: None,
            row_budget: 1_000,
        },
        ViewDefinition {
            name: "collision_detail",
            table: COLLISION_BY_TYPE,
            columns: &[
                "year",
                "collision_severity",
                "type_of_collision",
                "is_bicycle",
                "is_pedestrian",
                "is_motorcycle",
                "weather",
                "lighting",
                "num_collisions",
                "total_killed",
                "total_injured",
            ],
            filters: with_years(&[(Mode, "mode"), (Severity, "collision_severity")]),
            default_years: Some((2013, 2022)),
            order_by: vec![desc("num_collisions")],
            limit: Some(50),
            row_budget: 50,
        },
        ViewDefinition {
            name: "collision_map",
            table: COLLISION_MAP_POINTS,
            columns: &[
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
            ],
            filters: with_years(&[(Mode, "mode"), (Severity, "collision_severity")]),
            default_years: Some((2013, 2022)),
            order_by: vec![asc("year")],
            limit: Some(10_000),
            row_budget: 10_000,
        },
        ViewDefinition {
            name: "city_collision_trends",
            table: CITY_COLLISION_TRENDS,
            columns: &[
                "year",
                "num_collisions",
                "total_injured",
                "total_killed",
                "injury_collision_rate",
            ],
            filters: years(),
            default_years: Some((2015, 2026)),
            order_by: vec![asc("year")],
            limit: None,
            row_budget: 100,
        },
        ViewDefinition {
            name: "traffic_volume_trends",
            table: TRAFFIC_VOLUME_TRENDS,
            columns: &["year", "num_counts", "avg_daily_traffic", "total_volume"],
            filters: years(),
            default_years: Some((2005, 2022)),
            order_by: vec![asc("year")],
            limit: None,
            row_budget: 100,
        },
        ViewDefinition {
            name: "traffic_volumes",
            table: TRAFFIC_VOLUME_STREETS,
            columns: &["street_name", "limits", "year", "total_count"],
            filters: years(),
            default_years: Some((2005, 2022)),
            order_by: vec![desc("total_count")],
            limit: Some(25),
            row_budget: 25,
        },
        ViewDefinition {
            name: "youth_pass_trends",
            table: YOUTH_PASS_TRENDS,
            columns: &["month", "total_rides", "num_routes", "num_communities"],
            filters: vec![],
            default_years: None,
            order_by: vec![asc("month")],
            limit: None,
            row_budget: 200,
        },
        ViewDefinition {
            name: "youth_pass_communities",
            table: YOUTH_PASS_COMMUNITIES,
            columns: &["community", "total_rides"],
            filters: vec![],
            default_years: None,
            order_by: vec![desc("total_rides")],
            limit: Some(25),
            row_budget: 25,
        },
        ViewDefinition {
            name: "flex_fleet",
            table: FLEX_FLEET_TRENDS,
            columns: &["month", "location_name", "category", "total_value"],
            filters: vec![(Location, "location_name"), (Category, "category")],
            default_years: None,
            order_by: vec![asc("month")],
            limit: None,
            row_budget: 5_000,
        },
    ]
}

pub fn view_definition(name: &str) -> Option<ViewDefinition> {
    view_catalog().into_iter().find(|v| v.name == name)
}
