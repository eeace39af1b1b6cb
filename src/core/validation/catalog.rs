//! The rule catalog

use super::rule::{RuleCheck, ValidationRule, ALL_TABLES};
use crate::config::ValidationConfig;
use crate::core::normalize::source_catalog;
use crate::core::transform::catalog::{
    auxiliary_catalog, table_catalog, CITY_COLLISION_TRENDS, COLLISION_BY_TYPE,
    COLLISION_MAP_POINTS, COLLISION_SEVERITY, FLEX_FLEET_TRENDS, LATITUDE_RANGE, LONGITUDE_RANGE,
    RIDERSHIP_BY_ROUTE, RIDERSHIP_TRENDS, ROUTE_REFERENCE, TRAFFIC_VOLUME_STREETS,
    TRAFFIC_VOLUME_TRENDS, TRAVEL_TIME_TRENDS, VMT_TRENDS, YOUTH_PASS_COMMUNITIES,
    YOUTH_PASS_TRENDS,
};
use crate::domain::SemanticType::{Boolean, Date, Float, Integer, Text};
use crate::domain::{SemanticType, Severity};

const MB: u64 = 1024 * 1024;

/// Accepted distance between observed and documented year coverage
const YEAR_SLACK: i64 = 2;

/// Literal marker that must never survive normalization
pub const NULL_SENTINEL: &str = "NULL";

/// Fixed column schema of each published table
pub fn expected_columns(table: &str) -> Vec<(&'static str, SemanticType)> {
    match table {
        RIDERSHIP_TRENDS => vec![
            ("year", Integer),
            ("total_weekday_boardings", Float),
            ("num_routes", Integer),
        ],
        RIDERSHIP_BY_ROUTE => vec![
            ("year", Integer),
            ("route", Text),
            ("route_name", Text),
            ("avg_weekday_boardings", Float),
        ],
        VMT_TRENDS => vec![
            ("year", Integer),
            ("peak", Text),
            ("freeway", Text),
            ("vmt", Float),
        ],
        TRAVEL_TIME_TRENDS => vec![
            ("year", Integer),
            ("route", Text),
            ("peak", Text),
            ("mean_minutes", Float),
        ],
        COLLISION_SEVERITY => vec![
            ("year", Integer),
            ("collision_severity", Text),
            ("num_collisions", Integer),
        ],
        COLLISION_BY_TYPE => vec![
            ("year", Integer),
            ("collision_severity", Text),
            ("type_of_collision", Text),
            ("is_bicycle", Boolean),
            ("is_pedestrian", Boolean),
            ("is_motorcycle", Boolean),
            ("weather", Text),
            ("lighting", Text),
            ("num_collisions", Integer),
            ("total_killed", Integer),
            ("total_injured", Integer),
        ],
        COLLISION_MAP_POINTS => vec![
            ("year", Integer),
            ("collision_severity", Text),
            ("type_of_collision", Text),
            ("is_bicycle", Boolean),
            ("is_pedestrian", Boolean),
            ("is_motorcycle", Boolean),
            ("latitude", Float),
            ("longitude", Float),
            ("killed_victims", Integer),
            ("injured_victims", Integer),
        ],
        CITY_COLLISION_TRENDS => vec![
            ("year", Integer),
            ("num_collisions", Integer),
            ("total_injured", Integer),
            ("total_killed", Integer),
            ("injury_collision_rate", Float),
        ],
        TRAFFIC_VOLUME_TRENDS => vec![
            ("year", Integer),
            ("num_counts", Integer),
            ("avg_daily_traffic", Float),
            ("total_volume", Integer),
        ],
        TRAFFIC_VOLUME_STREETS => vec![
            ("street_name", Text),
            ("limits", Text),
            ("year", Integer),
            ("total_count", Integer),
            ("date_count", Date),
        ],
        YOUTH_PASS_TRENDS => vec![
            ("month", Date),
            ("total_rides", Float),
            ("num_routes", Integer),
            ("num_communities", Integer),
        ],
        FLEX_FLEET_TRENDS => vec![
            ("month", Date),
            ("location_name", Text),
            ("category", Text),
            ("total_value", Float),
        ],
        YOUTH_PASS_COMMUNITIES => vec![("community", Text), ("total_rides", Float)],
        _ => vec![],
    }
}

fn non_negative_columns(table: &str) -> Vec<&'static str> {
    match table {
        RIDERSHIP_TRENDS => vec!["total_weekday_boardings", "num_routes"],
        RIDERSHIP_BY_ROUTE => vec!["avg_weekday_boardings"],
        VMT_TRENDS => vec!["vmt"],
        TRAVEL_TIME_TRENDS => vec!["mean_minutes"],
        COLLISION_SEVERITY => vec!["num_collisions"],
        COLLISION_BY_TYPE => vec!["num_collisions", "total_killed", "total_injured"],
        COLLISION_MAP_POINTS => vec!["killed_victims", "injured_victims"],
        CITY_COLLISION_TRENDS => vec!["num_collisions", "total_injured", "total_killed"],
        TRAFFIC_VOLUME_TRENDS => vec!["num_counts", "avg_daily_traffic", "total_volume"],
        TRAFFIC_VOLUME_STREETS => vec!["total_count"],
        YOUTH_PASS_TRENDS => vec!["total_rides", "num_routes", "num_communities"],
        FLEX_FLEET_TRENDS => vec!["total_value"],
        YOUTH_PASS_COMMUNITIES => vec!["total_rides"],
        _ => vec![],
    }
}

/// Every rule, in evaluation and report order
pub fn rule_catalog(config: &ValidationConfig) -> Vec<ValidationRule> {
    use RuleCheck::*;
    use Severity::{Fatal, Warning};

    let mut rules = Vec::new();

    for def in table_catalog() {
        let t = def.name;
        rules.push(ValidationRule::new(
            "exists",
            t,
            Fatal,
            TableExists,
            "{table}: table missing from the aggregated store",
        ));
        rules.push(ValidationRule::new(
            "non_empty",
            t,
            Fatal,
            NonEmpty,
            "{table}: {detail}",
        ));
        rules.push(ValidationRule::new(
            "columns",
            t,
            Fatal,
            Columns(expected_columns(t)),
            "{table}: schema mismatch ({detail})",
        ));
        rules.push(ValidationRule::new(
            "row_band",
            t,
            Warning,
            RowBand,
            "{table}: row count outside expected band ({detail})",
        ));
        rules.push(ValidationRule::new(
            "non_negative",
            t,
            Fatal,
            NonNegative(non_negative_columns(t)),
            "{table}: negative values ({detail})",
        ));
        rules.push(ValidationRule::new(
            "no_sentinel",
            t,
            Fatal,
            NoSentinel(NULL_SENTINEL),
            "{table}: literal sentinel strings survived ({detail})",
        ));
        rules.push(ValidationRule::new(
            "keys_not_null",
            t,
            Fatal,
            KeysNotNull(def.key_columns.to_vec()),
            "{table}: null key values ({detail})",
        ));
        if let Some((min, max)) = def.year_coverage {
            rules.push(ValidationRule::new(
                "year_coverage",
                t,
                Warning,
                YearCoverage {
                    min,
                    max,
                    slack: YEAR_SLACK,
                },
                "{table}: year coverage {detail}",
            ));
        }
        let max_mb = if t == COLLISION_MAP_POINTS {
            config.max_map_table_mb
        } else {
            config.max_table_mb
        };
        rules.push(ValidationRule::new(
            "payload_size",
            t,
            Warning,
            PayloadSize {
                max_bytes: max_mb * MB,
            },
            "{table}: payload too large ({detail})",
        ));
    }

    for def in auxiliary_catalog() {
        let t = def.name;
        rules.push(ValidationRule::new(
            "columns",
            t,
            Fatal,
            Columns(expected_columns(t)),
            "{table}: schema mismatch ({detail})",
        ));
        rules.push(ValidationRule::new(
            "non_negative",
            t,
            Fatal,
            NonNegative(non_negative_columns(t)),
            "{table}: negative values ({detail})",
        ));
        rules.push(ValidationRule::new(
            "row_band",
            t,
            Warning,
            RowBand,
            "{table}: row count outside expected band ({detail})",
        ));
    }

    rules.push(ValidationRule::new(
        "unit_interval",
        CITY_COLLISION_TRENDS,
        Fatal,
        UnitInterval("injury_collision_rate"),
        "{table}: ratio outside [0, 1] ({detail})",
    ));
    rules.push(ValidationRule::new(
        "bounding_box",
        COLLISION_MAP_POINTS,
        Fatal,
        BoundingBox {
            latitude: LATITUDE_RANGE,
            longitude: LONGITUDE_RANGE,
        },
        "{table}: points outside the regional bounding box ({detail})",
    ));
    rules.push(ValidationRule::new(
        "filter_totals",
        YOUTH_PASS_TRENDS,
        Fatal,
        FilterTotals {
            measure: "total_rides",
        },
        "{table}: category filter check failed ({detail})",
    ));
    rules.push(ValidationRule::new(
        "filter_totals",
        FLEX_FLEET_TRENDS,
        Fatal,
        FilterTotals {
            measure: "total_value",
        },
        "{table}: total slice filter check failed ({detail})",
    ));
    rules.push(ValidationRule::new(
        "referential_subset",
        RIDERSHIP_BY_ROUTE,
        Warning,
        ReferentialSubset {
            column: "route",
            reference_table: ROUTE_REFERENCE,
            reference_column: "route",
        },
        "{table}: routes missing from the route reference ({detail})",
    ));
    rules.push(ValidationRule::new(
        "year_overlap",
        ALL_TABLES,
        Warning,
        YearOverlap {
            tables: vec![RIDERSHIP_TRENDS, VMT_TRENDS, COLLISION_SEVERITY],
            min_common: 3,
        },
        "Cross-table year overlap too small ({detail})",
    ));
    rules.push(ValidationRule::new(
        "total_payload_size",
        ALL_TABLES,
        Warning,
        TotalPayloadSize {
            max_bytes: config.max_total_mb * MB,
        },
        "Aggregated store too large ({detail})",
    ));
    for adapter in source_catalog() {
        rules.push(ValidationRule::new(
            &format!("cast_failure_rate.{}", adapter.source_id),
            ALL_TABLES,
            config.cast_failure_severity,
            CastFailureRate {
                source_id: adapter.source_id,
                threshold: config.cast_failure_threshold,
            },
            "Cast failures above threshold ({detail})",
        ));
    }

    rules
}
