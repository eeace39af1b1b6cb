//! End-to-end build tests over fixture raw snapshots

mod common;

use chrono::NaiveDate;
use common::{transit_ridership, vmt_pems, RawFixture, Workspace};
use corridor::adapters::store::AggregateStore;
use corridor::config::RetryConfig;
use corridor::core::build::{BuildOptions, BuildOutcome};
use corridor::domain::{CorridorError, Value};

fn offline() -> BuildOptions {
    BuildOptions {
        skip_ingest: true,
        ..Default::default()
    }
}

fn row_for<'a>(rows: &'a [Vec<Value>], index: usize, key: &Value) -> &'a Vec<Value> {
    rows.iter()
        .find(|row| &row[index] == key)
        .unwrap_or_else(|| panic!("no row with key {key:?}"))
}

#[tokio::test]
async fn test_standard_snapshot_is_published() {
    let workspace = Workspace::new();
    let summary = workspace.pipeline().run(offline()).await.unwrap();

    assert_ne!(summary.outcome, BuildOutcome::Rejected, "{}", summary.report.format_summary());
    assert!(summary.is_published());
    assert!(summary.report.fatal_rule_ids().is_empty());
    assert!(summary.ingest.is_none());
    assert_eq!(summary.source_stats.len(), 10);

    let manifest = workspace.store.current_manifest().await.unwrap().unwrap();
    assert_eq!(manifest.build_id, summary.build_id);
    // Twelve published tables plus the route reference and youth communities
    assert_eq!(manifest.tables.len(), 14);
}

#[tokio::test]
async fn test_youth_pass_total_excludes_breakdown_categories() {
    let workspace = Workspace::new();
    workspace.pipeline().run(offline()).await.unwrap();

    let table = workspace.store.load_table("youth_pass_trends").await.unwrap();
    let month = table.column_index("month").unwrap();
    let rides = table.column_index("total_rides").unwrap();
    let may = Value::Date(NaiveDate::from_ymd_opt(2023, 5, 1).unwrap());

    assert_eq!(table.rows.len(), 2);
    assert_eq!(row_for(&table.rows, month, &may)[rides].as_f64(), Some(1000.0));

    let audit = table
        .lineage
        .filter_audits
        .iter()
        .find(|a| a.columns == ["category"])
        .unwrap();
    assert_eq!(audit.excluded_total, 50.0);
}

#[tokio::test]
async fn test_flex_fleet_keeps_only_the_total_cell() {
    let workspace = Workspace::new();
    workspace.pipeline().run(offline()).await.unwrap();

    let table = workspace.store.load_table("flex_fleet_trends").await.unwrap();
    assert_eq!(table.rows.len(), 1);
    let total = table.column_index("total_value").unwrap();
    assert_eq!(table.rows[0][total].as_f64(), Some(900.0));
    assert!(table.column_index("am_pm").is_none());
    assert!(table.column_index("weekday_weekend").is_none());
}

#[tokio::test]
async fn test_null_counts_are_dropped_not_zeroed() {
    let workspace = Workspace::new();
    workspace.pipeline().run(offline()).await.unwrap();

    let trends = workspace.store.load_table("traffic_volume_trends").await.unwrap();
    let year = trends.column_index("year").unwrap();
    let row = row_for(&trends.rows, year, &Value::Int(2010));
    assert_eq!(row[trends.column_index("num_counts").unwrap()], Value::Int(2));
    assert_eq!(row[trends.column_index("avg_daily_traffic").unwrap()].as_f64(), Some(200.0));
    assert_eq!(row[trends.column_index("total_volume").unwrap()].as_f64(), Some(400.0));

    // The "NULL" limits string became a real null
    let streets = workspace.store.load_table("traffic_volume_streets").await.unwrap();
    let limits = streets.column_index("limits").unwrap();
    let count = streets.column_index("total_count").unwrap();
    let el_cajon = row_for(&streets.rows, count, &Value::Int(100));
    assert!(el_cajon[limits].is_null());
}

#[tokio::test]
async fn test_no_sentinel_text_reaches_published_tables() {
    let workspace = Workspace::new();
    workspace.pipeline().run(offline()).await.unwrap();

    let snapshot = workspace.store.load_snapshot().await.unwrap();
    for table in snapshot.tables.values() {
        for row in &table.rows {
            for cell in row {
                if let Value::Text(text) = cell {
                    assert!(
                        text != "NULL" && !text.is_empty(),
                        "{} holds sentinel {text:?}",
                        table.name
                    );
                }
            }
        }
    }
}

#[tokio::test]
async fn test_boolean_flags_survive_normalization() {
    let workspace = Workspace::new();
    workspace.pipeline().run(offline()).await.unwrap();

    let table = workspace.store.load_table("collision_by_type").await.unwrap();
    let year = table.column_index("year").unwrap();
    let bicycle = table.column_index("is_bicycle").unwrap();
    let count = table.column_index("num_collisions").unwrap();

    for y in 2013..=2022 {
        let bicycle_collisions: i64 = table
            .rows
            .iter()
            .filter(|row| row[year] == Value::Int(y) && row[bicycle] == Value::Bool(true))
            .filter_map(|row| row[count].as_i64())
            .sum();
        assert_eq!(bicycle_collisions, 2, "year {y}");
    }
    assert!(table.rows.iter().all(|row| row[bicycle].as_bool().is_some()));
}

#[tokio::test]
async fn test_map_points_stay_inside_the_region() {
    let workspace = Workspace::new();
    workspace.pipeline().run(offline()).await.unwrap();

    let table = workspace.store.load_table("collision_map_points").await.unwrap();
    assert_eq!(table.rows.len(), 30);
    let lat = table.column_index("latitude").unwrap();
    let lon = table.column_index("longitude").unwrap();
    for row in &table.rows {
        let (lat, lon) = (row[lat].as_f64().unwrap(), row[lon].as_f64().unwrap());
        assert!((32.5..=33.3).contains(&lat));
        assert!((-117.7..=-116.8).contains(&lon));
    }
}

#[tokio::test]
async fn test_route_names_join_from_the_reference() {
    let workspace = Workspace::new();
    let summary = workspace.pipeline().run(offline()).await.unwrap();

    let subset = summary
        .report
        .results
        .iter()
        .find(|r| r.rule_id == "referential_subset.ridership_by_route")
        .unwrap();
    assert!(subset.passed, "{}", subset.detail);

    let table = workspace.store.load_table("ridership_by_route").await.unwrap();
    let route = table.column_index("route").unwrap();
    let name = table.column_index("route_name").unwrap();
    let seven = row_for(&table.rows, route, &Value::Text("7".to_string()));
    // Duplicate reference rows resolve to the smallest name
    assert_eq!(seven[name].as_str(), Some("Downtown - University Ave"));
}

#[tokio::test]
async fn test_rebuilding_the_same_snapshot_is_byte_identical() {
    let workspace = Workspace::new();
    let first = workspace.pipeline().run(offline()).await.unwrap();
    let second = workspace.pipeline().run(offline()).await.unwrap();

    let (first, second) = (first.manifest.unwrap(), second.manifest.unwrap());
    assert_ne!(first.build_id, second.build_id);
    assert_eq!(first.tables.len(), second.tables.len());
    for (name, table) in &first.tables {
        let other = &second.tables[name];
        assert_eq!(table.checksum, other.checksum, "{name}");
        assert_eq!(table.payload_bytes, other.payload_bytes, "{name}");
        assert_eq!(table.row_count, other.row_count, "{name}");
    }
}

#[tokio::test]
async fn test_fatal_rule_keeps_previous_build_current() {
    let workspace = Workspace::new();
    let published = workspace.pipeline().run(offline()).await.unwrap();

    let mut fixture = RawFixture::standard();
    fixture.set("vmt_pems.json", vmt_pems(-5.0));
    fixture.write(&workspace.raw_dir());

    let rejected = workspace.pipeline().run(offline()).await.unwrap();
    assert_eq!(rejected.outcome, BuildOutcome::Rejected);
    assert_eq!(rejected.outcome.exit_code(), 3);
    assert!(!rejected.is_published());
    assert!(rejected
        .report
        .fatal_rule_ids()
        .contains(&"non_negative.vmt_trends".to_string()));

    let current = workspace.store.current_manifest().await.unwrap().unwrap();
    assert_eq!(current.build_id, published.build_id);

    let err = rejected.ensure_published().unwrap_err();
    assert!(matches!(err, CorridorError::DataQualityViolation { .. }));
}

#[tokio::test]
async fn test_schema_drift_aborts_before_publishing() {
    let workspace = Workspace::empty();
    let mut fixture = RawFixture::standard();
    fixture.set("transit_ridership.json", transit_ridership(Some("yr")));
    fixture.write(&workspace.raw_dir());

    let err = workspace.pipeline().run(offline()).await.unwrap_err();
    match &err {
        CorridorError::BuildAborted { cause, unbuilt } => {
            assert!(matches!(
                cause.as_ref(),
                CorridorError::SchemaDrift { source_id, .. } if source_id == "transit_ridership"
            ));
            assert!(unbuilt.contains(&"ridership_trends".to_string()));
            assert!(unbuilt.contains(&"ridership_by_route".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(workspace.store.current_manifest().await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_source_names_unbuilt_tables() {
    let workspace = Workspace::empty();
    let mut fixture = RawFixture::standard();
    fixture.remove("switrs_detailed.json");
    fixture.write(&workspace.raw_dir());

    let err = workspace.pipeline().run(offline()).await.unwrap_err();
    assert_eq!(err.exit_code(), 4);
    let CorridorError::BuildAborted { unbuilt, .. } = err else {
        panic!("expected an aborted build");
    };
    assert_eq!(unbuilt, vec!["collision_by_type", "collision_map_points"]);
}

#[tokio::test]
async fn test_failed_downloads_abort_instead_of_republishing_stale_snapshots() {
    let mut server = mockito::Server::new_async().await;
    let _unavailable = server
        .mock("GET", mockito::Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let mut workspace = Workspace::new();
    let published = workspace.pipeline().run(offline()).await.unwrap();

    workspace.config.ingest.socrata_base_url = server.url();
    workspace.config.ingest.seshat_base_url = server.url();
    workspace.config.ingest.retry = RetryConfig {
        max_retries: 1,
        initial_delay_ms: 1,
        max_delay_ms: 1,
        backoff_multiplier: 1.0,
    };

    let err = workspace
        .pipeline()
        .run(BuildOptions {
            force_ingest: true,
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 4);
    let CorridorError::BuildAborted { cause, unbuilt } = err else {
        panic!("expected an aborted build");
    };
    assert!(matches!(*cause, CorridorError::SourceUnavailable { .. }));
    assert!(unbuilt.contains(&"vmt_trends".to_string()));
    assert!(unbuilt.contains(&"ridership_by_route".to_string()));

    let current = workspace.store.current_manifest().await.unwrap().unwrap();
    assert_eq!(current.build_id, published.build_id);
}

#[tokio::test]
async fn test_relabelled_total_series_is_rejected() {
    let workspace = Workspace::new();
    let youth = RawFixture::standard()
        .body("youth_opp_pass")
        .unwrap()
        .replace("Total Rides", "All Rides");
    let mut fixture = RawFixture::standard();
    fixture.set("youth_opp_pass.json", youth);
    fixture.write(&workspace.raw_dir());

    let summary = workspace.pipeline().run(offline()).await.unwrap();
    assert_eq!(summary.outcome, BuildOutcome::Rejected);
    assert!(summary
        .report
        .fatal_rule_ids()
        .contains(&"filter_totals.youth_pass_trends".to_string()));
}
