//! Shared raw snapshot fixtures for the integration tests

#![allow(dead_code)]

use corridor::adapters::store::FileStore;
use corridor::config::{CorridorConfig, FilesystemConfig};
use corridor::core::build::BuildPipeline;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// One file per source, keyed by file name
pub struct RawFixture {
    files: BTreeMap<&'static str, String>,
}

fn records(rows: Vec<Value>) -> String {
    serde_json::to_string_pretty(&Value::Array(rows)).unwrap()
}

impl RawFixture {
    /// A complete, valid snapshot of all ten sources
    pub fn standard() -> Self {
        let mut files = BTreeMap::new();
        files.insert("transit_ridership.json", transit_ridership(None));
        files.insert("vmt_pems.json", vmt_pems(1000.0));
        files.insert("highway_travel_times.json", highway_travel_times());
        files.insert("switrs_summary.json", switrs_summary());
        files.insert("switrs_detailed.json", switrs_detailed());
        files.insert("youth_opp_pass.json", youth_opp_pass());
        files.insert("flexible_fleet.json", flexible_fleet());
        files.insert("traffic_volumes.csv", traffic_volumes());
        files.insert("traffic_collisions.csv", traffic_collisions());
        files.insert("transit_routes.csv", transit_routes());
        Self { files }
    }

    pub fn set(&mut self, file: &'static str, body: String) -> &mut Self {
        self.files.insert(file, body);
        self
    }

    pub fn remove(&mut self, file: &'static str) -> &mut Self {
        self.files.remove(file);
        self
    }

    /// Body of the fixture file for `source_id`, whichever its extension
    pub fn body(&self, source_id: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|(name, _)| name.split('.').next() == Some(source_id))
            .map(|(_, body)| body.as_str())
    }

    pub fn write(&self, dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        for (name, body) in &self.files {
            std::fs::write(dir.join(name), body).unwrap();
        }
    }
}

/// Ridership for routes 7 and 10, 2019-2024
///
/// `year_column` replaces the raw year column name, to exercise upstream drift.
pub fn transit_ridership(year_column: Option<&str>) -> String {
    let year_column = year_column.unwrap_or("calenadr_year");
    let mut rows = Vec::new();
    for year in 2019..=2024 {
        for (route, boardings) in [("7", 5000.0), ("10", 2500.5)] {
            let mut row = serde_json::Map::new();
            row.insert(year_column.to_string(), json!(year.to_string()));
            row.insert("route".to_string(), json!(route));
            row.insert("average_weekday_boardings".to_string(), json!(boardings));
            rows.push(Value::Object(row));
        }
    }
    records(rows)
}

pub fn vmt_pems(vmt: f64) -> String {
    let mut rows = Vec::new();
    for year in 2013..=2024 {
        for peak in ["AM", "PM"] {
            rows.push(json!({
                "year": year.to_string(),
                "peak": peak,
                "freeway": "I-5",
                "vmt": vmt.to_string(),
            }));
        }
    }
    records(rows)
}

fn highway_travel_times() -> String {
    let mut rows = Vec::new();
    for year in 2019..=2024 {
        for (peak, mean) in [("AM", "22.5"), ("PM", "31.0")] {
            rows.push(json!({
                "year": year.to_string(),
                "route": "I-15",
                "peak": peak,
                "mean": mean,
            }));
        }
    }
    records(rows)
}

fn switrs_summary() -> String {
    let mut rows = Vec::new();
    for year in 2006..=2024 {
        rows.push(json!({
            "accident_year": year.to_string(),
            "collision_severity": "Fatal",
            "number_of_collisions": "12",
        }));
        rows.push(json!({
            "accident_year": year.to_string(),
            "collision_severity": "Injury (Other Visible)",
            "number_of_collisions": "340",
        }));
    }
    records(rows)
}

/// Detailed collisions; flag keys are omitted when false, like Socrata does
///
/// Per year: two bicycle collisions (one with the flag as "Y", one as "1"),
/// one pedestrian, one without any flag and one point outside the region.
fn switrs_detailed() -> String {
    let mut rows = Vec::new();
    for year in 2013..=2022 {
        let y = year.to_string();
        rows.push(json!({
            "accident_year": y, "collision_severity": "Injury (Complaint of Pain)",
            "type_of_collision": "Broadside", "bicycle_accident": "Y",
            "weather_1": "Clear", "lighting": "Daylight",
            "latitude_sandag": "32.7157", "longitude_sandag": "-117.1611",
            "number_killed": "0", "number_injured": "1",
        }));
        rows.push(json!({
            "accident_year": y, "collision_severity": "Injury (Complaint of Pain)",
            "type_of_collision": "Broadside", "bicycle_accident": "1",
            "weather_1": "Clear", "lighting": "Daylight",
            "latitude_sandag": "32.75", "longitude_sandag": "-117.2",
            "number_killed": "0", "number_injured": "2",
        }));
        rows.push(json!({
            "accident_year": y, "collision_severity": "Fatal",
            "type_of_collision": "Vehicle/Pedestrian", "pedestrian_accident": "Y",
            "weather_1": "Clear", "lighting": "Dark - Street Lights",
            "latitude_sandag": "32.8", "longitude_sandag": "-117.1",
            "number_killed": "1", "number_injured": "0",
        }));
        rows.push(json!({
            "accident_year": y, "collision_severity": "Property Damage Only",
            "type_of_collision": "Rear End",
            "weather_1": "Cloudy", "lighting": "Daylight",
            "latitude_sandag": "NULL", "longitude_sandag": "NULL",
            "number_killed": "0", "number_injured": "0",
        }));
        rows.push(json!({
            "accident_year": y, "collision_severity": "Property Damage Only",
            "type_of_collision": "Rear End", "bicycle_accident": "N",
            "weather_1": "Cloudy", "lighting": "Daylight",
            "latitude_sandag": "0", "longitude_sandag": "0",
            "number_killed": "0", "number_injured": "0",
        }));
    }
    records(rows)
}

/// May 2023 carries a "Senior" breakdown that must not be added to the total
fn youth_opp_pass() -> String {
    records(vec![
        json!({
            "route": "7", "month": "2023-04-01T00:00:00.000", "category": "Total Rides",
            "rides": "800", "community": "City Heights",
        }),
        json!({
            "route": "7", "month": "2023-05", "category": "Total Rides",
            "rides": "1000", "community": "City Heights",
        }),
        json!({
            "route": "7", "month": "2023-05", "category": "Senior",
            "rides": "50", "community": "City Heights",
        }),
        json!({
            "route": "10", "month": "2023-04-01T00:00:00.000", "category": "Total Rides",
            "rides": "300", "community": "Barrio Logan",
        }),
        json!({
            "route": "10", "month": "2023-04-01T00:00:00.000", "category": "Total Rides",
            "rides": "100", "community": null,
        }),
    ])
}

/// EAV layout: every am_pm x weekday_weekend cell for one month and location
fn flexible_fleet() -> String {
    let mut rows = Vec::new();
    for am_pm in ["AM", "PM", "Total"] {
        for weekday in ["Weekday", "Weekend", "Total"] {
            let value = if am_pm == "Total" && weekday == "Total" {
                "900"
            } else {
                "100"
            };
            rows.push(json!({
                "month": "2024-03-01T00:00:00.000",
                "location_name": "Oceanside",
                "am_pm": am_pm,
                "weekday_weekend": weekday,
                "value": value,
                "category": "Ridership",
            }));
        }
    }
    records(rows)
}

/// 2010 has a literal NULL count, which must not count as zero
fn traffic_volumes() -> String {
    "street_name,limits,total_count,date_count\n\
     Broadway,1st Ave - 2nd Ave,1000,2006-03-01\n\
     El Cajon Blvd,NULL,100,2010-05-04\n\
     El Cajon Blvd,30th St - 32nd St,300,2010-06-04\n\
     El Cajon Blvd,32nd St - 33rd St,NULL,2010-07-04\n\
     Harbor Dr,Pacific Hwy - Grape St,24000,2020-02-11\n"
        .to_string()
}

fn traffic_collisions() -> String {
    let mut body = String::from(
        "report_id,date_time,police_beat,address_road_primary,charge_desc,injured,killed\n",
    );
    for year in 2015..=2024 {
        body.push_str(&format!(
            "R{year}01,{year}-03-14 08:15:00,521,University Ave,VC22350,1,0\n"
        ));
        body.push_str(&format!(
            "R{year}02,{year}-09-02 17:40:00,613,Mission Blvd,VC21453,0,0\n"
        ));
    }
    body
}

fn transit_routes() -> String {
    "route_short_name,route_long_name\n\
     7,University Ave\n\
     7,Downtown - University Ave\n\
     10,Old Town - University\n\
     201,UTC Superloop\n"
        .to_string()
}

/// Temp workspace with the standard fixture written to `<tmp>/raw`
pub struct Workspace {
    pub dir: TempDir,
    pub config: CorridorConfig,
    pub store: Arc<FileStore>,
}

impl Workspace {
    pub fn new() -> Self {
        let workspace = Self::empty();
        RawFixture::standard().write(&workspace.raw_dir());
        workspace
    }

    pub fn empty() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = CorridorConfig::default();
        config.paths.raw_dir = dir.path().join("raw").display().to_string();
        config.filesystem = FilesystemConfig {
            root: dir.path().join("store").display().to_string(),
            retain_generations: 3,
        };
        let store = Arc::new(FileStore::new(&config.filesystem));
        Self { dir, config, store }
    }

    pub fn raw_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("raw")
    }

    pub fn pipeline(&self) -> BuildPipeline {
        BuildPipeline::new(self.config.clone(), self.store.clone())
    }
}
