// src/inputs.rs
use std::{env, path::PathBuf};

use crate::station::{StationFile, StationSchema};

/// Data directory relative to `$HOME`.
pub const DATA_SUBDIR: &str = "data/divvy";

/// Station exports, oldest first. Later files win on duplicate ids.
static STATION_FILES: &[&str] = &[
    "Divvy_Stations_2013.csv",
    "Divvy_Stations_2014-Q1Q2.csv",
    "Divvy_Stations_2014-Q3Q4.csv",
    "Divvy_Stations_2015.csv",
    "Divvy_Stations_2016_Q1Q2.csv",
    "Divvy_Stations_2016_Q3.csv",
    "Divvy_Stations_2016_Q4.csv",
    "Divvy_Stations_2017_Q1Q2.csv",
    "Divvy_Stations_2017_Q3Q4.csv",
];

/// Station exports that carry an explicit city column.
static MODERN_STATION_FILES: &[&str] = &["Divvy_Stations_2017_Q1Q2.csv", "Divvy_Stations_2017_Q3Q4.csv"];

static TRIP_FILES: &[&str] = &[
    // "Divvy_Trips_2018_Q4.csv",
    // "Divvy_Trips_2018_Q3.csv",
    // "Divvy_Trips_2018_Q2.csv",
    // "Divvy_Trips_2018_Q1.csv",
    "Divvy_Trips_2017_Q4.csv",
    "Divvy_Trips_2017_Q3.csv",
    "Divvy_Trips_2017_Q2.csv",
    "Divvy_Trips_2017_Q1.csv",
];

/// Column layout of a station export, decided by its file name.
pub fn station_schema_for(file_name: &str) -> StationSchema {
    if MODERN_STATION_FILES.contains(&file_name) {
        StationSchema::Modern
    } else {
        StationSchema::Legacy
    }
}

pub fn default_station_files() -> Vec<StationFile> {
    STATION_FILES
        .iter()
        .map(|name| StationFile::new(*name, station_schema_for(name)))
        .collect()
}

pub fn default_trip_files() -> Vec<String> {
    TRIP_FILES.iter().map(|name| name.to_string()).collect()
}

/// `$HOME/data/divvy`, if `HOME` is set.
pub fn default_data_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(DATA_SUBDIR))
}
