// src/config.rs
use chrono_tz::Tz;
use std::path::PathBuf;

use crate::inputs;
use crate::process::REFERENCE_YEAR;
use crate::sink::BulkConfig;
use crate::station::StationFile;

pub const DEFAULT_INDEX: &str = "divvy";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Chicago;

/// Everything a single ingest run needs besides the store connection.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub data_dir: PathBuf,
    pub station_files: Vec<StationFile>,
    pub trip_files: Vec<String>,
    pub timezone: Tz,
    pub reference_year: i64,
    pub bulk: BulkConfig,
}

impl LoaderConfig {
    /// The standard file catalog under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            station_files: inputs::default_station_files(),
            trip_files: inputs::default_trip_files(),
            timezone: DEFAULT_TIMEZONE,
            reference_year: REFERENCE_YEAR,
            bulk: BulkConfig::default(),
        }
    }

    pub fn with_station_files(mut self, files: Vec<StationFile>) -> Self {
        self.station_files = files;
        self
    }

    pub fn with_trip_files(mut self, files: Vec<String>) -> Self {
        self.trip_files = files;
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_bulk(mut self, bulk: BulkConfig) -> Self {
        self.bulk = bulk;
        self
    }
}
