// src/station/registry.rs
use csv::{ReaderBuilder, StringRecord};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read},
    num::ParseIntError,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, instrument};

use super::schema::{StationSchema, DEFAULT_CITY};
use crate::process::utils::display_name;

/// First field of a station header row.
const HEADER_SENTINEL: &str = "id";

#[derive(Debug, Error)]
pub enum StationError {
    #[error("opening station file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file} CSV error: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },

    #[error("{file} line {line}: expected at least {expected} fields, found {found}")]
    MissingColumn {
        file: String,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("{file} line {line}: malformed station id {value:?}: {source}")]
    MalformedStationId {
        file: String,
        line: u64,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("{file} line {line}: malformed dock capacity {value:?} for station {id}: {source}")]
    MalformedDockCapacity {
        file: String,
        line: u64,
        id: i64,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// A dock location as last described by the station exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub id: i64,
    pub name: String,
    pub city: String,
    /// Kept verbatim so the source precision survives into the documents.
    pub latitude: String,
    pub longitude: String,
    pub total_docks: u32,
}

/// One station export and the column layout it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationFile {
    pub name: String,
    pub schema: StationSchema,
}

impl StationFile {
    pub fn new(name: impl Into<String>, schema: StationSchema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Station id → station lookup. Built once, then only read.
#[derive(Debug, Default, Clone)]
pub struct StationRegistry {
    stations: HashMap<i64, Station>,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file in `files` from `dir`, in order. A station seen again in a
    /// later file replaces the earlier entry.
    #[instrument(level = "info", skip(dir, files), fields(dir = %dir.display(), files = files.len()))]
    pub fn build(dir: &Path, files: &[StationFile]) -> Result<Self, StationError> {
        let mut registry = Self::new();
        for file in files {
            registry.load_file(&dir.join(&file.name), file.schema)?;
        }
        debug!(total = registry.len(), "Stations total");
        Ok(registry)
    }

    /// Load a single station CSV from disk.
    pub fn load_file(&mut self, path: &Path, schema: StationSchema) -> Result<usize, StationError> {
        let name = display_name(path);
        debug!(name = %name, schema = schema.as_str(), "Parsing file");

        let file = File::open(path).map_err(|source| StationError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let loaded = self.load_reader(&name, schema, BufReader::new(file))?;
        debug!(name = %name, rows = loaded, count = self.len(), "Stations count");
        Ok(loaded)
    }

    /// Parse station rows from any reader. Returns the number of data rows applied.
    pub fn load_reader<R: Read>(
        &mut self,
        file: &str,
        schema: StationSchema,
        reader: R,
    ) -> Result<usize, StationError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut loaded = 0;
        for result in rdr.records() {
            let record = result.map_err(|source| StationError::Csv {
                file: file.to_string(),
                source,
            })?;
            if record.get(0) == Some(HEADER_SENTINEL) {
                continue;
            }
            let station = parse_station(file, schema, &record)?;
            self.insert(station);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Insert or replace a station.
    pub fn insert(&mut self, station: Station) {
        self.stations.insert(station.id, station);
    }

    pub fn get(&self, id: i64) -> Option<&Station> {
        self.stations.get(&id)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

fn parse_station(
    file: &str,
    schema: StationSchema,
    record: &StringRecord,
) -> Result<Station, StationError> {
    let line = record.position().map(|p| p.line()).unwrap_or_default();
    if record.len() < schema.min_fields() {
        return Err(StationError::MissingColumn {
            file: file.to_string(),
            line,
            expected: schema.min_fields(),
            found: record.len(),
        });
    }

    let cols = schema.columns();
    let raw_id = &record[cols.id];
    let id: i64 = raw_id
        .trim()
        .parse()
        .map_err(|source| StationError::MalformedStationId {
            file: file.to_string(),
            line,
            value: raw_id.to_string(),
            source,
        })?;

    let raw_docks = &record[cols.docks];
    let total_docks: u32 =
        raw_docks
            .trim()
            .parse()
            .map_err(|source| StationError::MalformedDockCapacity {
                file: file.to_string(),
                line,
                id,
                value: raw_docks.to_string(),
                source,
            })?;

    let city = match cols.city {
        Some(idx) => record[idx].trim().to_string(),
        None => DEFAULT_CITY.to_string(),
    };

    Ok(Station {
        id,
        name: record[cols.name].to_string(),
        city,
        latitude: record[cols.latitude].to_string(),
        longitude: record[cols.longitude].to_string(),
        total_docks,
    })
}
