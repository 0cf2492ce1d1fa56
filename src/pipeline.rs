// src/pipeline.rs
use csv::ReaderBuilder;
use std::{
    fs::File,
    io::{BufReader, Read},
    path::PathBuf,
};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::config::LoaderConfig;
use crate::process::{EnrichError, Enrichment, TimestampNormalizer, TripEnricher};
use crate::sink::{BulkProcessor, SinkError, SinkStats};
use crate::station::{StationError, StationRegistry};
use crate::trip::RawTripRecord;

/// First field of a trip header row.
const HEADER_SENTINEL: &str = "trip_id";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Station(#[from] StationError),

    #[error("opening trip file {path}: {source}")]
    OpenTrips {
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

    #[error("{file}: {source}")]
    Enrich {
        file: String,
        #[source]
        source: EnrichError,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Row counts for one trip file, or the whole run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TripCounts {
    pub rows: u64,
    pub enriched: u64,
    pub skipped: u64,
}

impl TripCounts {
    fn add(&mut self, other: TripCounts) {
        self.rows += other.rows;
        self.enriched += other.enriched;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub stations: usize,
    pub trips: TripCounts,
    pub sink: SinkStats,
}

/// Build the station registry, enrich every trip file in order, and drain the sink.
#[instrument(level = "info", skip_all, fields(data_dir = %config.data_dir.display()))]
pub async fn run(config: &LoaderConfig, mut sink: BulkProcessor) -> Result<RunStats, PipelineError> {
    let start = Instant::now();

    let registry = StationRegistry::build(&config.data_dir, &config.station_files)?;
    info!(stations = registry.len(), "station registry built");

    let normalizer = TimestampNormalizer::for_zone(config.timezone);
    info!(zone = %config.timezone, offset = %normalizer.offset(), "timestamp offset");
    let enricher =
        TripEnricher::new(&registry, normalizer).with_reference_year(config.reference_year);

    let mut trips = TripCounts::default();
    for name in &config.trip_files {
        let path = config.data_dir.join(name);
        debug!(name = %name, "Parsing file");
        let file = File::open(&path).map_err(|source| PipelineError::OpenTrips {
            path: path.clone(),
            source,
        })?;
        let counts = ingest_trips(name, BufReader::new(file), &enricher, &mut sink).await?;
        info!(
            name = %name,
            rows = counts.rows,
            enriched = counts.enriched,
            skipped = counts.skipped,
            "trip file done"
        );
        trips.add(counts);
    }

    let sink_stats = sink.flush().await?;
    let stats = RunStats {
        stations: registry.len(),
        trips,
        sink: sink_stats,
    };
    info!(?stats, elapsed = ?start.elapsed(), "ingest complete");
    Ok(stats)
}

/// Enrich every data row in `reader` and hand the results to `sink`.
pub async fn ingest_trips<R: Read>(
    name: &str,
    reader: R,
    enricher: &TripEnricher<'_>,
    sink: &mut BulkProcessor,
) -> Result<TripCounts, PipelineError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut counts = TripCounts::default();
    for result in rdr.records() {
        let record = result.map_err(|source| PipelineError::Csv {
            file: name.to_string(),
            source,
        })?;
        if record.get(0) == Some(HEADER_SENTINEL) {
            continue;
        }
        counts.rows += 1;

        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let raw = RawTripRecord::new(line, record);
        match enricher.enrich(&raw) {
            Ok(Enrichment::Trip(trip)) => {
                sink.submit(trip).await?;
                counts.enriched += 1;
            }
            Ok(Enrichment::Skip(reason)) => {
                debug!(name = %name, line, ?reason, "skipping trip");
                counts.skipped += 1;
            }
            Err(source) => {
                return Err(PipelineError::Enrich {
                    file: name.to_string(),
                    source,
                })
            }
        }
    }
    Ok(counts)
}
