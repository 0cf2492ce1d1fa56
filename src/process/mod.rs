// src/process/mod.rs
pub mod date_parser;
pub mod enrich;
pub mod geo;
pub mod utils;

pub use date_parser::{TimestampError, TimestampNormalizer};
pub use enrich::{EnrichError, Enrichment, NumberError, SkipReason, TripEnricher, REFERENCE_YEAR};
pub use self::geo::{distance_miles, speed_mph, Coordinate};
