// src/process/enrich.rs
use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;
use tracing::warn;

use super::date_parser::{to_canonical, weekday_name, TimestampError, TimestampNormalizer};
use super::geo::{distance_miles, speed_mph, Coordinate};
use super::utils::strip_thousands;
use crate::station::{Station, StationRegistry};
use crate::trip::{columns, EnrichedTrip, RawTripRecord, StationSnapshot, UserType};

/// Year ages are computed against.
pub const REFERENCE_YEAR: i64 = 2018;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("line {line}: expected at least {expected} fields, found {found}")]
    MissingField {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: malformed {field} {value:?}: {source}")]
    MalformedIdentifier {
        line: u64,
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("line {line}: {field}: {source}")]
    Timestamp {
        line: u64,
        field: &'static str,
        #[source]
        source: TimestampError,
    },

    #[error("line {line}: malformed tripduration {value:?}: {source}")]
    MalformedDuration {
        line: u64,
        value: String,
        #[source]
        source: NumberError,
    },

    #[error("station {station_id}: malformed {field} {value:?}: {source}")]
    MalformedCoordinate {
        station_id: i64,
        field: &'static str,
        value: String,
        #[source]
        source: NumberError,
    },
}

/// Why a decimal field was refused.
#[derive(Debug, Error)]
pub enum NumberError {
    #[error(transparent)]
    Parse(#[from] ParseFloatError),

    #[error("not a finite number")]
    NotFinite,
}

/// Parse a decimal, refusing NaN and the infinities.
fn parse_finite(value: &str) -> Result<f64, NumberError> {
    let n: f64 = value.trim().parse()?;
    if n.is_finite() {
        Ok(n)
    } else {
        Err(NumberError::NotFinite)
    }
}

/// Why a row produced no document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownFromStation(i64),
    UnknownToStation(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment {
    Trip(EnrichedTrip),
    Skip(SkipReason),
}

/// Joins raw trip rows against the station registry and derives the
/// time, distance and speed fields.
pub struct TripEnricher<'a> {
    stations: &'a StationRegistry,
    normalizer: TimestampNormalizer,
    reference_year: i64,
}

impl<'a> TripEnricher<'a> {
    pub fn new(stations: &'a StationRegistry, normalizer: TimestampNormalizer) -> Self {
        Self {
            stations,
            normalizer,
            reference_year: REFERENCE_YEAR,
        }
    }

    pub fn with_reference_year(mut self, year: i64) -> Self {
        self.reference_year = year;
        self
    }

    pub fn enrich(&self, raw: &RawTripRecord) -> Result<Enrichment, EnrichError> {
        if raw.len() < columns::COUNT {
            return Err(EnrichError::MissingField {
                line: raw.line,
                expected: columns::COUNT,
                found: raw.len(),
            });
        }
        let field = |idx: usize| raw.get(idx).unwrap_or_default();

        let id = parse_id(raw.line, "trip_id", field(columns::TRIP_ID))?;

        let start = self
            .normalizer
            .parse(field(columns::START_TIME))
            .map_err(|source| EnrichError::Timestamp {
                line: raw.line,
                field: "start_time",
                source,
            })?;
        let end = self
            .normalizer
            .parse(field(columns::END_TIME))
            .map_err(|source| EnrichError::Timestamp {
                line: raw.line,
                field: "end_time",
                source,
            })?;

        let bike_id = parse_id(raw.line, "bikeid", field(columns::BIKE_ID))?;

        let raw_duration = field(columns::DURATION);
        let seconds = parse_finite(&strip_thousands(raw_duration)).map_err(|source| {
            EnrichError::MalformedDuration {
                line: raw.line,
                value: raw_duration.to_string(),
                source,
            }
        })?;
        let duration_minutes = seconds / 60.0;

        let user_type = UserType::normalize(field(columns::USER_TYPE));

        let gender = match field(columns::GENDER) {
            "" => None,
            g => Some(g.to_string()),
        };

        let birth_year = parse_birth_year(id, field(columns::BIRTH_YEAR));
        let age = birth_year.map(|year| self.reference_year - year);

        let from_id = parse_id(raw.line, "from_station_id", field(columns::FROM_STATION_ID))?;
        let Some(from) = self.stations.get(from_id) else {
            return Ok(Enrichment::Skip(SkipReason::UnknownFromStation(from_id)));
        };
        let to_id = parse_id(raw.line, "to_station_id", field(columns::TO_STATION_ID))?;
        let Some(to) = self.stations.get(to_id) else {
            return Ok(Enrichment::Skip(SkipReason::UnknownToStation(to_id)));
        };

        let distance = distance_miles(coordinate(from)?, coordinate(to)?);

        Ok(Enrichment::Trip(EnrichedTrip {
            id,
            start_time: to_canonical(&start),
            end_time: to_canonical(&end),
            day_of_week: weekday_name(&end),
            bike_id,
            duration_minutes,
            user_type,
            gender,
            birth_year,
            age,
            from_station: StationSnapshot::from(from),
            to_station: StationSnapshot::from(to),
            distance_miles: distance,
            speed_mph: speed_mph(distance, duration_minutes),
        }))
    }
}

fn parse_id(line: u64, field: &'static str, value: &str) -> Result<i64, EnrichError> {
    value
        .trim()
        .parse()
        .map_err(|source| EnrichError::MalformedIdentifier {
            line,
            field,
            value: value.to_string(),
            source,
        })
}

/// Empty, unparsable and non-positive years all mean "unknown".
fn parse_birth_year(trip_id: i64, value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    match value.parse::<i64>() {
        Ok(year) if year > 0 => Some(year),
        Ok(_) => None,
        Err(e) => {
            warn!(id = trip_id, value, error = %e, "Converting Birth Year to int");
            None
        }
    }
}

fn coordinate(station: &Station) -> Result<Coordinate, EnrichError> {
    let parse = |field: &'static str, value: &str| {
        parse_finite(value).map_err(|source| EnrichError::MalformedCoordinate {
            station_id: station.id,
            field,
            value: value.to_string(),
            source,
        })
    };
    Ok(Coordinate::new(
        parse("latitude", &station.latitude)?,
        parse("longitude", &station.longitude)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn registry() -> StationRegistry {
        let mut registry = StationRegistry::new();
        registry.insert(Station {
            id: 100,
            name: "Main".into(),
            city: "Chicago".into(),
            latitude: "41.88".into(),
            longitude: "-87.63".into(),
            total_docks: 10,
        });
        registry.insert(Station {
            id: 200,
            name: "Lake".into(),
            city: "Chicago".into(),
            latitude: "41.89".into(),
            longitude: "-87.62".into(),
            total_docks: 19,
        });
        registry.insert(Station {
            id: 300,
            name: "Broken".into(),
            city: "Chicago".into(),
            latitude: "north-ish".into(),
            longitude: "-87.62".into(),
            total_docks: 1,
        });
        registry.insert(Station {
            id: 400,
            name: "Nowhere".into(),
            city: "Chicago".into(),
            latitude: "41.9".into(),
            longitude: "inf".into(),
            total_docks: 1,
        });
        registry
    }

    fn normalizer() -> TimestampNormalizer {
        TimestampNormalizer::with_offset(FixedOffset::west_opt(6 * 3600).unwrap())
    }

    fn row(
        id: &str,
        duration: &str,
        from: &str,
        to: &str,
        user_type: &str,
        gender: &str,
        birth_year: &str,
    ) -> RawTripRecord {
        RawTripRecord::from_fields(
            2,
            [
                id,
                "1/1/2017 08:00:00",
                "1/1/2017 08:15:00",
                "5",
                duration,
                from,
                "From",
                to,
                "To",
                user_type,
                gender,
                birth_year,
            ],
        )
    }

    fn expect_trip(enrichment: Enrichment) -> EnrichedTrip {
        match enrichment {
            Enrichment::Trip(trip) => trip,
            Enrichment::Skip(reason) => panic!("unexpected skip: {reason:?}"),
        }
    }

    #[test]
    fn round_trip_at_same_station() {
        let stations = registry();
        let enricher = TripEnricher::new(&stations, normalizer());
        let trip = expect_trip(
            enricher
                .enrich(&row("1", "900", "100", "100", "Customer", "", ""))
                .unwrap(),
        );

        assert_eq!(trip.id, 1);
        assert_eq!(trip.bike_id, 5);
        assert_eq!(trip.start_time, "2017-01-01T08:00:00-06:00");
        assert_eq!(trip.end_time, "2017-01-01T08:15:00-06:00");
        assert_eq!(trip.day_of_week, "Sunday");
        assert_eq!(trip.duration_minutes, 15.0);
        assert_eq!(trip.user_type, UserType::Casual);
        assert_eq!(trip.distance_miles, 0.0);
        assert_eq!(trip.speed_mph, 0.0);
        assert_eq!(trip.gender, None);
        assert_eq!(trip.birth_year, None);
        assert_eq!(trip.age, None);
        assert_eq!(trip.from_station.name, "Main");
        assert_eq!(trip.from_station.geo.lat, "41.88");
        assert_eq!(trip.to_station.total_docks, 10);
    }

    #[test]
    fn derives_distance_speed_and_age() {
        let stations = registry();
        let enricher = TripEnricher::new(&stations, normalizer());
        let trip = expect_trip(
            enricher
                .enrich(&row("7", "1,200", "100", "200", "Subscriber", "Female", "1985"))
                .unwrap(),
        );

        assert_eq!(trip.duration_minutes, 20.0);
        assert_eq!(trip.user_type, UserType::Subscriber);
        assert_eq!(trip.gender.as_deref(), Some("Female"));
        assert_eq!(trip.birth_year, Some(1985));
        assert_eq!(trip.age, Some(REFERENCE_YEAR - 1985));
        assert!(trip.distance_miles > 0.8 && trip.distance_miles < 0.9);
        let expected = trip.distance_miles / (20.0 / 60.0);
        assert!((trip.speed_mph - expected).abs() < 1e-12);
        assert_eq!(trip.to_station.name, "Lake");
    }

    #[test]
    fn unknown_stations_are_skipped() {
        let stations = registry();
        let enricher = TripEnricher::new(&stations, normalizer());

        let from_miss = enricher
            .enrich(&row("1", "900", "999", "100", "Subscriber", "", ""))
            .unwrap();
        assert_eq!(from_miss, Enrichment::Skip(SkipReason::UnknownFromStation(999)));

        let to_miss = enricher
            .enrich(&row("1", "900", "100", "998", "Subscriber", "", ""))
            .unwrap();
        assert_eq!(to_miss, Enrichment::Skip(SkipReason::UnknownToStation(998)));
    }

    #[test]
    fn bad_birth_year_is_not_fatal() {
        let stations = registry();
        let enricher = TripEnricher::new(&stations, normalizer());

        for year in ["unknown", "0", "-4"] {
            let trip = expect_trip(
                enricher
                    .enrich(&row("3", "60", "100", "200", "Subscriber", "Male", year))
                    .unwrap(),
            );
            assert_eq!(trip.birth_year, None, "year {year:?}");
            assert_eq!(trip.age, None, "year {year:?}");
        }
    }

    #[test]
    fn malformed_required_fields_are_fatal() {
        let stations = registry();
        let enricher = TripEnricher::new(&stations, normalizer());

        let err = enricher
            .enrich(&row("x1", "900", "100", "100", "Subscriber", "", ""))
            .unwrap_err();
        assert!(matches!(
            err,
            EnrichError::MalformedIdentifier { field: "trip_id", .. }
        ));

        let err = enricher
            .enrich(&row("1", "fifteen", "100", "100", "Subscriber", "", ""))
            .unwrap_err();
        assert!(matches!(err, EnrichError::MalformedDuration { .. }));

        let err = enricher
            .enrich(&row("1", "900", "abc", "100", "Subscriber", "", ""))
            .unwrap_err();
        assert!(matches!(
            err,
            EnrichError::MalformedIdentifier {
                field: "from_station_id",
                ..
            }
        ));

        let err = enricher
            .enrich(&row("1", "900", "100", "300", "Subscriber", "", ""))
            .unwrap_err();
        assert!(matches!(
            err,
            EnrichError::MalformedCoordinate {
                station_id: 300,
                field: "latitude",
                ..
            }
        ));
    }

    #[test]
    fn non_finite_numbers_are_fatal() {
        let stations = registry();
        let enricher = TripEnricher::new(&stations, normalizer());

        for duration in ["NaN", "inf", "-infinity"] {
            let err = enricher
                .enrich(&row("1", duration, "100", "100", "Subscriber", "", ""))
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    EnrichError::MalformedDuration {
                        source: NumberError::NotFinite,
                        ..
                    }
                ),
                "duration {duration:?}: {err:?}"
            );
        }

        let err = enricher
            .enrich(&row("1", "900", "100", "400", "Subscriber", "", ""))
            .unwrap_err();
        assert!(matches!(
            err,
            EnrichError::MalformedCoordinate {
                station_id: 400,
                field: "longitude",
                source: NumberError::NotFinite,
                ..
            }
        ));
    }

    #[test]
    fn bad_timestamp_is_fatal() {
        let stations = registry();
        let enricher = TripEnricher::new(&stations, normalizer());
        let mut fields: Vec<String> = row("1", "900", "100", "100", "Subscriber", "", "")
            .record
            .iter()
            .map(str::to_string)
            .collect();
        fields[columns::END_TIME] = "yesterday".to_string();

        let err = enricher
            .enrich(&RawTripRecord::from_fields(4, fields))
            .unwrap_err();
        assert!(matches!(
            err,
            EnrichError::Timestamp {
                line: 4,
                field: "end_time",
                ..
            }
        ));
    }

    #[test]
    fn short_row_is_fatal() {
        let stations = registry();
        let enricher = TripEnricher::new(&stations, normalizer());
        let err = enricher
            .enrich(&RawTripRecord::from_fields(9, ["1", "1/1/2017"]))
            .unwrap_err();
        assert!(matches!(
            err,
            EnrichError::MissingField {
                line: 9,
                expected: 12,
                found: 2
            }
        ));
    }
}
