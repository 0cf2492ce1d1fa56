use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("timestamp {input:?} matches none of the known layouts")]
    UnparseableTimestamp { input: String },
}

/// Layouts seen across the trip exports, most specific first.
#[derive(Clone, Copy, Debug)]
enum Layout {
    DateTime(&'static str),
    DateOnly(&'static str),
}

const LAYOUTS: &[Layout] = &[
    Layout::DateTime("%m/%d/%Y %H:%M:%S"),
    Layout::DateTime("%m/%d/%Y %H:%M"),
    Layout::DateOnly("%m/%d/%Y"),
    Layout::DateTime("%Y-%m-%d %H:%M:%S"),
    Layout::DateTime("%Y-%m-%d %H:%M"),
];

impl Layout {
    fn parse(&self, s: &str) -> Option<NaiveDateTime> {
        let naive = match self {
            Layout::DateTime(fmt) => NaiveDateTime::parse_from_str(s, fmt).ok(),
            Layout::DateOnly(fmt) => NaiveDate::parse_from_str(s, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
        }?;
        strict(naive)
    }
}

/// `%Y` takes a year of any width and `%S` takes a leap second; the exports
/// only ever carry four-digit years and seconds 0-59.
fn strict(naive: NaiveDateTime) -> Option<NaiveDateTime> {
    let four_digit_year = (1000..=9999).contains(&naive.year());
    let leap_second = naive.nanosecond() >= 1_000_000_000;
    (four_digit_year && !leap_second).then_some(naive)
}

/// Turns zone-naive local timestamps into offset-bearing instants.
///
/// The offset is the zone's offset at the moment the normalizer was built, not
/// the one in force on the record's date, so records on the other side of a
/// daylight-saving change come out an hour off.
#[derive(Clone, Copy, Debug)]
pub struct TimestampNormalizer {
    offset: FixedOffset,
}

impl TimestampNormalizer {
    /// Use the current UTC offset of `zone`.
    pub fn for_zone(zone: Tz) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            offset: zone.offset_from_utc_datetime(&now).fix(),
        }
    }

    /// Pin the offset explicitly.
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn parse(&self, local: &str) -> Result<DateTime<FixedOffset>, TimestampError> {
        let trimmed = local.trim();
        LAYOUTS
            .iter()
            .find_map(|layout| layout.parse(trimmed))
            .and_then(|naive| self.offset.from_local_datetime(&naive).single())
            .ok_or_else(|| TimestampError::UnparseableTimestamp {
                input: local.to_string(),
            })
    }
}

/// RFC 3339 at second precision, e.g. `2017-03-31T23:59:07-05:00`.
pub fn to_canonical(instant: &DateTime<FixedOffset>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Full English weekday name, e.g. `Friday`.
pub fn weekday_name(instant: &DateTime<FixedOffset>) -> String {
    instant.format("%A").to_string()
}
