// src/trip.rs
use csv::StringRecord;
use serde::Serialize;

use crate::station::Station;

/// Column positions in the trip exports.
pub mod columns {
    pub const TRIP_ID: usize = 0;
    pub const START_TIME: usize = 1;
    pub const END_TIME: usize = 2;
    pub const BIKE_ID: usize = 3;
    pub const DURATION: usize = 4;
    pub const FROM_STATION_ID: usize = 5;
    pub const TO_STATION_ID: usize = 7;
    pub const USER_TYPE: usize = 9;
    pub const GENDER: usize = 10;
    pub const BIRTH_YEAR: usize = 11;

    /// Fields every data row must carry.
    pub const COUNT: usize = 12;
}

/// One trip row as read from disk, with its line number for error reports.
#[derive(Debug, Clone)]
pub struct RawTripRecord {
    pub line: u64,
    pub record: StringRecord,
}

impl RawTripRecord {
    pub fn new(line: u64, record: StringRecord) -> Self {
        Self { line, record }
    }

    /// Build from string fields; handy for tests and synthetic rows.
    pub fn from_fields<I, T>(line: u64, fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            line,
            record: fields.into_iter().collect(),
        }
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.record.get(idx)
    }

    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }
}

/// Rider category. The older `Customer` label is folded into `Casual`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum UserType {
    Subscriber,
    Casual,
    Other(String),
}

impl UserType {
    pub fn normalize(raw: &str) -> Self {
        match raw {
            "Customer" | "Casual" => UserType::Casual,
            "Subscriber" => UserType::Subscriber,
            other => UserType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            UserType::Subscriber => "Subscriber",
            UserType::Casual => "Casual",
            UserType::Other(s) => s,
        }
    }
}

impl From<UserType> for String {
    fn from(value: UserType) -> Self {
        value.as_str().to_string()
    }
}

/// Coordinates as strings, exactly as the station export wrote them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Geo {
    pub lat: String,
    pub lon: String,
}

/// Station attributes copied onto a trip at join time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationSnapshot {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub geo: Geo,
    pub total_docks: u32,
}

impl From<&Station> for StationSnapshot {
    fn from(station: &Station) -> Self {
        Self {
            id: station.id,
            name: station.name.clone(),
            city: station.city.clone(),
            geo: Geo {
                lat: station.latitude.clone(),
                lon: station.longitude.clone(),
            },
            total_docks: station.total_docks,
        }
    }
}

/// The document indexed for each trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedTrip {
    pub id: i64,
    pub start_time: String,
    pub end_time: String,
    pub day_of_week: String,
    pub bike_id: i64,
    pub duration_minutes: f64,
    pub user_type: UserType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    pub from_station: StationSnapshot,
    pub to_station: StationSnapshot,
    pub distance_miles: f64,
    pub speed_mph: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_becomes_casual() {
        assert_eq!(UserType::normalize("Customer"), UserType::Casual);
        assert_eq!(UserType::normalize("Subscriber"), UserType::Subscriber);
        assert_eq!(
            UserType::normalize("Dependent"),
            UserType::Other("Dependent".to_string())
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["Customer", "Subscriber", "Casual", "Dependent", ""] {
            let once = UserType::normalize(raw);
            let twice = UserType::normalize(once.as_str());
            assert_eq!(once, twice, "raw {raw:?}");
        }
    }

    #[test]
    fn optional_fields_are_omitted() {
        let station = StationSnapshot {
            id: 1,
            name: "Main".into(),
            city: "Chicago".into(),
            geo: Geo {
                lat: "41.88".into(),
                lon: "-87.63".into(),
            },
            total_docks: 10,
        };
        let trip = EnrichedTrip {
            id: 9,
            start_time: "2017-01-01T08:00:00-06:00".into(),
            end_time: "2017-01-01T08:15:00-06:00".into(),
            day_of_week: "Sunday".into(),
            bike_id: 5,
            duration_minutes: 15.0,
            user_type: UserType::Casual,
            gender: None,
            birth_year: None,
            age: None,
            from_station: station.clone(),
            to_station: station,
            distance_miles: 0.0,
            speed_mph: 0.0,
        };

        let json = serde_json::to_value(&trip).unwrap();
        assert_eq!(json["user_type"], "Casual");
        assert_eq!(json["from_station"]["geo"]["lat"], "41.88");
        assert!(json.get("gender").is_none());
        assert!(json.get("age").is_none());
        assert!(json.get("birth_year").is_none());
    }
}
