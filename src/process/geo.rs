use geo::{Distance, HaversineMeasure, Point};

pub const EARTH_RADIUS_METERS: f64 = 6_378_100.0;
pub const MILES_PER_METER: f64 = 0.000621371;

/// A point in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl From<Coordinate> for Point<f64> {
    fn from(c: Coordinate) -> Self {
        Point::new(c.lon, c.lat)
    }
}

/// Great-circle distance in miles, on a sphere of `EARTH_RADIUS_METERS`.
pub fn distance_miles(from: Coordinate, to: Coordinate) -> f64 {
    let meters = HaversineMeasure::new(EARTH_RADIUS_METERS)
        .distance(Point::from(from), Point::from(to));
    meters * MILES_PER_METER
}

/// Average speed over the trip. Zero-length trips report 0.0 instead of ∞/NaN.
pub fn speed_mph(distance_miles: f64, duration_minutes: f64) -> f64 {
    if duration_minutes <= 0.0 {
        return 0.0;
    }
    let mph = distance_miles / (duration_minutes / 60.0);
    if mph.is_finite() {
        mph
    } else {
        0.0
    }
}
