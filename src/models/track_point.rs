//! Track point data model.
//!
//! One recorded GPS fix. Serialized with the short field names shared by the
//! crash-recovery blob and the export document.

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Seconds since the run started.
    #[serde(rename = "time")]
    pub elapsed_secs: f64,
    /// Source device clock, epoch milliseconds.
    #[serde(rename = "absTime", default)]
    pub absolute_timestamp: i64,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    /// Meters per second, 0 when the receiver did not report one.
    #[serde(rename = "vel", default)]
    pub speed: f64,
}

impl TrackPoint {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Raw position sample as delivered by the location source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed: Option<f64>,
    /// Device timestamp of the fix, epoch milliseconds.
    pub timestamp: i64,
}

impl RawFix {
    pub fn new(latitude: f64, longitude: f64, speed: Option<f64>, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            speed,
            timestamp,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Reported speed, or 0 when absent, negative or not a number.
    pub fn speed_or_zero(&self) -> f64 {
        match self.speed {
            Some(v) if v.is_finite() && v >= 0.0 => v,
            _ => 0.0,
        }
    }
}

/// Most recent accepted position, used for distance steps and photo placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastKnownPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
}

impl LastKnownPosition {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

impl From<&TrackPoint> for LastKnownPosition {
    fn from(point: &TrackPoint) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            speed: point.speed,
        }
    }
}
