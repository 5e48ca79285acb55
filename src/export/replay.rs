//! Read side of the export format: path, photos and a scrubber over track points.

use std::path::Path;

use serde::Deserialize;

use crate::{
    error::{TrackerError, TrackerResult},
    geo::{self, Coordinate},
    models::{normalize_heading, TrackPoint},
    utils::time::format_clock,
};

/// Photo entry as found in any version of the file. Older files carry the
/// whole image in `src` instead of `src_chunks`.
#[derive(Debug, Deserialize)]
struct PhotoEntry {
    lat: f64,
    lng: f64,
    #[serde(default)]
    heading: Option<f64>,
    #[serde(default)]
    src_chunks: Option<Vec<String>>,
    #[serde(default)]
    src: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ReplayDocument {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    total_dist: Option<f64>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    track_points: Vec<TrackPoint>,
    #[serde(default)]
    photos: Vec<PhotoEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayPhoto {
    pub latitude: f64,
    pub longitude: f64,
    /// Present only when the file recorded a non-zero heading.
    pub heading: Option<u16>,
    /// Reassembled encoded image.
    pub image: String,
    pub captured_at_ms: Option<i64>,
}

/// Where the scrubber marker sits and what the info line reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrubFrame {
    pub latitude: f64,
    pub longitude: f64,
    pub time_secs: f64,
    pub velocity: f64,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west: Coordinate,
    pub north_east: Coordinate,
}

/// A loaded run, read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    version: Option<String>,
    date: Option<String>,
    total_distance_m: f64,
    duration: Option<String>,
    track_points: Vec<TrackPoint>,
    photos: Vec<ReplayPhoto>,
}

impl Replay {
    /// Parses an export document. Invalid input fails as a whole.
    pub fn from_json(text: &str) -> TrackerResult<Self> {
        let document: ReplayDocument = serde_json::from_str(text)
            .map_err(|err| TrackerError::MalformedImport(err.to_string()))?;

        let total_distance_m = document
            .total_dist
            .filter(|d| d.is_finite())
            .unwrap_or_else(|| geo::path_length(document.track_points.iter().map(TrackPoint::coordinate)));

        let photos = document
            .photos
            .into_iter()
            .map(|entry| ReplayPhoto {
                latitude: entry.lat,
                longitude: entry.lng,
                heading: entry
                    .heading
                    .map(normalize_heading)
                    .filter(|heading| *heading != 0),
                image: match entry.src_chunks {
                    Some(chunks) => chunks.concat(),
                    None => entry.src.unwrap_or_default(),
                },
                captured_at_ms: entry.timestamp,
            })
            .collect();

        Ok(Self {
            version: document.version,
            date: document.date,
            total_distance_m,
            duration: document.duration,
            track_points: document.track_points,
            photos,
        })
    }

    pub fn open(path: &Path) -> TrackerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            TrackerError::MalformedImport(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }

    pub fn duration(&self) -> Option<&str> {
        self.duration.as_deref()
    }

    pub fn track_points(&self) -> &[TrackPoint] {
        &self.track_points
    }

    pub fn photos(&self) -> &[ReplayPhoto] {
        &self.photos
    }

    pub fn path(&self) -> Vec<Coordinate> {
        self.track_points.iter().map(TrackPoint::coordinate).collect()
    }

    /// Smallest box containing the whole path, for fitting the map.
    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.track_points.first()?.coordinate();
        let mut south_west = first;
        let mut north_east = first;
        for point in &self.track_points[1..] {
            south_west.latitude = south_west.latitude.min(point.latitude);
            south_west.longitude = south_west.longitude.min(point.longitude);
            north_east.latitude = north_east.latitude.max(point.latitude);
            north_east.longitude = north_east.longitude.max(point.longitude);
        }
        Some(Bounds {
            south_west,
            north_east,
        })
    }

    /// Highest valid scrubber index, `None` for an empty track.
    pub fn slider_max(&self) -> Option<usize> {
        self.track_points.len().checked_sub(1)
    }

    /// Looks up the point at `index`. Nothing is interpolated or recomputed.
    pub fn scrub(&self, index: usize) -> Option<ScrubFrame> {
        let point = self.track_points.get(index)?;
        Some(ScrubFrame {
            latitude: point.latitude,
            longitude: point.longitude,
            time_secs: point.elapsed_secs,
            velocity: point.speed,
            label: format!(
                "Time: {} | Vel: {:.1} m/s",
                format_clock(point.elapsed_secs),
                point.speed
            ),
        })
    }
}
