use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{TrackerError, TrackerResult},
    geo::{self, Coordinate},
    models::{chunk_encoded, normalize_heading, LastKnownPosition, PhotoRecord, RawFix, TrackPoint},
    recovery::RecoverySnapshot,
    utils::time::{elapsed_secs, format_clock},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Idle,
    Recording,
    Paused,
    Exported,
}

impl Default for RunStatus {
    fn default() -> Self {
        RunStatus::Idle
    }
}

/// The aggregate run record.
///
/// `total_distance_m` is maintained incrementally as fixes arrive and always
/// equals the sum of consecutive distances over `track_points`, except after a
/// restore where the persisted total is trusted as-is.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    status: RunStatus,
    run_id: Option<Uuid>,
    started_at_ms: Option<i64>,
    track_points: Vec<TrackPoint>,
    photos: Vec<PhotoRecord>,
    total_distance_m: f64,
    last_known: Option<LastKnownPosition>,
    /// Clock reading captured when the run left `Recording`.
    frozen_elapsed_secs: Option<f64>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_recording(&self) -> bool {
        self.status == RunStatus::Recording
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    pub fn started_at_ms(&self) -> Option<i64> {
        self.started_at_ms
    }

    pub fn track_points(&self) -> &[TrackPoint] {
        &self.track_points
    }

    pub fn photos(&self) -> &[PhotoRecord] {
        &self.photos
    }

    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }

    pub fn last_known(&self) -> Option<LastKnownPosition> {
        self.last_known
    }

    /// Enters `Recording`. Stamps the start time on the first call of a run and
    /// returns whether it did.
    pub fn begin(&mut self, now_ms: i64) -> bool {
        self.status = RunStatus::Recording;
        self.frozen_elapsed_secs = None;
        if self.started_at_ms.is_some() {
            return false;
        }
        self.started_at_ms = Some(now_ms);
        self.run_id = Some(Uuid::new_v4());
        true
    }

    /// Leaves `Recording` and stops the clock at `now_ms`.
    pub fn pause(&mut self, now_ms: i64) {
        if self.status == RunStatus::Recording {
            self.frozen_elapsed_secs = Some(self.live_elapsed_secs(now_ms));
            self.status = RunStatus::Paused;
        }
    }

    pub fn mark_exported(&mut self) {
        self.status = RunStatus::Exported;
    }

    /// Turns a raw fix into a track point and advances the distance.
    ///
    /// The first fix of a run only establishes the reference position; every
    /// later fix adds the great-circle step from the previous one.
    pub fn ingest(&mut self, fix: RawFix, now_ms: i64) -> TrackerResult<TrackPoint> {
        let started_at_ms = self.started_at_ms.ok_or(TrackerError::NotStarted)?;
        validate_fix(&fix)?;

        let coordinate = fix.coordinate();
        let speed = fix.speed_or_zero();

        if let Some(previous) = self.last_known {
            self.total_distance_m += geo::distance(previous.coordinate(), coordinate);
        }

        let point = TrackPoint {
            elapsed_secs: elapsed_secs(started_at_ms, now_ms),
            absolute_timestamp: fix.timestamp,
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            speed,
        };
        self.track_points.push(point);
        self.last_known = Some(LastKnownPosition {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            speed,
        });

        Ok(point)
    }

    /// Pins an encoded image to the last known position.
    ///
    /// Fails with [`TrackerError::NoFixYet`] and leaves the photo list untouched
    /// when no fix has been received.
    pub fn attach_photo(
        &mut self,
        encoded_image: &str,
        heading: f64,
        now_ms: i64,
        chunk_size: NonZeroUsize,
    ) -> TrackerResult<PhotoRecord> {
        let position = self.last_known.ok_or(TrackerError::NoFixYet)?;

        let record = PhotoRecord {
            latitude: position.latitude,
            longitude: position.longitude,
            heading: normalize_heading(heading),
            image_chunks: chunk_encoded(encoded_image, chunk_size),
            captured_at_ms: now_ms,
        };
        self.photos.push(record.clone());
        Ok(record)
    }

    /// Drops everything and returns to `Idle`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Replaces the state with a recovered run, ready to resume but paused.
    ///
    /// Nothing is recomputed; the persisted distance is taken verbatim.
    pub fn restore(&mut self, snapshot: RecoverySnapshot) {
        let last_known = snapshot.track_points.last().map(LastKnownPosition::from);
        // The pause instant is not persisted; the last fix is the closest record of it.
        let recorded_secs = snapshot
            .track_points
            .last()
            .map(|point| point.elapsed_secs.max(0.0))
            .unwrap_or(0.0);
        *self = Self {
            status: RunStatus::Paused,
            run_id: Some(Uuid::new_v4()),
            started_at_ms: Some(snapshot.started_at_ms),
            track_points: snapshot.track_points,
            photos: Vec::new(),
            total_distance_m: snapshot.total_distance_m,
            last_known,
            frozen_elapsed_secs: Some(recorded_secs),
        };
    }

    /// Persistable view of the run; `None` until the run has started.
    pub fn recovery_snapshot(&self) -> Option<RecoverySnapshot> {
        let started_at_ms = self.started_at_ms?;
        Some(RecoverySnapshot {
            track_points: self.track_points.clone(),
            total_distance_m: self.total_distance_m,
            started_at_ms,
        })
    }

    /// Run clock in seconds. Live while recording, frozen at the pause
    /// instant otherwise, 0 before the run has started.
    pub fn elapsed_secs(&self, now_ms: i64) -> f64 {
        match self.frozen_elapsed_secs {
            Some(frozen) if !self.is_recording() => frozen,
            _ => self.live_elapsed_secs(now_ms),
        }
    }

    fn live_elapsed_secs(&self, now_ms: i64) -> f64 {
        self.started_at_ms
            .map(|start| elapsed_secs(start, now_ms).max(0.0))
            .unwrap_or(0.0)
    }

    /// Elapsed time as `MM:SS`.
    pub fn duration_label(&self, now_ms: i64) -> String {
        format_clock(self.elapsed_secs(now_ms))
    }

    /// Path vertices in recording order.
    pub fn path(&self) -> Vec<Coordinate> {
        self.track_points.iter().map(TrackPoint::coordinate).collect()
    }

    pub fn photo_markers(&self) -> Vec<Coordinate> {
        self.photos.iter().map(PhotoRecord::coordinate).collect()
    }
}

fn validate_fix(fix: &RawFix) -> TrackerResult<()> {
    if !fix.coordinate().is_finite() {
        return Err(TrackerError::InvalidFix(format!(
            "non-finite coordinate ({}, {})",
            fix.latitude, fix.longitude
        )));
    }
    if !(-90.0..=90.0).contains(&fix.latitude) || !(-180.0..=180.0).contains(&fix.longitude) {
        return Err(TrackerError::InvalidFix(format!(
            "coordinate out of range ({}, {})",
            fix.latitude, fix.longitude
        )));
    }
    Ok(())
}
