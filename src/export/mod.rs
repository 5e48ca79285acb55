//! Versioned JSON export of a run, shared by the recorder and the viewer.

pub mod replay;

use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    models::{PhotoRecord, TrackPoint},
    session::SessionState,
    utils::time::{file_safe_timestamp, iso_timestamp},
};

pub use replay::{Bounds, Replay, ReplayPhoto, ScrubFrame};

pub const FORMAT_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: String,
    /// ISO-8601 export time.
    pub date: String,
    pub total_dist: f64,
    /// Run clock at export, `MM:SS`. Stops while the run is paused.
    pub duration: String,
    pub track_points: Vec<TrackPoint>,
    /// Empty for track-only exports.
    pub photos: Vec<PhotoRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Track plus photos.
    Full,
    /// Track only.
    Track,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Full => "FULL",
            ExportKind::Track => "TRACK",
        }
    }

    pub fn includes_photos(&self) -> bool {
        matches!(self, ExportKind::Full)
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished export: the document plus the file name it should be saved under.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportBundle {
    pub kind: ExportKind,
    pub file_name: String,
    pub document: ExportDocument,
}

impl ExportBundle {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.document).context("failed to encode export document")
    }

    /// Writes the document into `dir` and returns the full path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create export directory {}", dir.display()))?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, self.to_json()?)
            .with_context(|| format!("failed to write export to {}", path.display()))?;
        Ok(path)
    }
}

/// `Run_<timestamp>_<FULL|TRACK>.json`
pub fn export_file_name(at: DateTime<Utc>, kind: ExportKind) -> String {
    format!("Run_{}_{}.json", file_safe_timestamp(at), kind)
}

/// Builds the export document from a session snapshot taken at `at`.
pub fn build_document(state: &SessionState, kind: ExportKind, at: DateTime<Utc>) -> ExportDocument {
    ExportDocument {
        version: FORMAT_VERSION.to_string(),
        date: iso_timestamp(at),
        total_dist: state.total_distance_m(),
        duration: state.duration_label(at.timestamp_millis()),
        track_points: state.track_points().to_vec(),
        photos: if kind.includes_photos() {
            state.photos().to_vec()
        } else {
            Vec::new()
        },
    }
}

pub fn bundle(state: &SessionState, kind: ExportKind, at: DateTime<Utc>) -> ExportBundle {
    ExportBundle {
        kind,
        file_name: export_file_name(at, kind),
        document: build_document(state, kind, at),
    }
}
