//! Photo record data model.
//!
//! A captured image pinned to the position known when it was taken. The
//! encoded image (a data URL) is stored as fixed-size string slices so that
//! storage layers with per-value limits never truncate it.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// Chunk size used by the recorder when none is configured.
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(size) => size,
    None => panic!("chunk size must be non-zero"),
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    /// Whole degrees, 0..=359.
    pub heading: u16,
    #[serde(rename = "src_chunks")]
    pub image_chunks: Vec<String>,
    #[serde(rename = "timestamp")]
    pub captured_at_ms: i64,
}

impl PhotoRecord {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Reassembles the encoded image from its chunks.
    pub fn image(&self) -> String {
        self.image_chunks.concat()
    }
}

/// Rounds a compass reading to a whole degree in 0..=359.
pub fn normalize_heading(heading: f64) -> u16 {
    if !heading.is_finite() {
        return 0;
    }
    (heading.round() as i64).rem_euclid(360) as u16
}

/// Splits `encoded` into slices of at most `size` characters.
///
/// Splits on character boundaries, so multi-byte text never yields an
/// invalid slice. An empty input yields no chunks.
pub fn chunk_encoded(encoded: &str, size: NonZeroUsize) -> Vec<String> {
    let size = size.get();
    let mut chunks = Vec::with_capacity(encoded.len() / size + 1);
    let mut current = String::with_capacity(size);
    let mut count = 0;

    for ch in encoded.chars() {
        current.push(ch);
        count += 1;
        if count == size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
