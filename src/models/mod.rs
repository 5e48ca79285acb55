pub mod photo;
pub mod track_point;

pub use photo::{chunk_encoded, normalize_heading, PhotoRecord, DEFAULT_CHUNK_SIZE};
pub use track_point::{LastKnownPosition, RawFix, TrackPoint};
