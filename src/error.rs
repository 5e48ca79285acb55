use rusqlite::ErrorCode;
use thiserror::Error;

/// Failures surfaced by the run-session core.
///
/// Sensor faults and persistence failures are absorbed into reported events
/// rather than returned from lifecycle operations; only the variants below
/// cross an operation boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("run has not been started")]
    NotStarted,

    #[error("invalid position fix: {0}")]
    InvalidFix(String),

    #[error("no position fix yet, wait for GPS before taking a photo")]
    NoFixYet,

    #[error("run is already recording")]
    AlreadyRecording,

    #[error("run is not recording")]
    NotRecording,

    #[error("malformed run file: {0}")]
    MalformedImport(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// The recovery store hit its size ceiling.
    #[error("storage full: {0}")]
    StorageFull(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TrackerError {
    /// True when a persistence failure came from the storage ceiling being hit.
    pub fn is_capacity(&self) -> bool {
        matches!(self, TrackerError::StorageFull(_))
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

impl From<anyhow::Error> for TrackerError {
    fn from(err: anyhow::Error) -> Self {
        let disk_full = err.chain().any(|cause| {
            cause
                .downcast_ref::<rusqlite::Error>()
                .and_then(rusqlite::Error::sqlite_error_code)
                == Some(ErrorCode::DiskFull)
        });
        if disk_full {
            TrackerError::StorageFull(format!("{err:#}"))
        } else {
            TrackerError::Storage(format!("{err:#}"))
        }
    }
}
