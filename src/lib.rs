pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod geo;
pub mod models;
pub mod recovery;
pub mod sensing;
pub mod session;
pub mod utils;

pub use config::{ConfigStore, TrackerConfig};
pub use error::{TrackerError, TrackerResult};
pub use export::{ExportBundle, ExportDocument, ExportKind, Replay};
pub use recovery::{RecoverySnapshot, RecoveryStore};
pub use sensing::{HeadingMode, OrientationEvent, PositionEvent, SensorFault, SensorFeed};
pub use session::{RestoreOutcome, RunController, RunEvent, RunStatus, SessionState};
pub use utils::init_logging;
