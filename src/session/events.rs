use serde::Serialize;

use crate::models::TrackPoint;
use crate::sensing::SensorFault;

use super::RunStatus;

/// Notifications for the presentation layer (map, counters, banners).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    StatusChanged {
        status: RunStatus,
    },
    /// Clock tick while recording, independent of fix arrival.
    Tick {
        elapsed_secs: f64,
        duration: String,
    },
    PositionAccepted {
        point: TrackPoint,
        total_distance_m: f64,
    },
    FixRejected {
        reason: String,
    },
    /// Transient location failure. Recording carries on.
    GpsLost {
        fault: SensorFault,
    },
    PhotoPlaced {
        latitude: f64,
        longitude: f64,
        heading: u16,
    },
    PersistFailed {
        reason: String,
    },
}
