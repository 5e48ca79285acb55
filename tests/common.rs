#![allow(dead_code)]
use assert_cmd::{cargo_bin_cmd, Command};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use runlog_lib::{
    models::RawFix, OrientationEvent, PositionEvent, RecoveryStore, RunController, RunEvent,
    SensorFeed, TrackerConfig,
};
use tokio::sync::broadcast;

pub fn runlog() -> Command {
    cargo_bin_cmd!("runlog")
}

/// Unique path inside the system temp dir; any existing file is removed.
pub fn temp_path(name: &str, ext: &str) -> PathBuf {
    let mut path: PathBuf = env::temp_dir();
    path.push(format!("{}_{}_runlog.{}", name, uuid::Uuid::new_v4(), ext));
    fs::remove_file(&path).ok();
    path
}

/// Controller wired to in-process feeds and an in-memory recovery store.
pub struct Rig {
    pub controller: RunController,
    pub positions: SensorFeed<PositionEvent>,
    pub orientation: SensorFeed<OrientationEvent>,
    pub store: RecoveryStore,
}

pub fn rig() -> Rig {
    rig_with(TrackerConfig::default(), RecoveryStore::open_in_memory(None).unwrap())
}

pub fn rig_with(config: TrackerConfig, store: RecoveryStore) -> Rig {
    let positions = SensorFeed::new();
    let orientation = SensorFeed::new();
    let controller = RunController::new(
        config,
        store.clone(),
        Arc::new(positions.clone()),
        Arc::new(orientation.clone()),
    )
    .unwrap();
    Rig {
        controller,
        positions,
        orientation,
        store,
    }
}

pub fn fix(latitude: f64, longitude: f64) -> PositionEvent {
    PositionEvent::Fix(RawFix::new(
        latitude,
        longitude,
        Some(2.5),
        chrono::Utc::now().timestamp_millis(),
    ))
}

/// Waits for the first event matching `pred`, skipping everything else.
pub async fn next_matching<F>(events: &mut broadcast::Receiver<RunEvent>, pred: F) -> RunEvent
where
    F: Fn(&RunEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Publishes a fix and waits until the controller has accepted or rejected it.
pub async fn feed_fix(rig: &Rig, events: &mut broadcast::Receiver<RunEvent>, event: PositionEvent) -> RunEvent {
    assert_eq!(rig.positions.publish(event), 1, "tracking loop not subscribed");
    next_matching(events, |e| {
        matches!(e, RunEvent::PositionAccepted { .. } | RunEvent::FixRejected { .. })
    })
    .await
}

/// Writes a small two-point export for CLI tests and returns its path.
pub fn write_sample_export(name: &str) -> PathBuf {
    let path = temp_path(name, "json");
    let json = r#"{
        "version": "2.0",
        "date": "2024-05-01T06:12:34.000Z",
        "total_dist": 1523.4,
        "duration": "12:34",
        "track_points": [
            { "time": 0, "absTime": 1714543200000, "lat": 47.0, "lng": 8.0, "vel": 1.2 },
            { "time": 65, "absTime": 1714543265000, "lat": 47.01, "lng": 8.01, "vel": 3.46 }
        ],
        "photos": [
            { "lat": 47.01, "lng": 8.01, "heading": 270, "src_chunks": ["data:image/jpeg;", "base64,AAAA"], "timestamp": 1714543266000 }
        ]
    }"#;
    fs::write(&path, json).unwrap();
    path
}
