use std::{sync::Arc, time::Duration};

use log::{info, warn};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::TrackerConfig,
    error::{TrackerError, TrackerResult},
    export::{self, ExportBundle, ExportKind},
    geo::Coordinate,
    models::{PhotoRecord, TrackPoint},
    recovery::{RecoverySnapshot, RecoveryStore},
    sensing::{HeadingMode, HeadingProvider, OrientationEvent, PositionEvent, SensorSource},
};

use super::{
    tracking::{now_ms, persist_snapshot, report_persist_failure, tracking_loop},
    RunEvent, RunStatus, SessionState,
};

const EVENT_CAPACITY: usize = 256;

/// Result of offering a crash-recovery record at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    NothingToRestore,
    Restored { track_points: usize },
    Discarded,
}

struct TrackingTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns one run and drives it through Idle → Recording ⇄ Paused → Exported.
///
/// While recording it holds two cancellable resources: the position
/// subscription loop and the elapsed-time ticker. Both are released whenever
/// the run leaves `Recording`.
#[derive(Clone)]
pub struct RunController {
    state: Arc<Mutex<SessionState>>,
    store: RecoveryStore,
    positions: Arc<dyn SensorSource<PositionEvent>>,
    heading: Arc<HeadingProvider>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tracking: Arc<Mutex<Option<TrackingTask>>>,
    events: broadcast::Sender<RunEvent>,
    config: Arc<TrackerConfig>,
}

impl RunController {
    pub fn new(
        config: TrackerConfig,
        store: RecoveryStore,
        positions: Arc<dyn SensorSource<PositionEvent>>,
        orientation: Arc<dyn SensorSource<OrientationEvent>>,
    ) -> TrackerResult<Self> {
        config.validate()?;
        let heading = HeadingProvider::new(
            config.heading_mode,
            orientation,
            config.heading_timeout(),
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            store,
            positions,
            heading: Arc::new(heading),
            ticker: Arc::new(Mutex::new(None)),
            tracking: Arc::new(Mutex::new(None)),
            events,
            config: Arc::new(config),
        })
    }

    pub fn events(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &RecoveryStore {
        &self.store
    }

    pub fn heading_mode(&self) -> HeadingMode {
        self.heading.mode()
    }

    /// Latest reading held by the continuous compass listener.
    pub fn cached_heading(&self) -> Option<f64> {
        self.heading.latest()
    }

    pub async fn status(&self) -> RunStatus {
        self.state.lock().await.status()
    }

    pub async fn session(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn total_distance_m(&self) -> f64 {
        self.state.lock().await.total_distance_m()
    }

    pub async fn elapsed_secs(&self) -> f64 {
        self.state.lock().await.elapsed_secs(now_ms())
    }

    pub async fn duration_label(&self) -> String {
        self.state.lock().await.duration_label(now_ms())
    }

    pub async fn track_points(&self) -> Vec<TrackPoint> {
        self.state.lock().await.track_points().to_vec()
    }

    pub async fn path(&self) -> Vec<Coordinate> {
        self.state.lock().await.path()
    }

    pub async fn photo_markers(&self) -> Vec<Coordinate> {
        self.state.lock().await.photo_markers()
    }

    /// Idle/Paused/Exported → Recording.
    ///
    /// A new run gets its start time here and is persisted immediately.
    /// Starting from `Exported` begins a fresh run.
    pub async fn start(&self) -> TrackerResult<()> {
        let fresh_snapshot = {
            let mut state = self.state.lock().await;
            match state.status() {
                RunStatus::Recording => return Err(TrackerError::AlreadyRecording),
                RunStatus::Exported => {
                    state.reset();
                    self.heading.clear();
                }
                RunStatus::Idle | RunStatus::Paused => {}
            }

            if state.begin(now_ms()) {
                info!(
                    "run {} started",
                    state.run_id().map(|id| id.to_string()).unwrap_or_default()
                );
                state.recovery_snapshot()
            } else {
                info!("run resumed with {} points", state.track_points().len());
                None
            }
        };
        persist_snapshot(&self.store, &self.events, fresh_snapshot);

        self.spawn_tracking().await;
        self.spawn_ticker().await;
        if self.heading.mode() == HeadingMode::Continuous {
            self.heading.start_listener().await;
        }

        self.emit_status(RunStatus::Recording);
        Ok(())
    }

    /// Recording → Paused. Releases every subscription and forces a write.
    pub async fn stop(&self) -> TrackerResult<()> {
        {
            let mut state = self.state.lock().await;
            if !state.is_recording() {
                return Err(TrackerError::NotRecording);
            }
            state.pause(now_ms());
        }

        self.release_recording_resources().await;

        let snapshot = self.state.lock().await.recovery_snapshot();
        persist_snapshot(&self.store, &self.events, snapshot);

        info!("run paused");
        self.emit_status(RunStatus::Paused);
        Ok(())
    }

    /// Any state → Idle. Wipes memory and the recovery store; not reversible.
    pub async fn reset(&self) {
        self.release_recording_resources().await;
        self.state.lock().await.reset();
        self.heading.clear();

        if let Err(err) = self.store.clear().await {
            report_persist_failure(&self.events, &err);
        }

        info!("run reset");
        self.emit_status(RunStatus::Idle);
    }

    /// Offers a crash-recovery record to `accept`. Accepted records replace
    /// the in-memory run and leave it paused; declined ones are wiped.
    pub async fn restore<F>(&self, accept: F) -> TrackerResult<RestoreOutcome>
    where
        F: FnOnce(&RecoverySnapshot) -> bool,
    {
        if self.state.lock().await.is_recording() {
            return Err(TrackerError::AlreadyRecording);
        }

        let snapshot = match self.store.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(RestoreOutcome::NothingToRestore),
            Err(err) => {
                warn!("recovery record unreadable, discarding: {err}");
                self.discard_recovery_record().await;
                return Ok(RestoreOutcome::Discarded);
            }
        };

        if !accept(&snapshot) {
            info!("recovery record declined");
            self.discard_recovery_record().await;
            return Ok(RestoreOutcome::Discarded);
        }

        let track_points = snapshot.track_points.len();
        self.state.lock().await.restore(snapshot);
        info!("restored unfinished run with {track_points} points");
        self.emit_status(RunStatus::Paused);
        Ok(RestoreOutcome::Restored { track_points })
    }

    /// Samples the heading per the configured mode, then attaches the photo.
    pub async fn capture_photo(&self, encoded_image: &str) -> TrackerResult<PhotoRecord> {
        let heading = self.heading.heading_now().await;
        self.attach_photo(encoded_image, heading).await
    }

    /// Pins `encoded_image` to the last known position.
    ///
    /// Photos live in memory only and are never written to the recovery store.
    pub async fn attach_photo(
        &self,
        encoded_image: &str,
        heading: f64,
    ) -> TrackerResult<PhotoRecord> {
        let record = {
            let mut state = self.state.lock().await;
            state.attach_photo(encoded_image, heading, now_ms(), self.config.chunk_size())
        };

        match record {
            Ok(record) => {
                let _ = self.events.send(RunEvent::PhotoPlaced {
                    latitude: record.latitude,
                    longitude: record.longitude,
                    heading: record.heading,
                });
                Ok(record)
            }
            Err(err) => {
                warn!("photo not recorded: {err}");
                Err(err)
            }
        }
    }

    pub async fn set_heading_mode(&self, mode: HeadingMode) {
        let recording = self.state.lock().await.is_recording();
        self.heading.set_mode(mode, recording).await;
    }

    /// Snapshot of the run as an export document. Does not change state.
    pub async fn export(&self, include_photos: bool) -> ExportBundle {
        let state = self.state.lock().await;
        let kind = if include_photos {
            ExportKind::Full
        } else {
            ExportKind::Track
        };
        if include_photos && state.photos().is_empty() {
            info!("exporting with photos requested but none captured");
        }
        export::bundle(&state, kind, chrono::Utc::now())
    }

    /// Full export, then drop the safety copy and mark the run exported.
    pub async fn export_and_discard(&self) -> TrackerResult<ExportBundle> {
        if self.state.lock().await.is_recording() {
            self.stop().await?;
        }

        let bundle = self.export(true).await;

        self.discard_recovery_record().await;
        self.state.lock().await.mark_exported();
        info!("run exported as {}", bundle.file_name);
        self.emit_status(RunStatus::Exported);
        Ok(bundle)
    }

    async fn discard_recovery_record(&self) {
        if let Err(err) = self.store.clear().await {
            report_persist_failure(&self.events, &err);
        }
    }

    async fn spawn_tracking(&self) {
        let mut tracking_guard = self.tracking.lock().await;
        if let Some(previous) = tracking_guard.take() {
            previous.cancel_token.cancel();
            previous.handle.abort();
        }

        let subscription = self.positions.subscribe();
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(tracking_loop(
            subscription,
            self.state.clone(),
            self.store.clone(),
            self.events.clone(),
            cancel_token.clone(),
        ));

        *tracking_guard = Some(TrackingTask {
            cancel_token,
            handle,
        });
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = self.state.clone();
        let events = self.events.clone();
        let tick_interval: Duration = self.config.tick_interval();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so ticks land on whole intervals.
            interval.tick().await;
            loop {
                interval.tick().await;

                let (elapsed_secs, duration) = {
                    let guard = state.lock().await;
                    if !guard.is_recording() {
                        break;
                    }
                    let now = now_ms();
                    (guard.elapsed_secs(now), guard.duration_label(now))
                };

                let _ = events.send(RunEvent::Tick {
                    elapsed_secs,
                    duration,
                });
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn release_recording_resources(&self) {
        let tracking = self.tracking.lock().await.take();
        if let Some(TrackingTask {
            cancel_token,
            handle,
        }) = tracking
        {
            cancel_token.cancel();
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    log::error!("tracking loop task failed to join: {err}");
                }
            }
        }

        let ticker = self.ticker.lock().await.take();
        if let Some(handle) = ticker {
            handle.abort();
        }

        self.heading.stop_listener().await;
    }

    fn emit_status(&self, status: RunStatus) {
        let _ = self.events.send(RunEvent::StatusChanged { status });
    }
}
