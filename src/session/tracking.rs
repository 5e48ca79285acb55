use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    error::TrackerError,
    models::RawFix,
    recovery::{RecoverySnapshot, RecoveryStore},
    sensing::{PositionEvent, Subscription},
};

use super::{RunEvent, SessionState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_debug, log_info, log_warn};

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Consumes position events until cancelled or the source closes.
///
/// Faults are reported and skipped; the loop keeps waiting for the next fix.
pub(crate) async fn tracking_loop(
    mut positions: Subscription<PositionEvent>,
    state: Arc<Mutex<SessionState>>,
    store: RecoveryStore,
    events: broadcast::Sender<RunEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("tracking loop shutting down");
                break;
            }
            event = positions.recv() => match event {
                Some(PositionEvent::Fix(fix)) => handle_fix(fix, &state, &store, &events).await,
                Some(PositionEvent::Fault(fault)) => {
                    log_warn!("GPS error: {fault}");
                    let _ = events.send(RunEvent::GpsLost { fault });
                }
                None => {
                    log_info!("position source closed");
                    break;
                }
            }
        }
    }
}

async fn handle_fix(
    fix: RawFix,
    state: &Arc<Mutex<SessionState>>,
    store: &RecoveryStore,
    events: &broadcast::Sender<RunEvent>,
) {
    let outcome = {
        let mut guard = state.lock().await;
        if !guard.is_recording() {
            log_debug!("dropping fix received while not recording");
            return;
        }
        guard
            .ingest(fix, now_ms())
            .map(|point| (point, guard.total_distance_m(), guard.recovery_snapshot()))
    };

    match outcome {
        Ok((point, total_distance_m, snapshot)) => {
            persist_snapshot(store, events, snapshot);
            let _ = events.send(RunEvent::PositionAccepted {
                point,
                total_distance_m,
            });
        }
        Err(err) => {
            log_warn!("rejected fix: {err}");
            let _ = events.send(RunEvent::FixRejected {
                reason: err.to_string(),
            });
        }
    }
}

/// Queues a recovery write and reports its outcome in the background.
///
/// Never blocks the caller and never fails it; storage problems surface as a
/// warning and a [`RunEvent::PersistFailed`].
pub(crate) fn persist_snapshot(
    store: &RecoveryStore,
    events: &broadcast::Sender<RunEvent>,
    snapshot: Option<RecoverySnapshot>,
) {
    let Some(snapshot) = snapshot else {
        return;
    };
    let pending = store.persist(&snapshot);
    let events = events.clone();
    tokio::spawn(async move {
        if let Err(err) = pending.outcome().await {
            report_persist_failure(&events, &err);
        }
    });
}

pub(crate) fn report_persist_failure(events: &broadcast::Sender<RunEvent>, err: &TrackerError) {
    if err.is_capacity() {
        log_warn!("Storage full! Track path getting too long: {err}");
    } else {
        log_warn!("failed to persist run: {err}");
    }
    let _ = events.send(RunEvent::PersistFailed {
        reason: err.to_string(),
    });
}
