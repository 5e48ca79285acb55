//! Crash-recovery store.
//!
//! Keeps the in-progress run (track points, distance, start time) in a small
//! SQLite key/value table so a reload or crash can resume it. Photos are never
//! written here. A dedicated thread owns the connection and runs commands in
//! submission order, so the most recent `persist` always wins.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;

mod migrations;

use migrations::run_migrations;

use crate::error::TrackerError;
use crate::models::TrackPoint;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const TRACK_KEY: &str = "run_track";
pub const DISTANCE_KEY: &str = "run_dist";
pub const START_KEY: &str = "run_start";

/// What survives a crash: everything about the run except photos.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoverySnapshot {
    pub track_points: Vec<TrackPoint>,
    pub total_distance_m: f64,
    pub started_at_ms: i64,
}

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<StoreCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to recovery store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join recovery store thread: {join_err:?}");
            }
        }
    }
}

/// Outcome of a write that was queued without waiting for it.
///
/// Dropping it is fine; the write still happens.
pub struct PendingWrite {
    reply: oneshot::Receiver<Result<()>>,
}

impl PendingWrite {
    pub async fn outcome(self) -> Result<(), TrackerError> {
        match self.reply.await {
            Ok(result) => result.map_err(TrackerError::from),
            Err(_) => Err(TrackerError::Storage(
                "recovery store thread terminated unexpectedly".into(),
            )),
        }
    }
}

#[derive(Clone)]
pub struct RecoveryStore {
    inner: Arc<StoreInner>,
    location: Arc<Option<PathBuf>>,
}

impl RecoveryStore {
    /// Opens (creating if needed) a file-backed store.
    pub fn open(path: PathBuf, max_pages: Option<u32>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create recovery directory {}", parent.display())
                })?;
            }
        }
        Self::spawn(Some(path), max_pages)
    }

    /// Volatile store, used by tests and when no data directory is available.
    pub fn open_in_memory(max_pages: Option<u32>) -> Result<Self> {
        Self::spawn(None, max_pages)
    }

    fn spawn(location: Option<PathBuf>, max_pages: Option<u32>) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = location.clone();

        let worker = thread::Builder::new()
            .name("runlog-recovery".into())
            .spawn(move || {
                let opened = match &path_for_thread {
                    Some(path) => Connection::open(path),
                    None => Connection::open_in_memory(),
                };
                let mut conn = match opened {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open recovery database")));
                        return;
                    }
                };

                if path_for_thread.is_some() {
                    if let Err(err) = conn.pragma_update_and_check(
                        None,
                        "journal_mode",
                        "WAL",
                        |row| row.get::<_, String>(0),
                    ) {
                        error!("Failed to enable WAL mode: {err}");
                    }
                }

                let init_result = run_migrations(&mut conn)
                    .context("failed to run recovery store migrations")
                    .and_then(|_| apply_page_limit(&conn, max_pages));
                if ready_tx.send(init_result).is_err() {
                    error!("Recovery store initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => task(&mut conn),
                        StoreCommand::Shutdown => break,
                    }
                }

                info!("Recovery store thread shutting down");
            })
            .with_context(|| "failed to spawn recovery store worker thread")?;

        ready_rx
            .recv()
            .context("recovery store worker exited before signaling readiness")??;

        match &location {
            Some(path) => info!("Recovery store opened at {}", path.display()),
            None => info!("Recovery store opened in memory"),
        }

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            location: Arc::new(location),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Queues `task` on the store thread and returns the receiving end of its result.
    fn submit<F, T>(&self, task: F) -> oneshot::Receiver<Result<T>>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StoreCommand::Execute(Box::new(move |conn| {
            let _ = reply_tx.send(task(conn));
        }));

        if let Err(err) = self.inner.sender.send(command) {
            error!("failed to send command to recovery store thread: {err}");
        }
        reply_rx
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(task)
            .await
            .map_err(|_| anyhow!("recovery store thread terminated unexpectedly"))?
    }

    /// Writes `snapshot` without waiting. Queue order is preserved, so a later
    /// call always supersedes an earlier one.
    pub fn persist(&self, snapshot: &RecoverySnapshot) -> PendingWrite {
        let track_blob = match serde_json::to_string(&snapshot.track_points) {
            Ok(blob) => blob,
            Err(err) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let _ = reply_tx.send(Err(anyhow!("failed to encode track points: {err}")));
                return PendingWrite { reply: reply_rx };
            }
        };
        let distance = snapshot.total_distance_m.to_string();
        let started_at = snapshot.started_at_ms.to_string();
        let point_count = snapshot.track_points.len();

        let reply = self.submit(move |conn| {
            let updated_at = Utc::now().to_rfc3339();
            let tx = conn
                .transaction()
                .context("failed to open recovery write transaction")?;
            for (key, value) in [
                (TRACK_KEY, track_blob.as_str()),
                (DISTANCE_KEY, distance.as_str()),
                (START_KEY, started_at.as_str()),
            ] {
                tx.execute(
                    "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                    updated_at = excluded.updated_at",
                    params![key, value, updated_at],
                )
                .with_context(|| format!("failed to write {key}"))?;
            }
            tx.commit().context("failed to commit recovery snapshot")?;
            log_debug!("recovery snapshot written ({point_count} points)");
            Ok(())
        });

        PendingWrite { reply }
    }

    /// Last persisted snapshot, or `None` when no recoverable run exists.
    ///
    /// A run is recoverable when both the track blob and the start time are
    /// present. A missing or unreadable distance reads as 0.
    pub async fn load(&self) -> Result<Option<RecoverySnapshot>, TrackerError> {
        let rows = self
            .execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, value FROM kv_store WHERE key IN (?1, ?2, ?3)",
                )?;
                let rows = stmt
                    .query_map(params![TRACK_KEY, DISTANCE_KEY, START_KEY], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let value_of = |wanted: &str| {
            rows.iter()
                .find(|(key, _)| key == wanted)
                .map(|(_, value)| value.as_str())
        };

        let (Some(track_blob), Some(started_raw)) = (value_of(TRACK_KEY), value_of(START_KEY))
        else {
            return Ok(None);
        };

        let track_points: Vec<TrackPoint> = serde_json::from_str(track_blob)
            .map_err(|err| TrackerError::Storage(format!("corrupt track blob: {err}")))?;
        let started_at_ms = parse_epoch_ms(started_raw).ok_or_else(|| {
            TrackerError::Storage(format!("corrupt start time '{started_raw}'"))
        })?;
        let total_distance_m = match value_of(DISTANCE_KEY).map(|raw| raw.trim().parse::<f64>()) {
            Some(Ok(value)) if value.is_finite() => value,
            other => {
                log_warn!("recovery distance missing or invalid ({other:?}); using 0");
                0.0
            }
        };

        Ok(Some(RecoverySnapshot {
            track_points,
            total_distance_m,
            started_at_ms,
        }))
    }

    /// Removes every recovery key in one transaction.
    pub async fn clear(&self) -> Result<(), TrackerError> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM kv_store WHERE key IN (?1, ?2, ?3)",
                params![TRACK_KEY, DISTANCE_KEY, START_KEY],
            )
            .context("failed to clear recovery keys")?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(TrackerError::from)
    }
}

fn apply_page_limit(conn: &Connection, max_pages: Option<u32>) -> Result<()> {
    let Some(max_pages) = max_pages else {
        return Ok(());
    };
    let applied: i64 = conn
        .pragma_update_and_check(None, "max_page_count", max_pages, |row| row.get(0))
        .context("failed to apply max_page_count")?;
    info!("Recovery store capped at {applied} pages");
    Ok(())
}

fn parse_epoch_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
    })
}
