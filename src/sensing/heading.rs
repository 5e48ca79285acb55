use std::{
    fmt,
    str::FromStr,
    sync::{Arc, RwLock},
    time::Duration,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::source::{OrientationEvent, SensorSource};

/// How compass readings are obtained when a photo needs a heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeadingMode {
    /// Sample the sensor only when asked, waiting at most the configured timeout.
    OnDemand,
    /// Keep a background listener running while recording and cache the latest value.
    Continuous,
}

impl Default for HeadingMode {
    fn default() -> Self {
        HeadingMode::OnDemand
    }
}

impl fmt::Display for HeadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadingMode::OnDemand => f.write_str("on-demand"),
            HeadingMode::Continuous => f.write_str("continuous"),
        }
    }
}

impl FromStr for HeadingMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "on-demand" | "ondemand" | "demand" => Ok(HeadingMode::OnDemand),
            "continuous" => Ok(HeadingMode::Continuous),
            other => Err(format!("unknown heading mode '{other}'")),
        }
    }
}

struct Listener {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct HeadingProvider {
    mode: RwLock<HeadingMode>,
    source: Arc<dyn SensorSource<OrientationEvent>>,
    timeout: Duration,
    latest: Arc<watch::Sender<Option<f64>>>,
    listener: Mutex<Option<Listener>>,
}

impl HeadingProvider {
    pub fn new(
        mode: HeadingMode,
        source: Arc<dyn SensorSource<OrientationEvent>>,
        timeout: Duration,
    ) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            mode: RwLock::new(mode),
            source,
            timeout,
            latest: Arc::new(latest),
            listener: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> HeadingMode {
        match self.mode.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Last heading cached by the continuous listener, if any arrived.
    pub fn latest(&self) -> Option<f64> {
        *self.latest.borrow()
    }

    /// Forgets the cached reading so the next run starts from 0.
    pub fn clear(&self) {
        self.latest.send_replace(None);
    }

    pub async fn is_listening(&self) -> bool {
        self.listener.lock().await.is_some()
    }

    /// Switches mode. Entering continuous mode while `recording` starts the
    /// listener right away; on-demand mode never keeps one running.
    pub async fn set_mode(&self, mode: HeadingMode, recording: bool) {
        {
            let mut guard = match self.mode.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = mode;
        }
        info!("compass mode set to {mode}");

        match mode {
            HeadingMode::Continuous if recording => self.start_listener().await,
            HeadingMode::Continuous => {}
            HeadingMode::OnDemand => self.stop_listener().await,
        }
    }

    /// Starts the background listener. No-op when one is already running.
    pub async fn start_listener(&self) {
        let mut guard = self.listener.lock().await;
        if guard.is_some() {
            return;
        }

        let mut subscription = self.source.subscribe();
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let latest = Arc::clone(&self.latest);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = subscription.recv() => match event {
                        Some(event) => {
                            latest.send_replace(Some(event.heading()));
                        }
                        None => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
            debug!("compass listener stopped");
        });

        *guard = Some(Listener {
            cancel_token,
            handle,
        });
        debug!("compass listener started");
    }

    pub async fn stop_listener(&self) {
        let listener = self.listener.lock().await.take();
        if let Some(Listener {
            cancel_token,
            handle,
        }) = listener
        {
            cancel_token.cancel();
            if let Err(err) = handle.await {
                log::error!("compass listener task failed to join: {err}");
            }
        }
    }

    /// Heading to stamp on a photo taken now.
    ///
    /// Continuous mode answers from the cache (0 before any reading).
    /// On-demand mode subscribes, takes the first reading and gives up with 0
    /// after the timeout. The subscription is released on both paths.
    pub async fn heading_now(&self) -> f64 {
        match self.mode() {
            HeadingMode::Continuous => self.latest().unwrap_or(0.0),
            HeadingMode::OnDemand => self.read_once().await,
        }
    }

    async fn read_once(&self) -> f64 {
        let mut subscription = self.source.subscribe();
        let outcome = tokio::time::timeout(self.timeout, subscription.recv()).await;
        drop(subscription);

        match outcome {
            Ok(Some(event)) => event.heading(),
            Ok(None) => 0.0,
            Err(_) => {
                debug!(
                    "no orientation reading within {}ms, using 0",
                    self.timeout.as_millis()
                );
                0.0
            }
        }
    }
}
