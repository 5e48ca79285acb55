use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::RawFix;

/// Something that can be subscribed to for a stream of sensor events.
///
/// The returned [`Subscription`] is the cancellation handle: dropping it
/// unregisters the listener.
pub trait SensorSource<T>: Send + Sync {
    fn subscribe(&self) -> Subscription<T>;
}

/// Live registration with a [`SensorSource`].
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<T>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            release: Some(Box::new(release)),
        }
    }

    /// Next event, or `None` once the source has gone away.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

struct FeedInner<T> {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, mpsc::UnboundedSender<T>)>>,
}

/// In-process fan-out source. Platform glue publishes into it; the core
/// subscribes to it.
pub struct SensorFeed<T> {
    inner: Arc<FeedInner<T>>,
}

impl<T> Clone for SensorFeed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SensorFeed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SensorFeed<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FeedInner {
                next_id: AtomicU64::new(0),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock_subscribers(&self.inner).len()
    }
}

impl<T: Clone> SensorFeed<T> {
    /// Delivers `event` to every live subscriber and returns how many got it.
    pub fn publish(&self, event: T) -> usize {
        let mut subscribers = lock_subscribers(&self.inner);
        subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        subscribers.len()
    }
}

impl<T: Send + 'static> SensorSource<T> for SensorFeed<T> {
    fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        lock_subscribers(&self.inner).push((id, tx));

        let weak: Weak<FeedInner<T>> = Arc::downgrade(&self.inner);
        Subscription::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                lock_subscribers(&inner).retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }
}

fn lock_subscribers<T>(
    inner: &FeedInner<T>,
) -> std::sync::MutexGuard<'_, Vec<(u64, mpsc::UnboundedSender<T>)>> {
    match inner.subscribers.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Why the location source could not produce a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SensorFault {
    PermissionDenied,
    Unavailable,
    Timeout,
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SensorFault::PermissionDenied => "location permission denied",
            SensorFault::Unavailable => "position unavailable",
            SensorFault::Timeout => "position request timed out",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionEvent {
    Fix(RawFix),
    Fault(SensorFault),
}

/// Device orientation reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrientationEvent {
    /// Absolute compass heading, when the platform reports one directly.
    pub compass_heading: Option<f64>,
    /// Rotation about the z axis, counter-clockwise from north.
    pub alpha: Option<f64>,
}

impl OrientationEvent {
    pub fn from_compass(heading: f64) -> Self {
        Self {
            compass_heading: Some(heading),
            alpha: None,
        }
    }

    pub fn from_alpha(alpha: f64) -> Self {
        Self {
            compass_heading: None,
            alpha: Some(alpha),
        }
    }

    /// Heading in degrees. Compass heading wins, then `360 - alpha`, else 0.
    /// A zero reading counts as absent.
    pub fn heading(&self) -> f64 {
        let present = |v: Option<f64>| v.filter(|x| x.is_finite() && *x != 0.0);
        if let Some(compass) = present(self.compass_heading) {
            compass
        } else if let Some(alpha) = present(self.alpha) {
            360.0 - alpha
        } else {
            0.0
        }
    }
}
