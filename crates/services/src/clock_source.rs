//! Server-corrected wall clock shared by every timed component of a session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use exam_core::Clock;
use storage::repository::{StorageError, TimeSource};
use tracing::{debug, warn};

struct ClockState {
    base: Clock,
    offset: Option<Duration>,
}

/// Local clock plus the last measured offset to the server clock.
///
/// Clones share state, so a resync performed by the driver is visible to the
/// session and its guards immediately.
#[derive(Clone)]
pub struct ClockSource {
    state: Arc<Mutex<ClockState>>,
    server: Arc<dyn TimeSource>,
}

impl ClockSource {
    #[must_use]
    pub fn new(base: Clock, server: Arc<dyn TimeSource>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState { base, offset: None })),
            server,
        }
    }

    fn state(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Local time without the server correction.
    #[must_use]
    pub fn local_now(&self) -> DateTime<Utc> {
        self.state().base.now()
    }

    /// Server-corrected time. Falls back to local time until the first
    /// successful resync.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        let state = self.state();
        state.base.now() + state.offset.unwrap_or_else(Duration::zero)
    }

    #[must_use]
    pub fn offset(&self) -> Option<Duration> {
        self.state().offset
    }

    /// Advance a fixed base clock. No effect on the system clock.
    pub fn advance(&self, delta: Duration) {
        self.state().base.advance(delta);
    }

    /// Measure the offset to the server clock, compensating half the round trip.
    ///
    /// On failure the previous offset is kept.
    ///
    /// # Errors
    ///
    /// Returns the `StorageError` of the failed time request.
    pub async fn resync(&self) -> Result<Duration, StorageError> {
        let sent = self.local_now();
        let reply = self.server.server_time().await;
        let received = self.local_now();
        match reply {
            Ok(server) => {
                let latency = received - sent;
                let offset = server + latency / 2 - received;
                self.state().offset = Some(offset);
                debug!(offset_ms = offset.num_milliseconds(), latency_ms = latency.num_milliseconds(), "clock resynced");
                Ok(offset)
            }
            Err(err) => {
                warn!(error = %err, kept_offset_ms = ?self.offset().map(|o| o.num_milliseconds()), "clock resync failed");
                Err(err)
            }
        }
    }
}
