//! Monotonic clock and cancellable-delay primitives (spec §2.1).
//!
//! Every Window Protocol deadline and watchdog goes through here so tests
//! can exercise timeout paths without wall-clock sleeps dominating the
//! suite's run time is not a goal we chase (deadlines are real milliseconds
//! per spec), but everything is expressed in terms of `Instant`/`Duration`
//! rather than `SystemTime` so it composes with `tokio::time`.

use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep_until as tokio_sleep_until;

/// Thin wrapper so callers depend on a trait object instead of `tokio::time`
/// directly, the way the teacher crate wraps REST calls behind connector
/// structs instead of calling `reqwest` inline everywhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct Clock;

impl Clock {
    pub fn now(&self) -> Instant {
        Instant::now()
    }

    pub fn deadline(&self, from: Instant, within: Duration) -> Instant {
        from + within
    }

    /// Sleep until an absolute instant, racing a cancellation signal.
    /// Returns `true` if the deadline elapsed, `false` if cancelled first.
    pub async fn sleep_until_or_cancelled(
        &self,
        until: Instant,
        cancel: &mut watch::Receiver<bool>,
    ) -> bool {
        tokio::select! {
            _ = tokio_sleep_until(until.into()) => true,
            _ = cancel.changed() => false,
        }
    }

    pub async fn sleep(&self, dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}

/// A deadline that can be checked without consuming it, used by the tight
/// polling loops in the AH Snipe protocol (slot-31 polling, bed-spam).
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(dur: Duration) -> Self {
        Self { at: Instant::now() + dur }
    }

    pub fn from_instant(at: Instant) -> Self {
        Self { at }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn instant(&self) -> Instant {
        self.at
    }
}
