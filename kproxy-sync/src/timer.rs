use std::future::pending;
use std::time::Duration;

use tokio::time::{self, Instant};

/// A single resettable deadline. Reads the tokio clock, so paused-clock
/// tests drive it deterministically together with the rate limiter.
#[derive(Debug, Default)]
pub struct DeadlineTimer {
    deadline: Option<Instant>,
}

impl DeadlineTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any pending fire and schedules one at `now + interval`.
    pub fn reset(&mut self, interval: Duration) {
        self.deadline = Some(Instant::now() + interval);
    }

    /// Cancels any pending fire.
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time until the next fire. Zero when overdue, unbounded when stopped.
    pub fn remaining(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    pub fn now(&self) -> Instant {
        Instant::now()
    }

    pub fn since(&self, earlier: Instant) -> Duration {
        Instant::now().saturating_duration_since(earlier)
    }
}

/// Resolves when the deadline is reached; never resolves for a stopped
/// timer. The caller re-arms between waits, so each reset fires at most
/// once.
pub(crate) async fn fire_at(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => pending().await,
    }
}
