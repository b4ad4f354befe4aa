use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::limiter::{NullLimiter, RateLimiter, TokenBucket};
use crate::timer::{self, DeadlineTimer};

/// Floor for throttled timer resets, so a loop whose min and max intervals
/// coincide cannot spin without the clock advancing.
const TIMER_TICK: Duration = Duration::from_millis(1);

/// Signal side of a [`BoundedFrequencyRunner`]. Cheap to clone, callable
/// from any task, never blocks.
#[derive(Clone)]
pub struct RunnerHandle {
    run_tx: mpsc::Sender<()>,
    retry_tx: mpsc::Sender<()>,
    retry_time: Arc<Mutex<Option<Instant>>>,
}

impl RunnerHandle {
    /// Requests a run as soon as possible. If a request is already queued it
    /// is dropped; the queued one covers us.
    pub fn run(&self) {
        let _ = self.run_tx.try_send(());
    }

    /// Ensures a run happens no later than `interval` from now. Callable
    /// from inside the sync function itself. Only ever pulls the next run
    /// sooner; the earliest requested deadline wins.
    pub fn retry_after(&self, interval: Duration) {
        let retry_at = Instant::now() + interval;
        let mut retry_time = self.retry_time.lock().unwrap();
        if let Some(current) = *retry_time
            && current <= retry_at
        {
            return;
        }
        *retry_time = Some(retry_at);
        let _ = self.retry_tx.try_send(());
    }
}

enum Wake {
    Timer,
    Run,
    Retry,
}

/// Manages runs of a user-provided function: requests are coalesced and
/// admitted with at least `min_interval` between completion and next start
/// (modulo `burst_runs` back-to-back admissions), and the loop self-triggers
/// every `max_interval` so state never goes stale even without requests.
pub struct BoundedFrequencyRunner<F> {
    name: String,
    min_interval: Duration,
    max_interval: Duration,
    sync_fn: F,
    last_run: Option<Instant>,
    timer: DeadlineTimer,
    limiter: Box<dyn RateLimiter>,
    run_rx: mpsc::Receiver<()>,
    retry_rx: mpsc::Receiver<()>,
    retry_time: Arc<Mutex<Option<Instant>>>,
}

impl<F> BoundedFrequencyRunner<F>
where
    F: FnMut(),
{
    /// Builds a runner and its signal handle. `sync_fn` may be long-running;
    /// invocations are serialized on the loop task. Fails when
    /// `max_interval < min_interval`.
    pub fn new(
        name: impl Into<String>,
        sync_fn: F,
        min_interval: Duration,
        max_interval: Duration,
        burst_runs: u32,
    ) -> Result<(Self, RunnerHandle)> {
        let name = name.into();
        if max_interval < min_interval {
            return Err(Error::Config {
                name,
                min: min_interval,
                max: max_interval,
            });
        }

        let (run_tx, run_rx) = mpsc::channel(1);
        let (retry_tx, retry_rx) = mpsc::channel(1);
        let retry_time = Arc::new(Mutex::new(None));

        let limiter: Box<dyn RateLimiter> = if min_interval.is_zero() {
            Box::new(NullLimiter)
        } else {
            let qps = 1.0 / min_interval.as_secs_f64();
            Box::new(TokenBucket::new(qps, burst_runs))
        };

        let handle = RunnerHandle {
            run_tx,
            retry_tx,
            retry_time: retry_time.clone(),
        };
        let runner = Self {
            name,
            min_interval,
            max_interval,
            sync_fn,
            last_run: None,
            timer: DeadlineTimer::new(),
            limiter,
            run_rx,
            retry_rx,
            retry_time,
        };
        Ok((runner, handle))
    }

    /// The event loop. Runs until `cancel` fires; expected to be spawned as
    /// its own task.
    pub async fn start(mut self, cancel: CancellationToken) {
        debug!("{}: loop running", self.name);
        self.timer.reset(self.max_interval);
        loop {
            let wake = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer::fire_at(self.timer.deadline()) => Wake::Timer,
                Some(_) = self.run_rx.recv() => Wake::Run,
                Some(_) = self.retry_rx.recv() => Wake::Retry,
            };
            match wake {
                Wake::Timer | Wake::Run => self.try_run(),
                Wake::Retry => self.do_retry(),
            }
        }
        self.limiter.stop();
        self.timer.stop();
        debug!("{}: loop stopping", self.name);
    }

    fn try_run(&mut self) {
        if self.limiter.try_accept() {
            (self.sync_fn)();
            self.last_run = Some(self.timer.now());
            self.timer.stop();
            self.timer.reset(self.max_interval);
            debug!(
                "{}: ran, next possible in {:?}, periodic in {:?}",
                self.name, self.min_interval, self.max_interval
            );
            return;
        }

        // throttled, figure out when the next run can happen
        let next_possible = match self.last_run {
            Some(last) => self.min_interval.saturating_sub(self.timer.since(last)),
            None => Duration::ZERO,
        };
        let next_scheduled = self.timer.remaining();
        debug!(
            "{}: throttled, possible in {:?}, scheduled in {:?}",
            self.name, next_possible, next_scheduled
        );
        // the timer is reset even when the deadline is unchanged, keeping
        // its channel state consistent for the next iteration
        let next = next_possible.min(next_scheduled).max(TIMER_TICK);
        self.timer.stop();
        self.timer.reset(next);
    }

    fn do_retry(&mut self) {
        let Some(retry_at) = self.retry_time.lock().unwrap().take() else {
            // spurious wakeup
            return;
        };
        let retry_interval = retry_at.saturating_duration_since(self.timer.now());
        if retry_interval < self.timer.remaining() {
            debug!("{}: retrying in {:?}", self.name, retry_interval);
            self.timer.stop();
            self.timer.reset(retry_interval);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::OnceLock;

    use tokio::time;

    use super::*;

    fn spawn_runner(
        min_interval: Duration,
        max_interval: Duration,
        burst_runs: u32,
    ) -> (
        RunnerHandle,
        mpsc::UnboundedReceiver<Instant>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (runner, handle) = BoundedFrequencyRunner::new(
            "test",
            move || {
                let _ = tx.send(Instant::now());
            },
            min_interval,
            max_interval,
            burst_runs,
        )
        .unwrap();
        let cancel = CancellationToken::new();
        let join = tokio::spawn(runner.start(cancel.clone()));
        (handle, rx, cancel, join)
    }

    #[test]
    fn test_rejects_max_below_min() {
        let result = BoundedFrequencyRunner::new(
            "bad",
            || {},
            Duration::from_secs(10),
            Duration::from_secs(1),
            1,
        );
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_exhaustion() {
        let (handle, mut rx, _cancel, _join) =
            spawn_runner(Duration::from_secs(1), Duration::from_secs(10), 2);
        let t0 = Instant::now();

        handle.run();
        let first = rx.recv().await.unwrap();
        handle.run();
        let second = rx.recv().await.unwrap();
        handle.run();
        let third = rx.recv().await.unwrap();

        assert_eq!(first.duration_since(t0), Duration::ZERO);
        assert_eq!(second.duration_since(t0), Duration::ZERO);
        assert_eq!(third.duration_since(t0), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_spacing_without_burst() {
        let (handle, mut rx, _cancel, _join) =
            spawn_runner(Duration::from_secs(1), Duration::from_secs(100), 1);
        let t0 = Instant::now();

        let mut starts = Vec::new();
        for _ in 0..3 {
            handle.run();
            starts.push(rx.recv().await.unwrap());
        }

        assert_eq!(starts[0].duration_since(t0), Duration::ZERO);
        assert_eq!(starts[1].duration_since(t0), Duration::from_secs(1));
        assert_eq!(starts[2].duration_since(t0), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_self_trigger() {
        let (_handle, mut rx, _cancel, _join) =
            spawn_runner(Duration::from_secs(1), Duration::from_secs(5), 2);
        let t0 = Instant::now();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();

        assert_eq!(first.duration_since(t0), Duration::from_secs(5));
        assert_eq!(second.duration_since(t0), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_pulls_next_run_forward() {
        let cell: Arc<OnceLock<RunnerHandle>> = Arc::new(OnceLock::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let fn_cell = cell.clone();
        let (runner, handle) = BoundedFrequencyRunner::new(
            "test",
            move || {
                let _ = tx.send(Instant::now());
                if let Some(handle) = fn_cell.get() {
                    handle.retry_after(Duration::from_secs(2));
                }
            },
            Duration::from_secs(1),
            Duration::from_secs(100),
            1,
        )
        .unwrap();
        cell.set(handle.clone()).ok();
        let _join = tokio::spawn(runner.start(CancellationToken::new()));

        let t0 = Instant::now();
        handle.run();
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();

        assert_eq!(first.duration_since(t0), Duration::ZERO);
        assert_eq!(second.duration_since(t0), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cannot_delay_scheduled_run() {
        let (handle, mut rx, _cancel, _join) =
            spawn_runner(Duration::from_secs(1), Duration::from_secs(100), 1);
        let t0 = Instant::now();

        handle.run();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.duration_since(t0), Duration::ZERO);

        // a second request is throttled onto the min-interval deadline
        handle.run();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        // a late retry must not push that deadline out
        handle.retry_after(Duration::from_secs(10));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.duration_since(t0), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_signals_coalesce() {
        let (handle, mut rx, _cancel, _join) =
            spawn_runner(Duration::from_secs(1), Duration::from_secs(100), 2);
        let t0 = Instant::now();

        for _ in 0..5 {
            handle.run();
        }
        let first = rx.recv().await.unwrap();
        assert_eq!(first.duration_since(t0), Duration::ZERO);

        time::sleep(Duration::from_secs(10)).await;
        // the five requests collapsed into a single run
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_min_interval_never_throttles() {
        let (handle, mut rx, _cancel, _join) =
            spawn_runner(Duration::ZERO, Duration::from_secs(100), 1);
        let t0 = Instant::now();

        for _ in 0..3 {
            handle.run();
            let ran = rx.recv().await.unwrap();
            assert_eq!(ran.duration_since(t0), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_signals_never_block() {
        let (handle, _rx, _cancel, _join) =
            spawn_runner(Duration::from_secs(1), Duration::from_secs(100), 1);
        for _ in 0..1000 {
            handle.run();
            handle.retry_after(Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_the_loop() {
        let (handle, mut rx, cancel, join) =
            spawn_runner(Duration::from_secs(1), Duration::from_secs(5), 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.elapsed(), Duration::ZERO);

        cancel.cancel();
        join.await.unwrap();
        handle.run(); // harmless after shutdown
        assert!(rx.try_recv().is_err());
    }
}
