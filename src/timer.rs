//! Per-question countdown clock.
//!
//! [`CountdownTimer`] ticks once per second on the local clock, independent
//! of network latency. Only one countdown is logically active at a time:
//! starting a new one cancels the previous instance before anything else
//! happens, and a cancelled instance never invokes its callbacks again.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::debug;

/// Real-time length of one countdown step.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot of a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
    pub total_seconds: u32,
    pub remaining_seconds: u32,
    pub running: bool,
}

impl TimerState {
    /// Fraction of the countdown still left, in `[0, 1]`.
    pub fn percentage(&self) -> f64 {
        tick_percentage(self.remaining_seconds, self.total_seconds)
    }
}

/// `remaining / total`, clamped to `[0, 1]`. A zero-length countdown is empty.
pub fn tick_percentage(remaining: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (f64::from(remaining) / f64::from(total)).clamp(0.0, 1.0)
}

/// State shared between the timer handle and its ticking task.
struct Shared {
    total: u32,
    remaining: AtomicU32,
    running: AtomicBool,
    cancelled: AtomicBool,
}

struct ActiveCountdown {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

/// A cancellable one-second countdown.
///
/// # Example
///
/// ```
/// # #[tokio::main(flavor = "current_thread", start_paused = true)]
/// # async fn main() {
/// use neonmind_controller::timer::CountdownTimer;
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::unbounded_channel();
/// let expired = tx.clone();
/// let mut timer = CountdownTimer::new();
/// timer.start(2, move |left| { let _ = tx.send(Some(left)); }, move || { let _ = expired.send(None); });
///
/// assert_eq!(rx.recv().await, Some(Some(1)));
/// assert_eq!(rx.recv().await, Some(Some(0)));
/// assert_eq!(rx.recv().await, Some(None));
/// # }
/// ```
#[derive(Default)]
pub struct CountdownTimer {
    active: Option<ActiveCountdown>,
}

impl CountdownTimer {
    /// Create an idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting down from `seconds`, cancelling any countdown already
    /// running.
    ///
    /// `on_tick` receives the remaining seconds after each step (`seconds - 1`
    /// down to `0`). `on_expire` fires exactly once, right after the tick that
    /// reaches zero. A zero-second countdown expires immediately without
    /// ticking. Must be called from within a tokio runtime.
    pub fn start<T, E>(&mut self, seconds: u32, mut on_tick: T, on_expire: E)
    where
        T: FnMut(u32) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        self.cancel();

        let shared = Arc::new(Shared {
            total: seconds,
            remaining: AtomicU32::new(seconds),
            running: AtomicBool::new(true),
            cancelled: AtomicBool::new(false),
        });
        let task_shared = Arc::clone(&shared);

        let task = tokio::spawn(async move {
            let mut remaining = seconds;
            let mut interval = interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
            while remaining > 0 {
                interval.tick().await;
                if task_shared.cancelled.load(Ordering::Acquire) {
                    return;
                }
                remaining -= 1;
                task_shared.remaining.store(remaining, Ordering::Release);
                on_tick(remaining);
            }
            if task_shared.cancelled.load(Ordering::Acquire) {
                return;
            }
            task_shared.running.store(false, Ordering::Release);
            on_expire();
        });

        debug!(seconds, "countdown started");
        self.active = Some(ActiveCountdown { shared, task });
    }

    /// Stop the current countdown. Returns `true` if one was still running.
    ///
    /// Safe to call at any time, any number of times.
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        active.shared.cancelled.store(true, Ordering::Release);
        active.task.abort();
        let was_running = active.shared.running.swap(false, Ordering::AcqRel);
        if was_running {
            debug!("countdown cancelled");
        }
        was_running
    }

    /// Returns `true` while a countdown is ticking.
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.shared.running.load(Ordering::Acquire))
    }

    /// Snapshot of the current countdown, if one was started and not cancelled.
    pub fn state(&self) -> Option<TimerState> {
        self.active.as_ref().map(|a| TimerState {
            total_seconds: a.shared.total,
            remaining_seconds: a.shared.remaining.load(Ordering::Acquire),
            running: a.shared.running.load(Ordering::Acquire),
        })
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownTimer")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Signal {
        Tick(u32),
        Expired,
    }

    fn start_recording(
        timer: &mut CountdownTimer,
        seconds: u32,
    ) -> mpsc::UnboundedReceiver<Signal> {
        let (tx, rx) = mpsc::unbounded_channel();
        let expire_tx = tx.clone();
        timer.start(
            seconds,
            move |remaining| {
                let _ = tx.send(Signal::Tick(remaining));
            },
            move || {
                let _ = expire_tx.send(Signal::Expired);
            },
        );
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Signal>) -> Vec<Signal> {
        let mut out = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            out.push(signal);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn runs_exactly_d_ticks_then_one_expiry() {
        for seconds in [1, 3, 7] {
            let mut timer = CountdownTimer::new();
            let mut rx = start_recording(&mut timer, seconds);

            tokio::time::sleep(Duration::from_secs(u64::from(seconds) + 5)).await;

            let mut expected: Vec<Signal> = (0..seconds).rev().map(Signal::Tick).collect();
            expected.push(Signal::Expired);
            assert_eq!(drain(&mut rx), expected, "countdown of {seconds}s");
            assert!(!timer.is_running());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_second() {
        let mut timer = CountdownTimer::new();
        let mut rx = start_recording(&mut timer, 5);

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(drain(&mut rx).is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(drain(&mut rx), vec![Signal::Tick(4)]);
        assert_eq!(timer.state().unwrap().remaining_seconds, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_all_further_callbacks() {
        let mut timer = CountdownTimer::new();
        let mut rx = start_recording(&mut timer, 5);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(timer.cancel());
        assert_eq!(drain(&mut rx), vec![Signal::Tick(4), Signal::Tick(3)]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(!timer.is_running());
        assert!(timer.state().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let mut timer = CountdownTimer::new();
        assert!(!timer.cancel(), "never started");

        let mut rx = start_recording(&mut timer, 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(drain(&mut rx), vec![Signal::Tick(0), Signal::Expired]);

        assert!(!timer.cancel(), "already expired");
        assert!(!timer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_cancels_previous_countdown() {
        let mut timer = CountdownTimer::new();
        let mut old = start_recording(&mut timer, 5);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(drain(&mut old), vec![Signal::Tick(4)]);

        let mut new = start_recording(&mut timer, 2);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(drain(&mut old).is_empty(), "stale countdown kept ticking");
        assert_eq!(
            drain(&mut new),
            vec![Signal::Tick(1), Signal::Tick(0), Signal::Expired]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_seconds_expires_without_ticking() {
        let mut timer = CountdownTimer::new();
        let mut rx = start_recording(&mut timer, 0);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(drain(&mut rx), vec![Signal::Expired]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_timer_cancels_it() {
        let mut timer = CountdownTimer::new();
        let mut rx = start_recording(&mut timer, 3);
        drop(timer);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn percentage_is_clamped() {
        assert_eq!(tick_percentage(10, 10), 1.0);
        assert_eq!(tick_percentage(5, 10), 0.5);
        assert_eq!(tick_percentage(0, 10), 0.0);
        assert_eq!(tick_percentage(12, 10), 1.0);
        assert_eq!(tick_percentage(0, 0), 0.0);

        let state = TimerState {
            total_seconds: 4,
            remaining_seconds: 1,
            running: true,
        };
        assert_eq!(state.percentage(), 0.25);
    }
}
