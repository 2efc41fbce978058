//! Jammer overlay.
//!
//! The overlay sits on top of whatever screen is showing and never touches
//! screen state, stats or the countdown. Re-triggering restarts the duration;
//! the last trigger wins.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Current overlay state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectState {
    pub active: bool,
    /// When the active overlay switches itself off.
    pub expires_at: Option<Instant>,
}

/// Self-reverting visual-disruption overlay.
#[derive(Debug)]
pub struct EffectsLayer {
    default_duration: Duration,
    state: EffectState,
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

impl EffectsLayer {
    /// Create an inactive layer. `default_duration` applies to triggers that
    /// carry no duration of their own.
    pub fn new(default_duration: Duration) -> Self {
        Self {
            default_duration,
            state: EffectState::default(),
            generation: 0,
            pending: None,
        }
    }

    /// Activate the overlay for `duration` (or the default), replacing any
    /// overlay already running.
    ///
    /// After the duration, `on_elapsed` is called with the generation of this
    /// trigger; pass it back to [`expire`](Self::expire) to switch the overlay
    /// off. Returns that generation. Must be called from within a tokio runtime.
    pub fn trigger<F>(&mut self, duration: Option<Duration>, on_elapsed: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
        let duration = duration.unwrap_or(self.default_duration);
        self.generation += 1;
        let generation = self.generation;
        self.state = EffectState {
            active: true,
            expires_at: Some(Instant::now() + duration),
        };
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            on_elapsed(generation);
        }));
        debug!(generation, ?duration, "jammer overlay active");
        generation
    }

    /// Switch the overlay off if `generation` is still the latest trigger.
    ///
    /// Returns `true` if this call deactivated the overlay.
    pub fn expire(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.state.active {
            debug!(generation, current = self.generation, "stale overlay expiry ignored");
            return false;
        }
        self.pending = None;
        self.state = EffectState::default();
        debug!(generation, "jammer overlay cleared");
        true
    }

    /// Switch the overlay off immediately. Returns `true` if it was active.
    pub fn clear(&mut self) -> bool {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
        let was_active = self.state.active;
        self.state = EffectState::default();
        was_active
    }

    pub fn state(&self) -> EffectState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }
}

impl Drop for EffectsLayer {
    fn drop(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
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

    fn trigger(
        layer: &mut EffectsLayer,
        duration: Option<Duration>,
        tx: &mpsc::UnboundedSender<u64>,
    ) -> u64 {
        let tx = tx.clone();
        layer.trigger(duration, move |generation| {
            let _ = tx.send(generation);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn deactivates_after_requested_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut layer = EffectsLayer::new(Duration::from_secs(3));

        let generation = trigger(&mut layer, Some(Duration::from_millis(500)), &tx);
        assert!(layer.is_active());

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(rx.try_recv().is_err());

        let elapsed = rx.recv().await.unwrap();
        assert_eq!(elapsed, generation);
        assert!(layer.expire(elapsed));
        assert!(!layer.is_active());
        assert_eq!(layer.state(), EffectState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_duration_uses_default() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut layer = EffectsLayer::new(Duration::from_secs(3));
        let start = Instant::now();

        trigger(&mut layer, None, &tx);
        assert_eq!(
            layer.state().expires_at,
            Some(start + Duration::from_secs(3))
        );

        rx.recv().await.unwrap();
        assert_eq!(Instant::now() - start, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retrigger_restarts_instead_of_stacking() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut layer = EffectsLayer::new(Duration::from_secs(3));
        let start = Instant::now();

        let first = trigger(&mut layer, Some(Duration::from_millis(500)), &tx);
        tokio::time::sleep(Duration::from_millis(300)).await;
        let second = trigger(&mut layer, Some(Duration::from_millis(500)), &tx);
        assert_ne!(first, second);

        let elapsed = rx.recv().await.unwrap();
        assert_eq!(elapsed, second, "first trigger should have been replaced");
        assert_eq!(Instant::now() - start, Duration::from_millis(800));

        assert!(!layer.expire(first));
        assert!(layer.is_active());
        assert!(layer.expire(second));
        assert!(!layer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_pending_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut layer = EffectsLayer::new(Duration::from_secs(3));

        let generation = trigger(&mut layer, None, &tx);
        assert!(layer.clear());
        assert!(!layer.clear());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert!(!layer.expire(generation));
    }
}
