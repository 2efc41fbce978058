//! Tunables for a controller session.

use std::time::Duration;

/// Default delay before a non-terminal result screen returns to waiting.
pub const DEFAULT_AUTO_RETURN_DELAY: Duration = Duration::from_secs(3);

/// Default duration of a jammer attack when the server does not specify one.
pub const DEFAULT_JAMMER_DURATION: Duration = Duration::from_secs(3);

/// Default capacity of the bounded channel event queue.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown of the transport loop.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`GameController`](crate::controller::GameController)
/// session.
///
/// Every field has a fixed default matching the live game; the builder
/// methods exist for tests and embedders that need different pacing.
///
/// # Example
///
/// ```
/// use neonmind_controller::config::ControllerConfig;
/// use std::time::Duration;
///
/// let config = ControllerConfig::default()
///     .with_auto_return_delay(Duration::from_secs(5))
///     .with_event_channel_capacity(64);
/// assert_eq!(config.auto_return_delay, Duration::from_secs(5));
/// assert_eq!(config.default_jammer_duration, Duration::from_secs(3));
/// ```
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// How long a correct or non-eliminating result stays on screen.
    ///
    /// Defaults to **3 seconds**.
    pub auto_return_delay: Duration,
    /// Jammer overlay duration used when `jammer_attack` carries none.
    ///
    /// Defaults to **3 seconds**.
    pub default_jammer_duration: Duration,
    /// Capacity of the bounded channel event queue.
    ///
    /// When the controller falls behind, the transport loop waits for room
    /// before forwarding the next server message, so none is ever lost. Only
    /// the synthetic link notices (`Connected`, `Disconnected`) are dropped,
    /// with a warning, when the queue is full. The final `Closed` event is
    /// always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the transport loop is given to close gracefully on shutdown
    /// before it is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            auto_return_delay: DEFAULT_AUTO_RETURN_DELAY,
            default_jammer_duration: DEFAULT_JAMMER_DURATION,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ControllerConfig {
    /// Set the delay before a result screen returns to waiting.
    #[must_use]
    pub fn with_auto_return_delay(mut self, delay: Duration) -> Self {
        self.auto_return_delay = delay;
        self
    }

    /// Set the fallback jammer overlay duration.
    #[must_use]
    pub fn with_default_jammer_duration(mut self, duration: Duration) -> Self {
        self.default_jammer_duration = duration;
        self
    }

    /// Set the capacity of the channel event queue.
    ///
    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
