//! Events flowing into the controller.
//!
//! [`ChannelEvent`]s are produced by the transport loop of the
//! [`ConnectionManager`](crate::connection::ConnectionManager).
//! [`ControllerInput`] is the single inbound queue item the
//! [`GameController`](crate::controller::GameController) processes, one at a
//! time, in arrival order.

use crate::protocol::{AnswerId, ServerMessage};

/// Events delivered by the channel's transport loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The transport is usable. Emitted once when the loop starts and again
    /// whenever traffic resumes after a [`Disconnected`](Self::Disconnected).
    Connected,
    /// The link dropped. The transport loop keeps running; recovering the
    /// link is the transport's job.
    Disconnected {
        /// Human-readable cause.
        reason: Option<String>,
    },
    /// The channel is gone for good. Always the last event.
    Closed {
        /// Human-readable cause, `None` when the server closed cleanly.
        reason: Option<String>,
    },
    /// A decoded server message.
    Server(ServerMessage),
}

impl From<ServerMessage> for ChannelEvent {
    fn from(msg: ServerMessage) -> Self {
        Self::Server(msg)
    }
}

/// One item of the controller's inbound queue.
///
/// Deferred work scheduled by the state machine (ticks, auto-return, effect
/// expiry) comes back through this queue tagged with the round, ticket or
/// generation it was scheduled for, so stale deliveries can be recognised
/// and dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerInput {
    /// Something arrived on the game channel.
    Channel(ChannelEvent),
    /// The player tapped an answer.
    SelectAnswer(AnswerId),
    /// The app regained visibility or focus.
    Foreground,
    /// One countdown second elapsed for question `round`.
    TimerTick { round: u64, remaining: u32 },
    /// The countdown for question `round` reached zero.
    TimerExpired { round: u64 },
    /// The result screen scheduled under `ticket` may return to waiting.
    AutoReturn { ticket: u64 },
    /// The jammer overlay triggered as `generation` has run its course.
    EffectElapsed { generation: u64 },
    /// The platform took the wake lock away.
    WakeLockReleased,
    /// Stop the session.
    Shutdown,
}
