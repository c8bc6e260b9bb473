//! BLE link lifecycle.
//!
//! A session walks GATT connect, notification subscribe, live, and an
//! orderly teardown. Transitions return `Result` so an out-of-order
//! event is reported to the caller instead of corrupting the phase.

use std::time::{Duration, Instant};

use crate::error::LubaError;

/// The current phase of a link to one mower.
///
/// ```text
///  Disconnected ──► Connecting ──► Subscribing ──► Connected
///       ▲               │               │              │
///       │               └─ abort ───────┤              ▼
///       └───────────────────────────────┴──── Disconnecting
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,

    /// GATT connection requested.
    Connecting,

    /// Enabling notifications on the read characteristic.
    Subscribing,

    /// Notification stream is live.
    Connected { since: Instant },

    /// Dropping link state before the GATT connection goes away.
    Disconnecting,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Subscribing => write!(f, "subscribing"),
            Self::Connected { since } => write!(f, "connected for {:?}", since.elapsed()),
            Self::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

impl ConnectionPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    pub fn connected_duration(&self) -> Option<Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    fn advance(&mut self, allowed: bool, next: Self, why: &'static str) -> Result<(), LubaError> {
        if !allowed {
            return Err(LubaError::InvalidTransition(why));
        }
        *self = next;
        Ok(())
    }

    pub fn begin_connect(&mut self) -> Result<(), LubaError> {
        let allowed = self.is_disconnected();
        self.advance(allowed, Self::Connecting, "connect requested while a link exists")
    }

    pub fn begin_subscribe(&mut self) -> Result<(), LubaError> {
        let allowed = matches!(self, Self::Connecting);
        self.advance(allowed, Self::Subscribing, "subscribe requested before connecting")
    }

    pub fn complete_subscribe(&mut self) -> Result<(), LubaError> {
        let allowed = matches!(self, Self::Subscribing);
        let next = Self::Connected {
            since: Instant::now(),
        };
        self.advance(allowed, next, "notifications enabled outside subscribe")
    }

    /// Connect or subscribe failed; nothing to tear down.
    pub fn abort_connect(&mut self) -> Result<(), LubaError> {
        let allowed = matches!(self, Self::Connecting | Self::Subscribing);
        self.advance(allowed, Self::Disconnected, "no connect attempt to abort")
    }

    pub fn begin_disconnect(&mut self) -> Result<(), LubaError> {
        let allowed = matches!(self, Self::Subscribing | Self::Connected { .. });
        self.advance(allowed, Self::Disconnecting, "disconnect requested without a link")
    }

    pub fn finish_disconnect(&mut self) -> Result<(), LubaError> {
        let allowed = matches!(self, Self::Disconnecting);
        self.advance(allowed, Self::Disconnected, "disconnect finished before it began")
    }

    /// The link vanished underneath us, e.g. the notification stream
    /// ended without a teardown.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}
