//! Domain-specific error types for the Luba BLE protocol.
//!
//! All fallible operations return `Result<T, LubaError>`.
//! Nothing in the session path panics on bad input; a bad frame is
//! reported, logged by the caller, and dropped.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the Luba protocol core.
#[derive(Debug, Error)]
pub enum LubaError {
    // ── Frame Errors ─────────────────────────────────────────────
    /// Fewer bytes than a frame header were received.
    #[error("malformed frame: {len} bytes is shorter than the 4-byte header")]
    MalformedFrame { len: usize },

    /// The header announced more payload than the buffer holds.
    #[error("truncated payload: header declares {expected} bytes, {actual} present")]
    TruncatedPayload { expected: usize, actual: usize },

    /// A payload does not fit the single-byte length field.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The observed read sequence differed from the expected one.
    #[error("sequence anomaly: expected {expected}, observed {observed}")]
    SequenceAnomaly { expected: u8, observed: u8 },

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// A reassembled message grew past the configured cap.
    #[error("reassembled message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    // ── Link Errors ──────────────────────────────────────────────
    /// No acknowledgement arrived within the deadline.
    #[error("ack timeout after {0:?}")]
    AckTimeout(Duration),

    /// The peer acknowledged a different sequence than the one sent.
    #[error("ack mismatch: expected {expected}, received {received}")]
    AckMismatch { expected: u8, received: u16 },

    /// The transport refused or failed a characteristic write.
    #[error("transport write failed: {0}")]
    TransportWrite(String),

    /// A connection phase transition was attempted from the wrong phase.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    /// The link to the device is gone.
    #[error("device disconnected")]
    Disconnected,

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// File or capture I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // ── Serialization Errors ─────────────────────────────────────
    /// Application bytes could not be decoded into a message.
    #[error("decode error: {0}")]
    Decode(String),

    /// A message or persisted state could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Application Errors ───────────────────────────────────────
    /// A registered listener reported a failure.
    #[error("listener failed: {0}")]
    Listener(String),

    /// No device is registered under that name.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device has no link matching its connection preference.
    #[error("no route to device {0}")]
    NoRoute(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for LubaError {
    fn from(s: String) -> Self {
        LubaError::Other(s)
    }
}

impl From<&str> for LubaError {
    fn from(s: &str) -> Self {
        LubaError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for LubaError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        LubaError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for LubaError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        LubaError::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for LubaError {
    fn from(e: serde_json::Error) -> Self {
        LubaError::Encoding(e.to_string())
    }
}

impl LubaError {
    /// Frame-level decode failures: the frame is dropped and the
    /// session keeps going.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            LubaError::MalformedFrame { .. }
                | LubaError::TruncatedPayload { .. }
                | LubaError::MessageTooLarge { .. }
        )
    }
}
