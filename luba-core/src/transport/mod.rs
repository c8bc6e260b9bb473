//! Transport adapter seam.
//!
//! The protocol core only needs two primitives from the BLE stack: a
//! write to the command characteristic (with response) and the stream
//! of notifications from the notify characteristic. Anything providing
//! them, a real GATT client or the in-memory [`ChannelTransport`],
//! can carry a session.

pub mod channel;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::LubaError;

pub use channel::{ChannelTransport, DeviceEnd};

/// Raw notification buffers, one per BLE notification.
pub type NotificationStream = BoxStream<'static, Bytes>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one encoded frame to the device.
    async fn write(&self, data: Bytes) -> Result<(), LubaError>;

    /// Take the inbound notification stream.
    ///
    /// The stream ends when the link drops.
    fn subscribe(&self) -> Result<NotificationStream, LubaError>;
}
