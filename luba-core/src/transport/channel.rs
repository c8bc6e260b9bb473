use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::error::LubaError;
use crate::frame::Frame;
use crate::transport::{NotificationStream, Transport};

/// In-memory transport backed by a pair of mpsc channels.
///
/// Stands in for the GATT client in tests and in the capture replayer.
/// The other side of the channels is a [`DeviceEnd`], which plays the
/// mower.
#[derive(Debug)]
pub struct ChannelTransport {
    // App -> device writes
    tx: mpsc::Sender<Bytes>,
    // Device -> app notifications, handed out once by `subscribe`
    rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
}

/// The device side of a [`ChannelTransport`].
#[derive(Debug)]
pub struct DeviceEnd {
    written: mpsc::Receiver<Bytes>,
    notify: mpsc::Sender<Bytes>,
}

impl ChannelTransport {
    /// Create a connected transport / device pair.
    pub fn pair(capacity: usize) -> (Self, DeviceEnd) {
        // App -> device
        let (app_tx, device_rx) = mpsc::channel(capacity);
        // Device -> app
        let (device_tx, app_rx) = mpsc::channel(capacity);

        let transport = Self {
            tx: app_tx,
            rx: Mutex::new(Some(app_rx)),
        };
        let device = DeviceEnd {
            written: device_rx,
            notify: device_tx,
        };
        (transport, device)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn write(&self, data: Bytes) -> Result<(), LubaError> {
        self.tx
            .send(data)
            .await
            .map_err(|_| LubaError::TransportWrite("device end closed".into()))
    }

    fn subscribe(&self) -> Result<NotificationStream, LubaError> {
        let rx = self
            .rx
            .lock()
            .map_err(|_| LubaError::Other("notification receiver lock poisoned".into()))?
            .take()
            .ok_or(LubaError::ChannelClosed)?;

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|buf| (buf, rx))
        })
        .boxed())
    }
}

impl DeviceEnd {
    /// Push one raw notification buffer to the app.
    pub async fn notify(&self, buf: impl Into<Bytes>) -> Result<(), LubaError> {
        self.notify.send(buf.into()).await?;
        Ok(())
    }

    /// Push one frame to the app.
    pub async fn notify_frame(&self, frame: &Frame) -> Result<(), LubaError> {
        self.notify(frame.to_bytes()).await
    }

    /// Next buffer written by the app, or `None` once the app side is gone.
    pub async fn recv_written(&mut self) -> Option<Bytes> {
        self.written.recv().await
    }

    /// Next written buffer decoded as a frame.
    pub async fn recv_frame(&mut self) -> Option<Result<Frame, LubaError>> {
        self.recv_written().await.map(|buf| Frame::from_bytes(&buf))
    }

    /// A clone of the notification sender, for feeding from another task.
    pub fn notifier(&self) -> mpsc::Sender<Bytes> {
        self.notify.clone()
    }

    /// Simulate the link dropping: the app's notification stream ends
    /// and further writes fail.
    pub fn disconnect(self) {
        drop(self);
    }
}
