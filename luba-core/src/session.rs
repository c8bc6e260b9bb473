//! One BLE session with one mower.
//!
//! ```text
//! notify ─► FrameCodec ─┬─ control ack ─► AckSender ─► Poster
//!                       └─ data ─► Reassembler ─► MessageCodec ─► StateManager
//! ```
//!
//! The session owns every piece of inbound state: the read counter,
//! the reassembly buffer and the dispatcher. Outbound traffic goes
//! through a shared [`Poster`] so that any number of [`BleLink`]s can
//! send while the session keeps reading.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::codec::{FrameCodec, MessageCodec};
use crate::commands::{self, BLE_SYNC_AFTER_NET_STATUS};
use crate::error::LubaError;
use crate::frame::Frame;
use crate::header::{FrameType, SUBTYPE_CUSTOM_DATA};
use crate::message::{LubaMessage, LubaSubMessage, NetMessage};
use crate::post::{PostConfig, Poster};
use crate::reassembly::Reassembler;
use crate::registry::CommandSink;
use crate::sequence::{AckSender, parse_ack};
use crate::state::{ConnectionPhase, SharedDevice, StateManager};
use crate::transport::{NotificationStream, Transport};

/// Counters kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub dropped_frames: u64,
    pub acks: u64,
    pub messages: u64,
    pub decode_errors: u64,
}

pub struct BleSession {
    name: String,
    transport: Arc<dyn Transport>,
    codec: FrameCodec,
    reassembler: Reassembler,
    messages: Arc<dyn MessageCodec>,
    state: StateManager,
    poster: Arc<Poster>,
    acks: AckSender,
    phase: ConnectionPhase,
    stats: SessionStats,
}

impl BleSession {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        messages: Arc<dyn MessageCodec>,
        device: SharedDevice,
        config: PostConfig,
    ) -> Self {
        let poster = Arc::new(Poster::new(Arc::clone(&transport), config));
        let acks = poster.ack_sender();
        Self {
            name: name.into(),
            transport,
            codec: FrameCodec::new(),
            reassembler: Reassembler::new(),
            messages,
            state: StateManager::new(device),
            poster,
            acks,
            phase: ConnectionPhase::default(),
            stats: SessionStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> &ConnectionPhase {
        &self.phase
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn device(&self) -> SharedDevice {
        self.state.device()
    }

    /// Register listeners before calling [`run`](Self::run).
    pub fn state_mut(&mut self) -> &mut StateManager {
        &mut self.state
    }

    /// Read sequence anomalies seen on this link.
    pub fn anomalies(&self) -> u64 {
        self.codec.anomalies()
    }

    /// A cloneable sender for this link.
    pub fn link(&self) -> BleLink {
        BleLink {
            poster: Arc::clone(&self.poster),
            messages: Arc::clone(&self.messages),
        }
    }

    pub async fn send(&self, message: &LubaMessage) -> Result<(), LubaError> {
        self.poster
            .send_message(self.messages.as_ref(), message)
            .await
    }

    /// Enable notifications and mark the link live.
    pub fn connect(&mut self) -> Result<NotificationStream, LubaError> {
        self.phase.begin_connect()?;
        self.phase.begin_subscribe()?;
        match self.transport.subscribe() {
            Ok(stream) => {
                self.phase.complete_subscribe()?;
                info!(device = %self.name, "notifications enabled");
                Ok(stream)
            }
            Err(e) => {
                warn!(device = %self.name, "subscribe failed: {e}");
                self.phase.abort_connect().and(Err(e))
            }
        }
    }

    /// [`connect`](Self::connect), then [`run`](Self::run) until the
    /// link drops.
    pub async fn serve(&mut self) -> Result<SessionStats, LubaError> {
        let stream = self.connect()?;
        Ok(self.run(stream).await)
    }

    /// Process notifications until the stream ends.
    ///
    /// Bad frames are logged and dropped. When the stream ends the
    /// session disconnects: any partially reassembled message is
    /// discarded and both sequence counters start over for the next
    /// connection.
    pub async fn run(&mut self, mut stream: NotificationStream) -> SessionStats {
        while let Some(buf) = stream.next().await {
            if let Err(e) = self.handle_notification(&buf) {
                warn!(device = %self.name, "notification dropped: {e}");
            }
        }

        info!(
            device = %self.name,
            frames = self.stats.frames,
            messages = self.stats.messages,
            "notification stream ended"
        );
        if let Err(e) = self.disconnect().await {
            debug!(device = %self.name, "{e}; resetting link state");
            self.reset_link().await;
            self.phase.force_disconnect();
        }
        self.stats
    }

    /// Tear down a live or subscribing link.
    ///
    /// Goes through `Disconnecting`, drops the partial message and
    /// resets the read and send counters, then lands in `Disconnected`.
    pub async fn disconnect(&mut self) -> Result<(), LubaError> {
        let uptime = self.phase.connected_duration();
        self.phase.begin_disconnect()?;
        self.reset_link().await;
        self.phase.finish_disconnect()?;
        info!(
            device = %self.name,
            uptime_ms = uptime.map(|d| d.as_millis() as u64),
            "disconnected"
        );
        Ok(())
    }

    async fn reset_link(&mut self) {
        self.reassembler.reset();
        self.codec.reset();
        self.poster.reset().await;
    }

    /// Decode and handle one raw notification buffer.
    ///
    /// Returns the application message if this buffer completed one.
    pub fn handle_notification(&mut self, buf: &[u8]) -> Result<Option<LubaMessage>, LubaError> {
        let frame = match self.codec.decode_notification(buf) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.dropped_frames += 1;
                return Err(e);
            }
        };
        self.handle_frame(&frame)
    }

    /// Handle one already decoded frame.
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<Option<LubaMessage>, LubaError> {
        self.stats.frames += 1;

        if frame.frame_type().is_ack() {
            let ack = parse_ack(frame.payload());
            debug!(ack, "control ack");
            self.stats.acks += 1;
            self.acks.push(ack);
            return Ok(None);
        }

        let complete = match self.reassembler.push_frame(frame) {
            Ok(Some(complete)) => complete,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.stats.dropped_frames += 1;
                return Err(e);
            }
        };

        if complete.pkg_type != 1 || complete.sub_type != SUBTYPE_CUSTOM_DATA {
            debug!(
                pkg_type = complete.pkg_type,
                sub_type = complete.sub_type,
                len = complete.data.len(),
                "ignoring non-application message"
            );
            return Ok(None);
        }

        let message = match self.messages.decode(&complete.data) {
            Ok(message) => message,
            Err(e) => {
                self.stats.decode_errors += 1;
                return Err(e);
            }
        };
        self.stats.messages += 1;
        debug!(category = message.category(), "message received");

        self.state.notification(&message);
        self.react(&message);
        Ok(Some(message))
    }

    // Replies the device expects without the app asking. Posting is
    // spawned so an ack wait never blocks the notification path.
    fn react(&self, message: &LubaMessage) {
        let LubaSubMessage::Net(NetMessage::WifiIotStatus(_)) = &message.body else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime; skipping ble sync reply");
            return;
        };

        let link = self.link();
        runtime.spawn(async move {
            let reply = commands::ble_sync(BLE_SYNC_AFTER_NET_STATUS);
            if let Err(e) = link.send_command(&reply).await {
                warn!("ble sync reply failed: {e}");
            }
        });
    }
}

impl std::fmt::Debug for BleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleSession")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Outbound half of a [`BleSession`].
#[derive(Clone)]
pub struct BleLink {
    poster: Arc<Poster>,
    messages: Arc<dyn MessageCodec>,
}

impl BleLink {
    /// Post raw custom data, bypassing the message codec.
    pub async fn post_raw(&self, data: &[u8]) -> Result<(), LubaError> {
        self.poster
            .post(
                false,
                false,
                self.poster.config().require_ack,
                FrameType::data(SUBTYPE_CUSTOM_DATA),
                data,
            )
            .await
    }
}

#[async_trait]
impl CommandSink for BleLink {
    async fn send_command(&self, message: &LubaMessage) -> Result<(), LubaError> {
        self.poster
            .send_message(self.messages.as_ref(), message)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::codec::BincodeCodec;
    use crate::flags::FrameControl;
    use crate::message::{
        MsgCmdType, MsgDevice, NavGetHashListAck, NavMessage, WifiIotStatusReport,
    };
    use crate::state::MowingDevice;
    use crate::transport::{ChannelTransport, DeviceEnd};

    fn session() -> (BleSession, DeviceEnd) {
        let (transport, device) = ChannelTransport::pair(16);
        let session = BleSession::new(
            "Luba-TEST",
            Arc::new(transport),
            Arc::new(BincodeCodec),
            MowingDevice::new().shared(),
            PostConfig::default(),
        );
        (session, device)
    }

    fn data_frame(seq: u8, payload: Vec<u8>) -> Vec<u8> {
        Frame::new(
            FrameType::data(SUBTYPE_CUSTOM_DATA),
            FrameControl::DIRECTION,
            seq,
            payload,
        )
        .unwrap()
        .to_bytes()
        .to_vec()
    }

    fn encode(body: LubaSubMessage) -> Vec<u8> {
        let msg = LubaMessage::request(MsgCmdType::Nav, MsgDevice::MobileApp, body);
        BincodeCodec.encode(&msg).unwrap()
    }

    #[tokio::test]
    async fn root_ack_reaches_map() {
        let (mut session, _device) = session();
        let payload = encode(LubaSubMessage::Nav(NavMessage::GetHashListAck(
            NavGetHashListAck {
                total_frame: 1,
                current_frame: 1,
                data_couple: vec![42],
                ..Default::default()
            },
        )));

        let msg = session
            .handle_notification(&data_frame(0, payload))
            .unwrap()
            .unwrap();
        assert_eq!(msg.category(), "nav");
        assert_eq!(session.device().read().unwrap().map.hashlist(), vec![42]);
        assert_eq!(session.stats().messages, 1);
    }

    #[tokio::test]
    async fn malformed_notification_counted() {
        let (mut session, _device) = session();
        assert!(session.handle_notification(&[0x4D, 0x04]).is_err());
        assert_eq!(session.stats().dropped_frames, 1);
    }

    #[tokio::test]
    async fn control_ack_is_not_reassembled() {
        let (mut session, _device) = session();
        let ack = Frame::new(FrameType::control(0), FrameControl::DIRECTION, 0, vec![3]).unwrap();
        assert!(session.handle_frame(&ack).unwrap().is_none());
        assert_eq!(session.stats().acks, 1);
        assert_eq!(session.stats().frames, 1);
    }

    #[tokio::test]
    async fn unrecognised_variant_still_notifies() {
        let (mut session, _device) = session();
        let changed = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&changed);
        session.state_mut().on_state_changed(move || {
            handle.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        // Category tag sits after the 36-byte envelope header and the
        // 4-byte body tag.
        let mut payload = encode(LubaSubMessage::Nav(NavMessage::GetHashListAck(
            NavGetHashListAck::default(),
        )));
        payload[40..44].copy_from_slice(&50u32.to_le_bytes());
        let frame = Frame::new(
            FrameType::data(SUBTYPE_CUSTOM_DATA),
            FrameControl::DIRECTION,
            0,
            payload,
        )
        .unwrap();

        let msg = session.handle_frame(&frame).unwrap().unwrap();
        assert_eq!(msg.body, LubaSubMessage::Nav(NavMessage::Unknown));
        assert_eq!(changed.load(Ordering::SeqCst), 1);
        assert_eq!(session.stats().decode_errors, 0);
    }

    #[tokio::test]
    async fn wifi_status_triggers_ble_sync() {
        let (mut session, mut device) = session();
        let payload = encode(LubaSubMessage::Net(NetMessage::WifiIotStatus(
            WifiIotStatusReport::default(),
        )));
        session
            .handle_notification(&data_frame(0, payload))
            .unwrap();

        let frame = device.recv_frame().await.unwrap().unwrap();
        let reply = BincodeCodec.decode(frame.content()).unwrap();
        assert_eq!(
            reply.body,
            LubaSubMessage::Net(NetMessage::BleSync { sync_type: 2 })
        );
    }

    #[tokio::test]
    async fn disconnect_resets_both_counters() {
        let (mut session, mut device) = session();
        let _stream = session.connect().unwrap();

        session.send(&commands::get_hash_list()).await.unwrap();
        assert_eq!(device.recv_frame().await.unwrap().unwrap().sequence(), 0);
        session
            .handle_notification(&data_frame(0, encode(LubaSubMessage::Unknown)))
            .unwrap();

        session.disconnect().await.unwrap();
        assert!(session.phase().is_disconnected());
        assert!(matches!(
            session.disconnect().await,
            Err(LubaError::InvalidTransition(_))
        ));

        session.send(&commands::get_hash_list()).await.unwrap();
        assert_eq!(device.recv_frame().await.unwrap().unwrap().sequence(), 0);
        session
            .handle_notification(&data_frame(0, encode(LubaSubMessage::Unknown)))
            .unwrap();
        assert_eq!(session.anomalies(), 0);
    }

    #[tokio::test]
    async fn run_ends_disconnected() {
        let (mut session, device) = session();
        let stream = session.connect().unwrap();
        assert!(session.phase().is_connected());

        let partial = Frame::new(
            FrameType::data(SUBTYPE_CUSTOM_DATA),
            FrameControl::DIRECTION | FrameControl::FRAGMENT,
            0,
            vec![0x10, 0x00, 1, 2, 3],
        )
        .unwrap();
        device.notify_frame(&partial).await.unwrap();
        device.disconnect();

        let stats = session.run(stream).await;
        assert_eq!(stats.frames, 1);
        assert!(session.phase().is_disconnected());
    }
}
