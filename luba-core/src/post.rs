//! Outbound post pipeline.
//!
//! Splits a logical message into frames, stamps each with the next send
//! sequence, writes them through the [`Transport`], and optionally
//! waits for a per-frame acknowledgement. One post at a time per
//! connection: the send counter and the ack tracker live behind the
//! same async mutex that serializes posts.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::Mutex;
use tokio_util::codec::Encoder;
use tracing::{debug, warn};

use crate::codec::{FrameCodec, MessageCodec};
use crate::error::LubaError;
use crate::flags::FrameControl;
use crate::frame::{FRAGMENT_PREFIX_LEN, Frame, MAX_PAYLOAD_SIZE, split_payload};
use crate::header::{FrameType, SUBTYPE_CUSTOM_DATA};
use crate::message::LubaMessage;
use crate::sequence::{AckSender, AckTracker, SequenceCounter};
use crate::transport::Transport;

/// Chunk size negotiated with the mower's BLE stack.
pub const DEFAULT_CHUNK_SIZE: usize = 517;

/// Tuning for the post pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostConfig {
    /// Negotiated transport maximum per write.
    pub chunk_size: usize,
    /// Pause between fragment writes.
    pub pacing: Duration,
    /// Upper bound on each ack wait.
    pub ack_timeout: Duration,
    /// Request an ack for application messages sent via [`Poster::send_message`].
    pub require_ack: bool,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pacing: Duration::from_millis(10),
            ack_timeout: Duration::from_secs(3),
            require_ack: false,
        }
    }
}

impl PostConfig {
    /// Content bytes per fragment.
    ///
    /// The negotiated chunk size is clamped so that prefix and content
    /// fit the single-byte length field.
    pub fn fragment_size(&self) -> usize {
        self.chunk_size
            .min(MAX_PAYLOAD_SIZE - FRAGMENT_PREFIX_LEN)
            .max(1)
    }
}

#[derive(Debug)]
struct PostState {
    send_sequence: SequenceCounter,
    acks: AckTracker,
    codec: FrameCodec,
}

/// Sends frames to one device.
pub struct Poster {
    transport: Arc<dyn Transport>,
    config: PostConfig,
    state: Mutex<PostState>,
    ack_sender: AckSender,
}

impl Poster {
    pub fn new(transport: Arc<dyn Transport>, config: PostConfig) -> Self {
        let acks = AckTracker::new();
        let ack_sender = acks.sender();
        Self {
            transport,
            config,
            state: Mutex::new(PostState {
                send_sequence: SequenceCounter::new(),
                acks,
                codec: FrameCodec::new(),
            }),
            ack_sender,
        }
    }

    pub fn config(&self) -> &PostConfig {
        &self.config
    }

    /// Handle for the inbound path to deliver control-channel acks.
    pub fn ack_sender(&self) -> AckSender {
        self.ack_sender.clone()
    }

    /// Start the send counter over and forget unclaimed acks, for a
    /// fresh connection. Waits for any post in flight.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.send_sequence.reset();
        state.acks.drain_stale();
    }

    /// Post one logical message.
    ///
    /// Empty `data` goes out as a single header-only frame. A failed
    /// write or ack aborts the post; the caller resends the whole
    /// message if it wants to retry.
    pub async fn post(
        &self,
        encrypt: bool,
        checksum: bool,
        require_ack: bool,
        frame_type: FrameType,
        data: &[u8],
    ) -> Result<(), LubaError> {
        let mut state = self.state.lock().await;
        let stale = state.acks.drain_stale();
        if stale > 0 {
            debug!(stale, "dropped unclaimed acks before post");
        }

        if data.is_empty() {
            let sequence = state.send_sequence.next_sequence();
            let control = FrameControl::outbound(encrypt, checksum, require_ack, false);
            let frame = Frame::header_only(frame_type, control, sequence);
            return self.write_frame(&mut state, frame, require_ack).await;
        }

        let chunks = split_payload(data, self.config.fragment_size())?;
        let count = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let sequence = state.send_sequence.next_sequence();
            let control = FrameControl::outbound(encrypt, checksum, require_ack, chunk.has_fragment);
            let frame = Frame::new(frame_type, control, sequence, chunk.payload)?;

            if let Err(e) = self.write_frame(&mut state, frame, require_ack).await {
                warn!(fragment = index + 1, of = count, "post aborted: {e}");
                return Err(e);
            }

            if index + 1 < count {
                tokio::time::sleep(self.config.pacing).await;
            }
        }
        Ok(())
    }

    /// Encode and post an application message as custom data.
    pub async fn send_message(
        &self,
        codec: &dyn MessageCodec,
        message: &LubaMessage,
    ) -> Result<(), LubaError> {
        let data = codec.encode(message)?;
        debug!(category = message.category(), len = data.len(), "sending message");
        self.post(
            false,
            false,
            self.config.require_ack,
            FrameType::data(SUBTYPE_CUSTOM_DATA),
            &data,
        )
        .await
    }

    async fn write_frame(
        &self,
        state: &mut PostState,
        frame: Frame,
        require_ack: bool,
    ) -> Result<(), LubaError> {
        let sequence = frame.sequence();
        let mut buf = BytesMut::with_capacity(frame.encoded_len());
        state.codec.encode(frame, &mut buf)?;

        self.transport.write(buf.freeze()).await?;

        if require_ack {
            state.acks.wait_for(sequence, self.config.ack_timeout).await?;
        }
        Ok(())
    }
}
