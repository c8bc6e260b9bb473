//! Reassembly of fragmented application messages.
//!
//! The device never interleaves two logical messages on the notify
//! characteristic, so a single accumulator is enough: every frame
//! appends its content, and the first frame without the fragment bit
//! closes the message.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::LubaError;
use crate::flags::FrameControl;
use crate::frame::Frame;
use crate::header::FrameType;

/// Upper bound on one reassembled message (the fragment prefix is a u16).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// A fully reassembled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteMessage {
    /// `type & 0b11`
    pub pkg_type: u8,
    /// `(type & 0b1111_1100) >> 2`
    pub sub_type: u8,
    /// Control bits of the first frame.
    pub control: FrameControl,
    pub data: Bytes,
}

#[derive(Debug)]
struct Pending {
    frame_type: FrameType,
    control: FrameControl,
    buf: BytesMut,
    frames: usize,
}

#[derive(Debug)]
pub struct Reassembler {
    pending: Option<Pending>,
    max_message_size: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_limit(max_message_size: usize) -> Self {
        Self {
            pending: None,
            max_message_size,
        }
    }

    /// Feed one decoded frame.
    pub fn push_frame(&mut self, frame: &Frame) -> Result<Option<CompleteMessage>, LubaError> {
        self.push(frame.frame_type(), frame.control(), frame.content())
    }

    /// Feed one frame's type, control bits and offset-corrected content.
    ///
    /// Returns the complete message once a frame without the fragment
    /// bit arrives. An oversized message is discarded and reported.
    pub fn push(
        &mut self,
        frame_type: FrameType,
        control: FrameControl,
        content: &[u8],
    ) -> Result<Option<CompleteMessage>, LubaError> {
        let pending = self.pending.get_or_insert_with(|| Pending {
            frame_type,
            control,
            buf: BytesMut::new(),
            frames: 0,
        });

        let size = pending.buf.len() + content.len();
        if size > self.max_message_size {
            self.pending = None;
            return Err(LubaError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        pending.buf.extend_from_slice(content);
        pending.frames += 1;

        if control.has_fragment() {
            return Ok(None);
        }

        let Some(done) = self.pending.take() else {
            return Ok(None);
        };
        debug!(
            frames = done.frames,
            len = done.buf.len(),
            subtype = done.frame_type.subtype(),
            "message reassembled"
        );
        Ok(Some(CompleteMessage {
            pkg_type: done.frame_type.package_bits(),
            sub_type: done.frame_type.subtype(),
            control: done.control,
            data: done.buf.freeze(),
        }))
    }

    /// Whether a message is partially accumulated.
    pub fn in_progress(&self) -> bool {
        self.pending.is_some()
    }

    /// Bytes accumulated for the message in progress.
    pub fn buffered_len(&self) -> usize {
        self.pending.as_ref().map(|p| p.buf.len()).unwrap_or(0)
    }

    /// Drop any partial message, e.g. when the link goes down.
    pub fn reset(&mut self) {
        if let Some(p) = self.pending.take() {
            debug!(frames = p.frames, len = p.buf.len(), "discarding partial message");
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::split_payload;
    use crate::header::SUBTYPE_CUSTOM_DATA;

    #[test]
    fn single_frame_completes_immediately() {
        let mut r = Reassembler::new();
        let frame = Frame::new(
            FrameType::data(SUBTYPE_CUSTOM_DATA),
            FrameControl::DIRECTION,
            0,
            b"ping".to_vec(),
        )
        .unwrap();

        let msg = r.push_frame(&frame).unwrap().unwrap();
        assert_eq!(msg.pkg_type, 1);
        assert_eq!(msg.sub_type, 19);
        assert_eq!(msg.data.as_ref(), b"ping");
        assert!(!r.in_progress());
    }

    #[test]
    fn split_1100_reassembles() {
        let data: Vec<u8> = (0..1100u32).map(|i| (i * 7 % 256) as u8).collect();
        let chunks = split_payload(&data, 517).unwrap();
        assert_eq!(chunks.len(), 3);

        let mut r = Reassembler::new();
        let frame_type = FrameType::data(SUBTYPE_CUSTOM_DATA);
        let mut out = None;
        for chunk in &chunks {
            let control = if chunk.has_fragment {
                FrameControl::FRAGMENT
            } else {
                FrameControl::empty()
            };
            let content = if chunk.has_fragment {
                &chunk.payload[2..]
            } else {
                &chunk.payload[..]
            };
            out = r.push(frame_type, control, content).unwrap();
        }
        let msg = out.unwrap();
        assert_eq!(msg.data.len(), 1100);
        assert_eq!(msg.data.as_ref(), &data[..]);
    }

    #[test]
    fn first_frame_type_is_kept() {
        let mut r = Reassembler::new();
        assert!(
            r.push(FrameType::data(19), FrameControl::FRAGMENT, b"ab")
                .unwrap()
                .is_none()
        );
        let msg = r
            .push(FrameType::data(5), FrameControl::empty(), b"cd")
            .unwrap()
            .unwrap();
        assert_eq!(msg.sub_type, 19);
        assert!(msg.control.has_fragment());
        assert_eq!(msg.data.as_ref(), b"abcd");
    }

    #[test]
    fn reset_discards_partial() {
        let mut r = Reassembler::new();
        r.push(FrameType::data(19), FrameControl::FRAGMENT, b"stale")
            .unwrap();
        assert_eq!(r.buffered_len(), 5);
        r.reset();
        assert!(!r.in_progress());

        let msg = r
            .push(FrameType::data(19), FrameControl::empty(), b"fresh")
            .unwrap()
            .unwrap();
        assert_eq!(msg.data.as_ref(), b"fresh");
    }

    #[test]
    fn oversized_message_dropped() {
        let mut r = Reassembler::with_limit(4);
        r.push(FrameType::data(19), FrameControl::FRAGMENT, b"abc")
            .unwrap();
        let err = r
            .push(FrameType::data(19), FrameControl::FRAGMENT, b"de")
            .unwrap_err();
        assert!(matches!(err, LubaError::MessageTooLarge { size: 5, max: 4 }));
        assert!(!r.in_progress());
    }
}
