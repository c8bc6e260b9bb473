use bytes::BytesMut;
use tracing::{debug, warn};

use crate::error::LubaError;
use crate::frame::Frame;
use crate::header::HEADER_LENGTH;
use crate::sequence::SequenceCounter;

/// Frame codec for the notify/write characteristic pair.
///
/// Owns the read-direction sequence counter, so exactly one codec
/// instance must exist per connection.
#[derive(Debug, Default)]
pub struct FrameCodec {
    read_sequence: SequenceCounter,
    anomalies: u64,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a single notification buffer.
    ///
    /// Unlike the streaming [`Decoder`](tokio_util::codec::Decoder) impl,
    /// a short buffer is an error here: one BLE notification carries
    /// exactly one frame.
    pub fn decode_notification(&mut self, buf: &[u8]) -> Result<Frame, LubaError> {
        let frame = Frame::from_bytes(buf)?;
        self.inspect(&frame);
        Ok(frame)
    }

    /// Sequence anomalies seen since construction or the last reset.
    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    /// The read sequence expected on the next frame.
    pub fn expected_sequence(&self) -> u8 {
        self.read_sequence.peek()
    }

    pub fn reset(&mut self) {
        self.read_sequence.reset();
        self.anomalies = 0;
    }

    fn inspect(&mut self, frame: &Frame) {
        if let Err(e) = self.read_sequence.observe(frame.sequence()) {
            self.anomalies += 1;
            warn!("{e}; resynchronized read counter");
        }

        let control = frame.control();
        if control.is_encrypted() {
            warn!(
                sequence = frame.sequence(),
                "encrypted frame received; decryption is not supported, passing payload through"
            );
        }
        if control.has_checksum() {
            warn!(
                sequence = frame.sequence(),
                "checksummed frame received; checksum is not verified"
            );
        }

        debug!(
            package = frame.frame_type().package_bits(),
            subtype = frame.frame_type().subtype(),
            sequence = frame.sequence(),
            len = frame.payload().len(),
            fragment = control.has_fragment(),
            "frame decoded"
        );
    }
}

impl tokio_util::codec::Decoder for FrameCodec {
    type Item = Frame;
    type Error = LubaError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LENGTH {
            return Ok(None);
        }

        let frame_len = HEADER_LENGTH + src[3] as usize;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let bytes = src.split_to(frame_len);
        let frame = Frame::from_bytes(&bytes)?;
        self.inspect(&frame);
        Ok(Some(frame))
    }
}

impl tokio_util::codec::Encoder<Frame> for FrameCodec {
    type Error = LubaError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::FrameControl;
    use crate::header::FrameType;
    use tokio_util::codec::{Decoder, Encoder};

    fn frame(seq: u8, payload: &[u8]) -> Frame {
        Frame::new(FrameType::data(19), FrameControl::DIRECTION, seq, payload.to_vec()).unwrap()
    }

    #[test]
    fn notification_roundtrip() {
        let mut codec = FrameCodec::new();
        let original = frame(0, b"hello");
        let decoded = codec.decode_notification(&original.to_bytes()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(codec.anomalies(), 0);
        assert_eq!(codec.expected_sequence(), 1);
    }

    #[test]
    fn notification_too_short_is_error() {
        let mut codec = FrameCodec::new();
        assert!(codec.decode_notification(&[0x4D]).is_err());
    }

    #[test]
    fn sequence_gap_is_soft() {
        let mut codec = FrameCodec::new();
        codec.decode_notification(&frame(0, b"a").to_bytes()).unwrap();
        // Frame 1 lost: decoding still succeeds and the counter follows.
        let f = codec.decode_notification(&frame(2, b"c").to_bytes()).unwrap();
        assert_eq!(f.payload().as_ref(), b"c");
        assert_eq!(codec.anomalies(), 1);
        codec.decode_notification(&frame(3, b"d").to_bytes()).unwrap();
        assert_eq!(codec.anomalies(), 1);
    }

    #[test]
    fn stream_decoder_waits_for_full_frame() {
        let mut codec = FrameCodec::new();
        let bytes = frame(0, b"abcdef").to_bytes();

        let mut buf = BytesMut::from(&bytes[..3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&bytes[3..7]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&bytes[7..]);
        let f = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(f.payload().as_ref(), b"abcdef");
        assert!(buf.is_empty());
    }

    #[test]
    fn stream_decoder_splits_back_to_back_frames() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(frame(0, b"one"), &mut buf).unwrap();
        codec.encode(frame(1, b""), &mut buf).unwrap();

        let mut reader = FrameCodec::new();
        assert_eq!(reader.decode(&mut buf).unwrap().unwrap().payload().as_ref(), b"one");
        assert!(reader.decode(&mut buf).unwrap().unwrap().payload().is_empty());
        assert!(reader.decode(&mut buf).unwrap().is_none());
        assert_eq!(reader.anomalies(), 0);
    }
}
