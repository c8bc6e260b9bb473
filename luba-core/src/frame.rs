use std::fmt::Debug;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::LubaError;
use crate::flags::FrameControl;
use crate::header::{FrameHeader, FrameType, HEADER_LENGTH};

/// The length field is a single byte.
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;

pub const MAX_FRAME_SIZE: usize = HEADER_LENGTH + MAX_PAYLOAD_SIZE;

/// Fragment frames open with a little-endian `u16` giving the number of
/// content bytes still to come, this frame included.
pub const FRAGMENT_PREFIX_LEN: usize = 2;

/// One wire unit: four header bytes followed by `length` payload bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: Bytes,
}

impl Frame {
    pub fn new(
        frame_type: FrameType,
        control: FrameControl,
        sequence: u8,
        payload: impl Into<Bytes>,
    ) -> Result<Self, LubaError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(LubaError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let header = FrameHeader::new(frame_type, control, sequence, payload.len() as u8);
        Ok(Self { header, payload })
    }

    /// A frame with no payload.
    pub fn header_only(frame_type: FrameType, control: FrameControl, sequence: u8) -> Self {
        Self {
            header: FrameHeader::new(frame_type, control, sequence, 0),
            payload: Bytes::new(),
        }
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn frame_type(&self) -> FrameType {
        self.header.frame_type()
    }

    pub fn control(&self) -> FrameControl {
        self.header.control()
    }

    pub fn sequence(&self) -> u8 {
        self.header.sequence()
    }

    /// Raw payload exactly as carried on the wire.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload with the fragment prefix removed.
    pub fn content(&self) -> &[u8] {
        if self.control().has_fragment() && self.payload.len() >= FRAGMENT_PREFIX_LEN {
            &self.payload[FRAGMENT_PREFIX_LEN..]
        } else {
            &self.payload
        }
    }

    /// Remaining-content counter of a fragment frame.
    pub fn remaining_length(&self) -> Option<u16> {
        if self.control().has_fragment() && self.payload.len() >= FRAGMENT_PREFIX_LEN {
            Some(u16::from_le_bytes([self.payload[0], self.payload[1]]))
        } else {
            None
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LENGTH + self.payload.len()
    }

    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Decode one frame from a notification buffer.
    ///
    /// Bytes past `4 + length` are ignored; with the checksum flag set
    /// that is where the firmware places the two checksum bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LubaError> {
        let header = FrameHeader::from_bytes(bytes)?;
        let end = HEADER_LENGTH + header.length() as usize;
        if bytes.len() < end {
            return Err(LubaError::TruncatedPayload {
                expected: header.length() as usize,
                actual: bytes.len() - HEADER_LENGTH,
            });
        }
        if header.control().has_fragment() && (header.length() as usize) < FRAGMENT_PREFIX_LEN {
            return Err(LubaError::TruncatedPayload {
                expected: FRAGMENT_PREFIX_LEN,
                actual: header.length() as usize,
            });
        }
        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&bytes[HEADER_LENGTH..end]),
        })
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

// ── Fragmentation ────────────────────────────────────────────────

/// One piece of a logical message, ready to be wrapped in a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentChunk {
    /// Frame payload; fragments carry the remaining-length prefix.
    pub payload: Bytes,
    pub has_fragment: bool,
}

/// Split `data` into `chunk_size` content pieces.
///
/// Every piece but the last is flagged as a fragment and prefixed with
/// the count of content bytes still to come. Empty input yields no
/// chunks; callers send a header-only frame instead.
pub fn split_payload(data: &[u8], chunk_size: usize) -> Result<Vec<FragmentChunk>, LubaError> {
    if chunk_size == 0 {
        return Err(LubaError::Other("fragment chunk size must be non-zero".into()));
    }
    if data.len() > u16::MAX as usize {
        return Err(LubaError::PayloadTooLarge {
            size: data.len(),
            max: u16::MAX as usize,
        });
    }

    let count = data.len().div_ceil(chunk_size);
    let mut chunks = Vec::with_capacity(count);
    for (index, piece) in data.chunks(chunk_size).enumerate() {
        let has_fragment = index + 1 != count;
        let payload = if has_fragment {
            let remaining = (data.len() - index * chunk_size) as u16;
            let mut buf = BytesMut::with_capacity(FRAGMENT_PREFIX_LEN + piece.len());
            buf.put_u16_le(remaining);
            buf.put_slice(piece);
            buf.freeze()
        } else {
            Bytes::copy_from_slice(piece)
        };
        chunks.push(FragmentChunk {
            payload,
            has_fragment,
        });
    }
    Ok(chunks)
}
