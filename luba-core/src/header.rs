use std::fmt;

use crate::error::LubaError;
use crate::flags::FrameControl;

pub const HEADER_LENGTH: usize = 4;

pub type FrameHeaderBytes = [u8; HEADER_LENGTH];

/// Subtype of data frames that carry the application envelope.
pub const SUBTYPE_CUSTOM_DATA: u8 = 19;

/// Subtype of control frames that carry an acknowledgement.
pub const SUBTYPE_ACK: u8 = 0;

// ── PackageType ──────────────────────────────────────────────────

/// Low two bits of the type byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageType {
    Control = 0,
    Data = 1,
}

impl TryFrom<u8> for PackageType {
    type Error = LubaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PackageType::Control),
            1 => Ok(PackageType::Data),
            _ => Err(LubaError::UnknownVariant {
                type_name: "PackageType",
                value: value as u64,
            }),
        }
    }
}

// ── FrameType ────────────────────────────────────────────────────

/// The packed type byte: `(subtype << 2) | package`.
///
/// Kept as the raw byte so that package values 2 and 3, which the
/// firmware never sends but a corrupt frame might, survive a decode
/// and can be reported instead of rejected.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameType(u8);

impl FrameType {
    pub fn new(package: PackageType, subtype: u8) -> Self {
        Self(((subtype & 0x3F) << 2) | package as u8)
    }

    pub const fn from_byte(value: u8) -> Self {
        Self(value)
    }

    pub fn data(subtype: u8) -> Self {
        Self::new(PackageType::Data, subtype)
    }

    pub fn control(subtype: u8) -> Self {
        Self::new(PackageType::Control, subtype)
    }

    /// `type & 0b11`
    pub fn package_bits(&self) -> u8 {
        self.0 & 0b11
    }

    pub fn package(&self) -> Result<PackageType, LubaError> {
        PackageType::try_from(self.package_bits())
    }

    /// `(type & 0b1111_1100) >> 2`
    pub fn subtype(&self) -> u8 {
        (self.0 & 0b1111_1100) >> 2
    }

    pub fn as_byte(&self) -> u8 {
        self.0
    }

    pub fn is_ack(&self) -> bool {
        self.package_bits() == PackageType::Control as u8 && self.subtype() == SUBTYPE_ACK
    }
}

impl fmt::Debug for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameType")
            .field("package", &self.package_bits())
            .field("subtype", &self.subtype())
            .finish()
    }
}

// ── FrameHeader ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    frame_type: FrameType,
    control: FrameControl,
    sequence: u8,
    length: u8,
}

impl FrameHeader {
    pub fn new(frame_type: FrameType, control: FrameControl, sequence: u8, length: u8) -> Self {
        Self {
            frame_type,
            control,
            sequence,
            length,
        }
    }

    pub fn to_bytes(&self) -> FrameHeaderBytes {
        [
            self.frame_type.as_byte(),
            self.control.bits(),
            self.sequence,
            self.length,
        ]
    }

    /// Parse the four header bytes at the front of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LubaError> {
        if bytes.len() < HEADER_LENGTH {
            return Err(LubaError::MalformedFrame { len: bytes.len() });
        }
        Ok(Self {
            frame_type: FrameType::from_byte(bytes[0]),
            control: FrameControl::from_bits_retain(bytes[1]),
            sequence: bytes[2],
            length: bytes[3],
        })
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn control(&self) -> FrameControl {
        self.control
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn length(&self) -> u8 {
        self.length
    }
}
