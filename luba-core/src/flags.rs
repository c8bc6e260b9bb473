//! Frame-control bitfield.
//!
//! The bit positions are fixed by the mower's BLE firmware and must not
//! be renumbered.

use bitflags::bitflags;

bitflags! {
    /// Per-frame control bits carried in header byte 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameControl: u8 {
        /// Payload is encrypted.
        const ENCRYPTED   = 0b0000_0001;
        /// A two-byte checksum trails the payload.
        const CHECKSUM    = 0b0000_0010;
        /// Set on frames travelling device → app.
        const DIRECTION   = 0b0000_0100;
        /// Sender waits for an ack carrying this frame's sequence.
        const REQUIRE_ACK = 0b0000_1000;
        /// More fragments of the same message follow.
        const FRAGMENT    = 0b0001_0000;
    }
}

impl FrameControl {
    /// Build the control byte for an outbound (app → device) frame.
    pub fn outbound(encrypt: bool, checksum: bool, require_ack: bool, has_fragment: bool) -> Self {
        let mut ctrl = FrameControl::empty();
        ctrl.set(FrameControl::ENCRYPTED, encrypt);
        ctrl.set(FrameControl::CHECKSUM, checksum);
        ctrl.set(FrameControl::REQUIRE_ACK, require_ack);
        ctrl.set(FrameControl::FRAGMENT, has_fragment);
        ctrl
    }

    pub fn is_encrypted(&self) -> bool {
        self.contains(FrameControl::ENCRYPTED)
    }

    pub fn has_checksum(&self) -> bool {
        self.contains(FrameControl::CHECKSUM)
    }

    pub fn requires_ack(&self) -> bool {
        self.contains(FrameControl::REQUIRE_ACK)
    }

    pub fn has_fragment(&self) -> bool {
        self.contains(FrameControl::FRAGMENT)
    }

    pub fn from_device(&self) -> bool {
        self.contains(FrameControl::DIRECTION)
    }
}
