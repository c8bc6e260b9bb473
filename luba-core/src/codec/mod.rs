//! Byte-level codecs.
//!
//! - [`FrameCodec`] turns notification buffers into [`Frame`]s and back,
//!   tracking the read sequence as it goes.
//! - [`MessageCodec`] turns reassembled application bytes into
//!   [`LubaMessage`]s and back.
//!
//! [`Frame`]: crate::frame::Frame
//! [`LubaMessage`]: crate::message::LubaMessage

pub mod frame;
pub mod message;

pub use frame::FrameCodec;
pub use message::{BincodeCodec, MessageCodec};
