//! # luba-core
//!
//! Client-side protocol core for Luba robotic mowers over BLE.
//!
//! This crate contains:
//! - **Framing**: `FrameHeader`, `Frame`, `FrameControl`, fragment splitting
//! - **Codec**: `FrameCodec` for notification decoding and `tokio_util` framing;
//!   `MessageCodec` / `BincodeCodec` for the application envelope
//! - **Link**: `SequenceCounter`, `AckTracker`, the `Poster` outbound pipeline,
//!   the `Reassembler` and the `Transport` seam
//! - **Map**: `HashList` reconciliation engine and `MapSyncPlanner`
//! - **State**: `ConnectionPhase`, `MowingDevice`, the `StateManager` dispatcher
//! - **Session / Registry**: `BleSession`, `BleLink`, `DeviceRegistry`
//! - **Error**: `LubaError`, a `thiserror`-based error hierarchy

pub mod codec;
pub mod commands;
pub mod error;
pub mod flags;
pub mod frame;
pub mod hash_list;
pub mod header;
pub mod map_sync;
pub mod message;
pub mod post;
pub mod reassembly;
pub mod registry;
pub mod sequence;
pub mod session;
pub mod state;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{BincodeCodec, FrameCodec, MessageCodec};
pub use error::LubaError;
pub use flags::FrameControl;
pub use frame::{FragmentChunk, Frame, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, split_payload};
pub use hash_list::{FrameList, HashList, RootHashList};
pub use header::{FrameHeader, FrameType, HEADER_LENGTH, PackageType, SUBTYPE_CUSTOM_DATA};
pub use map_sync::{MapSyncPlanner, SyncRequest};
pub use message::{ContentHash, LubaMessage, LubaSubMessage, PathType};
pub use post::{PostConfig, Poster};
pub use reassembly::{CompleteMessage, Reassembler};
pub use registry::{CommandSink, ConnectionPreference, DeviceManager, DeviceRegistry, QueueSink};
pub use sequence::{AckSender, AckTracker, SequenceCounter};
pub use session::{BleLink, BleSession, SessionStats};
pub use state::{ConnectionPhase, Dispatch, MowingDevice, SharedDevice, StateManager};
pub use transport::{ChannelTransport, DeviceEnd, NotificationStream, Transport};
