//! # luba-replay
//!
//! Replays a captured BLE notification stream through the Luba protocol
//! core and reports how far the map reconciliation got.
//!
//! Captures are either raw concatenated frames or one hex-encoded
//! notification per line. A previously saved map cache can seed the
//! replay, and the resulting cache can be saved for the next run.

pub mod config;
pub mod replay;
