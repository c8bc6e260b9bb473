pub mod connection;
pub mod device;
pub mod dispatcher;

pub use connection::ConnectionPhase;
pub use device::{MowingDevice, SharedDevice};
pub use dispatcher::{Dispatch, StateManager};
