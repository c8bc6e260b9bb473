//! Routes decoded messages into the device model.
//!
//! Listeners are plain closures registered per event. They run in
//! registration order on the notification path, after the model lock
//! has been released. A listener that fails or panics is logged and
//! the rest still run.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{PoisonError, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::error::LubaError;
use crate::message::{
    DriverMessage, LubaMessage, LubaSubMessage, MediaMessage, NavGetCommDataAck,
    NavGetHashListAck, NavMessage, NetMessage, OtaMessage, SysMessage,
};
use crate::state::device::{MowingDevice, SharedDevice};

type Listener<T> = Box<dyn Fn(&T) -> Result<(), LubaError> + Send + Sync + 'static>;
type ChangeListener = Box<dyn Fn() -> Result<(), LubaError> + Send + Sync + 'static>;

/// What a single dispatch did to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// A root hash list frame was merged.
    pub hash_ack: bool,
    /// A geometry chunk was accepted as new data.
    pub new_chunk: bool,
    /// The area name list was replaced.
    pub area_names: bool,
}

pub struct StateManager {
    device: SharedDevice,
    hash_ack_listeners: Vec<Listener<NavGetHashListAck>>,
    common_data_listeners: Vec<Listener<NavGetCommDataAck>>,
    change_listeners: Vec<ChangeListener>,
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("hash_ack_listeners", &self.hash_ack_listeners.len())
            .field("common_data_listeners", &self.common_data_listeners.len())
            .field("change_listeners", &self.change_listeners.len())
            .finish_non_exhaustive()
    }
}

impl StateManager {
    pub fn new(device: SharedDevice) -> Self {
        Self {
            device,
            hash_ack_listeners: Vec::new(),
            common_data_listeners: Vec::new(),
            change_listeners: Vec::new(),
        }
    }

    pub fn device(&self) -> SharedDevice {
        SharedDevice::clone(&self.device)
    }

    /// Called for every root hash list frame.
    pub fn on_hash_ack<F>(&mut self, f: F)
    where
        F: Fn(&NavGetHashListAck) -> Result<(), LubaError> + Send + Sync + 'static,
    {
        self.hash_ack_listeners.push(Box::new(f));
    }

    /// Called only for geometry chunks the map had not seen before.
    pub fn on_common_data<F>(&mut self, f: F)
    where
        F: Fn(&NavGetCommDataAck) -> Result<(), LubaError> + Send + Sync + 'static,
    {
        self.common_data_listeners.push(Box::new(f));
    }

    /// Called after every dispatched message.
    pub fn on_state_changed<F>(&mut self, f: F)
    where
        F: Fn() -> Result<(), LubaError> + Send + Sync + 'static,
    {
        self.change_listeners.push(Box::new(f));
    }

    /// Apply one message to the device model and notify listeners.
    pub fn notification(&self, message: &LubaMessage) -> Dispatch {
        let mut outcome = Dispatch::default();

        match &message.body {
            LubaSubMessage::Nav(nav) => self.update_nav(nav, &mut outcome),
            LubaSubMessage::Sys(sys) => self.update_sys(sys),
            LubaSubMessage::Net(net) => self.update_net(net),
            LubaSubMessage::Driver(DriverMessage::Unknown)
            | LubaSubMessage::Media(MediaMessage::Unknown)
            | LubaSubMessage::Ota(OtaMessage::Unknown)
            | LubaSubMessage::Unknown => {
                debug!(category = message.category(), "unhandled message variant");
            }
            // Commands echoed back by the device carry no state.
            LubaSubMessage::Driver(_) | LubaSubMessage::Media(_) | LubaSubMessage::Ota(_) => {}
        }

        for (index, listener) in self.change_listeners.iter().enumerate() {
            if let Err(e) = isolate(|| listener()) {
                warn!(listener = index, "state change listener failed: {e}");
            }
        }
        outcome
    }

    fn update_nav(&self, nav: &NavMessage, outcome: &mut Dispatch) {
        match nav {
            NavMessage::GetHashListAck(ack) => {
                self.write().map.update_root_hash_list(ack.clone());
                outcome.hash_ack = true;
                fan_out(&self.hash_ack_listeners, ack, "hash ack");
            }
            NavMessage::GetCommDataAck(chunk) => {
                let accepted = self.write().map.update(chunk.clone());
                if accepted {
                    outcome.new_chunk = true;
                    fan_out(&self.common_data_listeners, chunk, "common data");
                } else {
                    debug!(hash = chunk.hash, frame = chunk.current_frame, "duplicate chunk");
                }
            }
            NavMessage::AllHashName(names) => {
                self.write().map.set_area_names(names.hashnames.clone());
                outcome.area_names = true;
            }
            // Requests are app → device only.
            NavMessage::GetHashList(_)
            | NavMessage::GetCommData(_)
            | NavMessage::GetAllAreaHashName(_)
            | NavMessage::Unknown => {}
        }
    }

    fn update_sys(&self, sys: &SysMessage) {
        let mut device = self.write();
        match sys {
            SysMessage::UpdateBuf(buf) => device.update_buf = buf.clone(),
            SysMessage::ReportData(report) => device.report_data = report.clone(),
            SysMessage::MowInfo(info) => device.mow_info = info.clone(),
            SysMessage::TardStateTunnel(words) => device.run_state = words.clone(),
            SysMessage::Unknown => {}
        }
    }

    fn update_net(&self, net: &NetMessage) {
        if let NetMessage::WifiIotStatus(status) = net {
            self.write().wifi_iot = Some(status.clone());
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, MowingDevice> {
        // Poisoned by a panicking reader; the model itself is still usable.
        self.device.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn fan_out<T>(listeners: &[Listener<T>], value: &T, event: &'static str) {
    for (index, listener) in listeners.iter().enumerate() {
        if let Err(e) = isolate(|| listener(value)) {
            warn!(listener = index, event, "listener failed: {e}");
        }
    }
}

fn isolate(call: impl FnOnce() -> Result<(), LubaError>) -> Result<(), LubaError> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|_| Err(LubaError::Listener("listener panicked".into())))
}
