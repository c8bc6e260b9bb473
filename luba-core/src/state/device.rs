//! The device model: what the app knows about one mower.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::hash_list::HashList;
use crate::message::{MowInfo, ReportData, WifiIotStatusReport};

/// Shared handle to a device model.
///
/// Writers are the dispatcher on the notification path; readers are
/// listeners, the map sync planner and the registry.
pub type SharedDevice = Arc<RwLock<MowingDevice>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MowingDevice {
    pub map: HashList,
    pub report_data: ReportData,
    pub mow_info: MowInfo,
    /// Last raw status buffer from the main controller.
    pub update_buf: Vec<i64>,
    /// Last run-state tunnel words.
    pub run_state: Vec<i64>,
    pub wifi_iot: Option<WifiIotStatusReport>,
}

impl MowingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedDevice {
        Arc::new(RwLock::new(self))
    }

    /// Battery percentage from the latest report.
    pub fn battery(&self) -> i32 {
        self.report_data.battery_val
    }
}
