//! Registry of known mowers and their links.
//!
//! A device can be reachable over BLE, over the cloud broker, or both.
//! The registry is built by the application entry point and passed to
//! whoever needs it; nothing here is global.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::commands;
use crate::error::LubaError;
use crate::map_sync::MapSyncPlanner;
use crate::message::LubaMessage;
use crate::state::{MowingDevice, SharedDevice};

/// Anything that can deliver a command to a device.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send_command(&self, message: &LubaMessage) -> Result<(), LubaError>;
}

/// A sink that queues commands on an mpsc channel.
///
/// Stands in for the cloud broker link, which lives outside this crate.
#[derive(Debug, Clone)]
pub struct QueueSink {
    tx: mpsc::Sender<LubaMessage>,
}

impl QueueSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LubaMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CommandSink for QueueSink {
    async fn send_command(&self, message: &LubaMessage) -> Result<(), LubaError> {
        self.tx.send(message.clone()).await?;
        Ok(())
    }
}

/// Which link commands should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPreference {
    /// BLE when available, otherwise cloud.
    Either,
    Wifi,
    #[default]
    Bluetooth,
}

/// One mower and the links that reach it.
pub struct DeviceManager {
    name: String,
    preference: ConnectionPreference,
    ble: Option<Arc<dyn CommandSink>>,
    cloud: Option<Arc<dyn CommandSink>>,
    device: SharedDevice,
    planner: MapSyncPlanner,
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("name", &self.name)
            .field("preference", &self.preference)
            .field("ble", &self.ble.is_some())
            .field("cloud", &self.cloud.is_some())
            .finish_non_exhaustive()
    }
}

impl DeviceManager {
    pub fn new(name: impl Into<String>, preference: ConnectionPreference) -> Self {
        Self {
            name: name.into(),
            preference,
            ble: None,
            cloud: None,
            device: MowingDevice::new().shared(),
            planner: MapSyncPlanner::new(),
        }
    }

    pub fn with_ble(mut self, sink: Arc<dyn CommandSink>) -> Self {
        self.ble = Some(sink);
        self
    }

    pub fn with_cloud(mut self, sink: Arc<dyn CommandSink>) -> Self {
        self.cloud = Some(sink);
        self
    }

    /// Share an existing device model, e.g. the one a session dispatches into.
    pub fn with_device(mut self, device: SharedDevice) -> Self {
        self.device = device;
        self
    }

    pub fn with_planner(mut self, planner: MapSyncPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn preference(&self) -> ConnectionPreference {
        self.preference
    }

    pub fn set_preference(&mut self, preference: ConnectionPreference) {
        self.preference = preference;
    }

    pub fn has_ble(&self) -> bool {
        self.ble.is_some()
    }

    pub fn has_cloud(&self) -> bool {
        self.cloud.is_some()
    }

    pub fn device(&self) -> SharedDevice {
        SharedDevice::clone(&self.device)
    }

    /// The sink commands go to under the current preference.
    pub fn route(&self) -> Result<Arc<dyn CommandSink>, LubaError> {
        let sink = match self.preference {
            ConnectionPreference::Bluetooth => self.ble.as_ref(),
            ConnectionPreference::Wifi => self.cloud.as_ref(),
            ConnectionPreference::Either => self.ble.as_ref().or(self.cloud.as_ref()),
        };
        sink.cloned()
            .ok_or_else(|| LubaError::NoRoute(self.name.clone()))
    }

    pub async fn send_command(&self, message: &LubaMessage) -> Result<(), LubaError> {
        let sink = self.route()?;
        debug!(device = %self.name, category = message.category(), "routing command");
        sink.send_command(message).await
    }

    /// Request everything the map cache is missing, plus the area names.
    ///
    /// Returns the number of requests sent.
    pub async fn start_map_sync(&self) -> Result<usize, LubaError> {
        let requests = {
            let device = self.device.read().unwrap_or_else(PoisonError::into_inner);
            self.planner.next_requests(&device.map)
        };

        let sink = self.route()?;
        for request in &requests {
            sink.send_command(request).await?;
        }
        sink.send_command(&commands::get_area_name_list(&self.name))
            .await?;

        info!(device = %self.name, requests = requests.len() + 1, "map sync requested");
        Ok(requests.len() + 1)
    }

    // Links present on `other` replace ours; absent ones leave ours alone.
    fn merge(&mut self, other: DeviceManager) {
        if let Some(cloud) = other.cloud {
            self.cloud = Some(cloud);
        }
        if let Some(ble) = other.ble {
            self.ble = Some(ble);
        }
    }
}

/// All devices known to the application, keyed by name.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceManager>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a device, or merge its links into the existing entry of
    /// the same name. The existing entry keeps its device model and
    /// preference.
    pub fn add_device(&mut self, manager: DeviceManager) {
        match self.devices.get_mut(&manager.name) {
            Some(existing) => {
                debug!(device = %manager.name, "merging links into existing device");
                existing.merge(manager);
            }
            None => {
                info!(device = %manager.name, "device registered");
                self.devices.insert(manager.name.clone(), manager);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&DeviceManager> {
        self.devices.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DeviceManager> {
        self.devices.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<DeviceManager> {
        let removed = self.devices.remove(name);
        if removed.is_some() {
            info!(device = %name, "device removed");
        }
        removed
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub async fn send_command(&self, name: &str, message: &LubaMessage) -> Result<(), LubaError> {
        self.lookup(name)?.send_command(message).await
    }

    pub async fn start_map_sync(&self, name: &str) -> Result<usize, LubaError> {
        self.lookup(name)?.start_map_sync().await
    }

    fn lookup(&self, name: &str) -> Result<&DeviceManager, LubaError> {
        self.devices
            .get(name)
            .ok_or_else(|| LubaError::DeviceNotFound(name.to_string()))
    }
}
