//! Application-level message schema.
//!
//! A [`LubaMessage`] is the envelope carried inside data frames of
//! subtype 19. Its body is a sum type with one variant per message
//! category; each category is itself an enum. Every enum ends with an
//! `Unknown` variant so newer firmware can add messages without older
//! clients failing on them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LubaError;

/// Content hash identifying one piece of map geometry.
pub type ContentHash = i64;

// ── Envelope ─────────────────────────────────────────────────────

/// Which controller a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgCmdType {
    Nav,
    Sys,
    Esp,
    Driver,
    Media,
    Ota,
}

/// Endpoints on either side of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgDevice {
    MobileApp,
    MainCtl,
    CommEsp,
    LeftMotor,
    RightMotor,
    BaseStation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgAttr {
    None,
    Req,
    Resp,
    Report,
}

/// The application envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LubaMessage {
    pub msg_type: MsgCmdType,
    pub sender: MsgDevice,
    pub receiver: MsgDevice,
    pub attr: MsgAttr,
    pub seqs: i32,
    pub version: i32,
    pub subtype: i32,
    pub timestamp: u64,
    /// Kept last: an unrecognised variant decodes as `Unknown` and its
    /// payload is left as trailing bytes.
    pub body: LubaSubMessage,
}

impl LubaMessage {
    /// Envelope for a request from the app to the device.
    pub fn request(msg_type: MsgCmdType, receiver: MsgDevice, body: LubaSubMessage) -> Self {
        Self {
            msg_type,
            sender: MsgDevice::MobileApp,
            receiver,
            attr: MsgAttr::Req,
            seqs: 1,
            version: 1,
            subtype: 1,
            timestamp: 0,
            body,
        }
    }

    /// Name of the populated top-level variant, for logging.
    pub fn category(&self) -> &'static str {
        match &self.body {
            LubaSubMessage::Nav(_) => "nav",
            LubaSubMessage::Sys(_) => "sys",
            LubaSubMessage::Driver(_) => "driver",
            LubaSubMessage::Net(_) => "net",
            LubaSubMessage::Media(_) => "mul",
            LubaSubMessage::Ota(_) => "ota",
            LubaSubMessage::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LubaSubMessage {
    Nav(NavMessage),
    Sys(SysMessage),
    Driver(DriverMessage),
    Net(NetMessage),
    Media(MediaMessage),
    Ota(OtaMessage),
    #[serde(other)]
    Unknown,
}

// ── Navigation ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NavMessage {
    /// App → device: request (part of) the root hash list.
    GetHashList(NavGetHashList),
    /// Device → app: one frame of the root hash list.
    GetHashListAck(NavGetHashListAck),
    /// App → device: request geometry chunks for a hash.
    GetCommData(NavGetCommData),
    /// Device → app: one geometry chunk.
    GetCommDataAck(NavGetCommDataAck),
    /// App → device: request the area name list.
    GetAllAreaHashName(AppGetAllAreaHashName),
    /// Device → app: the full area name list.
    AllHashName(AppGetAllAreaHashName),
    #[serde(other)]
    Unknown,
}

/// Geometry categories carried by common-data messages.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathType {
    Area = 0,
    Obstacle = 1,
    Path = 2,
}

impl TryFrom<i32> for PathType {
    type Error = LubaError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PathType::Area),
            1 => Ok(PathType::Obstacle),
            2 => Ok(PathType::Path),
            _ => Err(LubaError::UnknownVariant {
                type_name: "PathType",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathType::Area => write!(f, "area"),
            PathType::Obstacle => write!(f, "obstacle"),
            PathType::Path => write!(f, "path"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavGetHashList {
    pub pver: i32,
    pub sub_cmd: i32,
    pub action: i32,
    pub path_type: i32,
    pub current_frame: i32,
    pub total_frame: i32,
    pub data_hash: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavGetHashListAck {
    pub pver: i32,
    pub sub_cmd: i32,
    pub total_frame: i32,
    pub current_frame: i32,
    pub data_hash: i64,
    pub hash_len: i32,
    /// Content hashes declared by this root frame.
    pub data_couple: Vec<ContentHash>,
    pub result: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavGetCommData {
    pub pver: i32,
    pub sub_cmd: i32,
    pub action: i32,
    pub path_type: i32,
    pub hash: ContentHash,
    pub total_frame: i32,
    pub current_frame: i32,
    pub data_hash: i64,
}

/// One geometry vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CommDataCouple {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavGetCommDataAck {
    pub pver: i32,
    pub sub_cmd: i32,
    pub result: i32,
    pub action: i32,
    /// Raw category; see [`NavGetCommDataAck::category`].
    pub path_type: i32,
    pub hash: ContentHash,
    pub paternal_hash_a: i64,
    pub paternal_hash_b: i64,
    pub total_frame: i32,
    pub current_frame: i32,
    pub data_hash: i64,
    pub data_len: i32,
    /// Vertices carried by this chunk.
    pub data_couple: Vec<CommDataCouple>,
    pub reserved: String,
}

impl NavGetCommDataAck {
    pub fn category(&self) -> Result<PathType, LubaError> {
        PathType::try_from(self.path_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AreaHashName {
    pub name: String,
    pub hash: ContentHash,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppGetAllAreaHashName {
    pub device_id: String,
    pub hashnames: Vec<AreaHashName>,
}

// ── System ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SysMessage {
    /// Raw status words pushed periodically by the main controller.
    UpdateBuf(Vec<i64>),
    ReportData(ReportData),
    MowInfo(MowInfo),
    /// Run-state words tunnelled from the task manager.
    TardStateTunnel(Vec<i64>),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    pub real_pos_x: i32,
    pub real_pos_y: i32,
    pub real_toward: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub battery_val: i32,
    pub charge_state: i32,
    pub sys_status: i32,
    pub work_progress: i32,
    pub work_area: i32,
    pub locations: Vec<LocationReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MowInfo {
    pub blade_status: bool,
    pub knife_height: i32,
    pub ultra_wave: i32,
    pub speed: f32,
}

// ── Driver / Network / Media / OTA ───────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverMessage {
    MotionControl { linear_speed: i32, angular_speed: i32 },
    SetKnifeHeight(i32),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiIotStatusReport {
    pub wifi_connected: bool,
    pub iot_connected: bool,
    pub product_key: String,
    pub device_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetMessage {
    /// Device → app: Wi-Fi/IoT link status.
    WifiIotStatus(WifiIotStatusReport),
    /// App → device: keep-alive / sync over BLE.
    BleSync { sync_type: i32 },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaMessage {
    SetVolume(i32),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OtaMessage {
    GetInfo { log_type: i32 },
    #[serde(other)]
    Unknown,
}
