//! Builders for the outbound requests the map sync and keep-alive need.
//!
//! Every builder returns a ready envelope; posting is up to the caller
//! (see [`Poster::send_message`](crate::post::Poster::send_message)).

use tracing::debug;

use crate::message::{
    AppGetAllAreaHashName, ContentHash, LubaMessage, LubaSubMessage, MsgCmdType, MsgDevice,
    NavGetCommData, NavGetHashList, NavMessage, NetMessage, PathType,
};

/// Protocol version stamped on every navigation request.
const NAV_PVER: i32 = 1;
/// Action code for map data transfer requests.
const ACTION_SYNC: i32 = 8;

/// `sub_cmd` of a hash list request asking for the root list.
pub const SUB_CMD_ROOT: i32 = 0;
/// `sub_cmd` acknowledging a root frame and asking for another.
pub const SUB_CMD_ROOT_RESPONSE: i32 = 2;

/// `sync_type` sent when the device reports its Wi-Fi/IoT status.
pub const BLE_SYNC_AFTER_NET_STATUS: i32 = 2;

fn nav(message: NavMessage) -> LubaMessage {
    LubaMessage::request(
        MsgCmdType::Nav,
        MsgDevice::MainCtl,
        LubaSubMessage::Nav(message),
    )
}

/// Ask for the root hash list.
pub fn get_hash_list() -> LubaMessage {
    get_all_boundary_hash_list(SUB_CMD_ROOT)
}

pub fn get_all_boundary_hash_list(sub_cmd: i32) -> LubaMessage {
    debug!(sub_cmd, "building hash list request");
    nav(NavMessage::GetHashList(NavGetHashList {
        pver: NAV_PVER,
        sub_cmd,
        ..Default::default()
    }))
}

/// Request one root frame by index.
pub fn get_hash_response(total_frame: i32, current_frame: i32) -> LubaMessage {
    nav(NavMessage::GetHashList(NavGetHashList {
        pver: NAV_PVER,
        sub_cmd: SUB_CMD_ROOT_RESPONSE,
        current_frame,
        total_frame,
        ..Default::default()
    }))
}

/// Start the chunk transfer for one content hash.
pub fn synchronize_hash_data(hash: ContentHash) -> LubaMessage {
    nav(NavMessage::GetCommData(NavGetCommData {
        pver: NAV_PVER,
        sub_cmd: 1,
        action: ACTION_SYNC,
        hash,
        ..Default::default()
    }))
}

/// Request one chunk frame of one hash.
pub fn get_regional_data(
    category: PathType,
    hash: ContentHash,
    total_frame: i32,
    current_frame: i32,
) -> LubaMessage {
    nav(NavMessage::GetCommData(NavGetCommData {
        pver: NAV_PVER,
        sub_cmd: 2,
        action: ACTION_SYNC,
        path_type: category as i32,
        hash,
        total_frame,
        current_frame,
        ..Default::default()
    }))
}

pub fn get_area_name_list(device_id: &str) -> LubaMessage {
    nav(NavMessage::GetAllAreaHashName(AppGetAllAreaHashName {
        device_id: device_id.to_string(),
        hashnames: Vec::new(),
    }))
}

/// Keep-alive addressed to the comm module.
pub fn ble_sync(sync_type: i32) -> LubaMessage {
    LubaMessage::request(
        MsgCmdType::Esp,
        MsgDevice::CommEsp,
        LubaSubMessage::Net(NetMessage::BleSync { sync_type }),
    )
}
