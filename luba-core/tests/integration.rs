//! Integration tests: full sessions over the in-memory transport,
//! fragmentation in both directions, ack handling and map sync.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use luba_core::message::{
    CommDataCouple, MsgCmdType, MsgDevice, NavGetCommDataAck, NavGetHashListAck, NavMessage,
};
use luba_core::{
    BincodeCodec, BleSession, ChannelTransport, CommandSink, ConnectionPreference, DeviceEnd,
    DeviceManager, DeviceRegistry, Frame, FrameControl, FrameType, LubaError, LubaMessage,
    LubaSubMessage, MessageCodec, MowingDevice, NotificationStream, PathType, PostConfig, Poster,
    Reassembler, SUBTYPE_CUSTOM_DATA, Transport, commands, split_payload,
};
use tokio_test::{assert_err, assert_ok};

// ── Helpers ──────────────────────────────────────────────────────

fn new_session(config: PostConfig) -> (BleSession, DeviceEnd) {
    let (transport, device) = ChannelTransport::pair(64);
    let session = BleSession::new(
        "Luba-VSLK4HMK",
        Arc::new(transport),
        Arc::new(BincodeCodec),
        MowingDevice::new().shared(),
        config,
    );
    (session, device)
}

fn report(body: NavMessage) -> LubaMessage {
    LubaMessage::request(MsgCmdType::Nav, MsgDevice::MobileApp, LubaSubMessage::Nav(body))
}

/// Frames the device would send for one application message.
fn device_frames(message: &LubaMessage, first_seq: u8) -> Vec<Frame> {
    let data = BincodeCodec.encode(message).unwrap();
    split_payload(&data, 253)
        .unwrap()
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut control = FrameControl::DIRECTION;
            if chunk.has_fragment {
                control |= FrameControl::FRAGMENT;
            }
            Frame::new(
                FrameType::data(SUBTYPE_CUSTOM_DATA),
                control,
                first_seq.wrapping_add(i as u8),
                chunk.payload,
            )
            .unwrap()
        })
        .collect()
}

fn area_chunk(hash: i64, points: usize) -> NavGetCommDataAck {
    NavGetCommDataAck {
        path_type: PathType::Area as i32,
        hash,
        total_frame: 1,
        current_frame: 1,
        data_couple: (0..points)
            .map(|i| CommDataCouple {
                x: i as f32,
                y: -(i as f32),
            })
            .collect(),
        ..Default::default()
    }
}

/// Read frames written by the app until one closes a message.
async fn recv_message(device: &mut DeviceEnd) -> (Vec<Frame>, LubaMessage) {
    let mut reassembler = Reassembler::new();
    let mut frames = Vec::new();
    loop {
        let frame = device.recv_frame().await.unwrap().unwrap();
        let done = reassembler.push_frame(&frame).unwrap();
        frames.push(frame);
        if let Some(complete) = done {
            return (frames, BincodeCodec.decode(&complete.data).unwrap());
        }
    }
}

// ── Map reconciliation end to end ────────────────────────────────

#[tokio::test]
async fn root_then_area_chunk_completes_map() {
    let (mut session, device) = new_session(PostConfig::default());
    let stream = assert_ok!(session.connect());

    let root = report(NavMessage::GetHashListAck(NavGetHashListAck {
        total_frame: 1,
        current_frame: 1,
        data_couple: vec![42],
        ..Default::default()
    }));
    let chunk = area_chunk(42, 4);

    let mut seq = 0u8;
    for message in [root, report(NavMessage::GetCommDataAck(chunk.clone()))] {
        for frame in device_frames(&message, seq) {
            seq = seq.wrapping_add(1);
            assert_ok!(device.notify_frame(&frame).await);
        }
    }
    device.disconnect();

    let stats = session.run(stream).await;
    assert_eq!(stats.messages, 2);
    assert_eq!(session.anomalies(), 0);

    let model = session.device();
    let model = model.read().unwrap();
    assert!(model.map.missing_hashlist().is_empty());
    assert_eq!(model.map.area[&42].data[0].data_couple, chunk.data_couple);
    assert_eq!(model.map.area_label(42), Some("area 1"));
    assert!(model.map.is_synced());
}

#[tokio::test]
async fn fragmented_chunk_is_reassembled() {
    let (mut session, device) = new_session(PostConfig::default());
    let stream = assert_ok!(session.connect());

    let chunk = area_chunk(7, 120);
    let frames = device_frames(&report(NavMessage::GetCommDataAck(chunk.clone())), 0);
    assert!(frames.len() > 1);
    assert!(frames[..frames.len() - 1].iter().all(|f| f.control().has_fragment()));

    for frame in &frames {
        assert_ok!(device.notify_frame(frame).await);
    }
    device.disconnect();

    let stats = session.run(stream).await;
    assert_eq!(stats.frames, frames.len() as u64);
    assert_eq!(stats.messages, 1);
    assert_eq!(
        session.device().read().unwrap().map.area[&7].points(),
        chunk.data_couple
    );
}

#[tokio::test]
async fn listeners_fire_for_new_chunks_only() {
    let (mut session, _device) = new_session(PostConfig::default());
    let seen = Arc::new(AtomicUsize::new(0));
    let changes = Arc::new(AtomicUsize::new(0));
    {
        let seen = Arc::clone(&seen);
        session.state_mut().on_common_data(move |chunk| {
            assert_eq!(chunk.hash, 3);
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let changes = Arc::clone(&changes);
        session.state_mut().on_state_changed(move || {
            changes.fetch_add(1, Ordering::SeqCst);
            Err(LubaError::Listener("ui gone".into()))
        });
    }

    let message = report(NavMessage::GetCommDataAck(area_chunk(3, 2)));
    for seq in 0..2u8 {
        for frame in device_frames(&message, seq) {
            assert_ok!(session.handle_frame(&frame));
        }
    }

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(changes.load(Ordering::SeqCst), 2);
}

// ── Inbound robustness ───────────────────────────────────────────

#[tokio::test]
async fn sequence_gap_is_soft() {
    let (mut session, _device) = new_session(PostConfig::default());
    let message = report(NavMessage::GetCommDataAck(area_chunk(1, 1)));

    let first = device_frames(&message, 0);
    let skipped = device_frames(&report(NavMessage::GetCommDataAck(area_chunk(2, 1))), 9);

    assert_ok!(session.handle_notification(&first[0].to_bytes()));
    let decoded = assert_ok!(session.handle_notification(&skipped[0].to_bytes()));
    assert!(decoded.is_some());
    assert_eq!(session.anomalies(), 1);
    assert_eq!(session.device().read().unwrap().map.area.len(), 2);
}

#[tokio::test]
async fn truncated_frame_dropped_and_session_continues() {
    let (mut session, _device) = new_session(PostConfig::default());

    // Header claims 10 bytes, 2 present.
    let err = assert_err!(session.handle_notification(&[0x4D, 0x04, 0x00, 0x0A, 1, 2]));
    assert!(err.is_frame_error());

    let frames = device_frames(&report(NavMessage::GetCommDataAck(area_chunk(5, 1))), 0);
    assert!(assert_ok!(session.handle_frame(&frames[0])).is_some());
    assert_eq!(session.stats().dropped_frames, 1);
}

#[tokio::test]
async fn disconnect_mid_reassembly_discards_partial() {
    let (mut session, device) = new_session(PostConfig::default());
    let stream = assert_ok!(session.connect());

    let frames = device_frames(&report(NavMessage::GetCommDataAck(area_chunk(8, 120))), 0);
    assert_ok!(device.notify_frame(&frames[0]).await);
    device.disconnect();
    session.run(stream).await;
    assert!(session.phase().is_disconnected());

    // A fresh single-frame message after the drop decodes on its own.
    let fresh = device_frames(&report(NavMessage::GetCommDataAck(area_chunk(9, 1))), 0);
    assert!(assert_ok!(session.handle_frame(&fresh[0])).is_some());

    let model = session.device();
    let model = model.read().unwrap();
    assert!(!model.map.area.contains_key(&8));
    assert!(model.map.area.contains_key(&9));
}

// ── Outbound ─────────────────────────────────────────────────────

#[tokio::test]
async fn large_send_is_fragmented_in_order() {
    let (session, mut device) = new_session(PostConfig::default());
    let message = report(NavMessage::GetCommDataAck(area_chunk(11, 120)));

    assert_ok!(session.send(&message).await);
    let (frames, echoed) = recv_message(&mut device).await;

    assert!(frames.len() > 1);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.sequence(), i as u8);
        assert!(frame.payload().len() <= 255);
        assert!(!frame.control().from_device());
        assert_eq!(frame.control().has_fragment(), i + 1 < frames.len());
    }
    assert_eq!(echoed, message);
}

#[tokio::test]
async fn ack_round_trip_through_session() {
    let config = PostConfig {
        require_ack: true,
        ack_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let (mut session, mut device) = new_session(config);
    let link = session.link();
    let stream = assert_ok!(session.connect());
    let notifier = device.notifier();
    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();

    // Device acknowledges every frame it receives until told to stop.
    let device_task = tokio::spawn(async move {
        let mut seq = 0u8;
        let mut received = 0;
        loop {
            tokio::select! {
                frame = device.recv_frame() => {
                    let Some(Ok(frame)) = frame else { break };
                    let ack = Frame::new(
                        FrameType::control(0),
                        FrameControl::DIRECTION,
                        seq,
                        vec![frame.sequence()],
                    )
                    .unwrap();
                    seq = seq.wrapping_add(1);
                    notifier.send(ack.to_bytes()).await.unwrap();
                    received += 1;
                }
                _ = &mut stop_rx => break,
            }
        }
        received
    });
    let session_task = tokio::spawn(async move { session.run(stream).await });

    let message = report(NavMessage::GetCommDataAck(area_chunk(12, 120)));
    assert_ok!(link.send_command(&message).await);
    assert_ok!(link.send_command(&commands::get_hash_list()).await);

    // Every frame was acked; dropping the device end ends the session.
    stop_tx.send(()).unwrap();
    let received = device_task.await.unwrap();
    assert!(received > 2);
    let stats = session_task.await.unwrap();
    assert_eq!(stats.acks, received as u64);
}

#[tokio::test]
async fn ack_timeout_fails_post() {
    let config = PostConfig {
        ack_timeout: Duration::from_millis(20),
        ..Default::default()
    };
    let (transport, mut device) = ChannelTransport::pair(8);
    let poster = Poster::new(Arc::new(transport), config);

    let err = assert_err!(
        poster
            .post(false, false, true, FrameType::data(SUBTYPE_CUSTOM_DATA), b"ping")
            .await
    );
    assert!(matches!(err, LubaError::AckTimeout(_)));
    assert!(device.recv_frame().await.is_some());
}

#[tokio::test]
async fn ack_mismatch_fails_post() {
    let (transport, mut device) = ChannelTransport::pair(8);
    let poster = Poster::new(Arc::new(transport), PostConfig::default());
    let acks = poster.ack_sender();

    tokio::spawn(async move {
        let frame = device.recv_frame().await.unwrap().unwrap();
        acks.push(frame.sequence() as u16 + 1);
        // Keep the device end alive until the post resolves.
        device.recv_written().await;
    });

    let err = assert_err!(
        poster
            .post(false, false, true, FrameType::data(SUBTYPE_CUSTOM_DATA), b"ping")
            .await
    );
    assert!(matches!(
        err,
        LubaError::AckMismatch {
            expected: 0,
            received: 1
        }
    ));
}

/// Accepts `healthy` writes, then fails every write after that.
struct FlakyTransport {
    healthy: usize,
    writes: AtomicUsize,
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn write(&self, _data: Bytes) -> Result<(), LubaError> {
        if self.writes.fetch_add(1, Ordering::SeqCst) < self.healthy {
            Ok(())
        } else {
            Err(LubaError::TransportWrite("gatt error 0x85".into()))
        }
    }

    fn subscribe(&self) -> Result<NotificationStream, LubaError> {
        Err(LubaError::Disconnected)
    }
}

#[tokio::test]
async fn failed_write_aborts_post() {
    let transport = Arc::new(FlakyTransport {
        healthy: 1,
        writes: AtomicUsize::new(0),
    });
    let poster = Poster::new(transport.clone(), PostConfig::default());

    let data = vec![0xAB; 600];
    let err = assert_err!(
        poster
            .post(false, false, false, FrameType::data(SUBTYPE_CUSTOM_DATA), &data)
            .await
    );
    assert!(matches!(err, LubaError::TransportWrite(_)));
    // Aborted after the second of three fragments.
    assert_eq!(transport.writes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn connect_failure_leaves_session_disconnected() {
    let transport = Arc::new(FlakyTransport {
        healthy: 0,
        writes: AtomicUsize::new(0),
    });
    let mut session = BleSession::new(
        "Luba-DOWN",
        transport,
        Arc::new(BincodeCodec),
        MowingDevice::new().shared(),
        PostConfig::default(),
    );
    let err = assert_err!(session.serve().await);
    assert!(matches!(err, LubaError::Disconnected));
    assert!(session.phase().is_disconnected());
}

// ── Registry ─────────────────────────────────────────────────────

#[tokio::test]
async fn registry_map_sync_over_ble() {
    let (session, mut device) = new_session(PostConfig::default());

    let mut registry = DeviceRegistry::new();
    registry.add_device(
        DeviceManager::new(session.name(), ConnectionPreference::Either)
            .with_device(session.device())
            .with_ble(Arc::new(session.link())),
    );
    session.device().write().unwrap().map.update_root_hash_list(NavGetHashListAck {
        total_frame: 1,
        current_frame: 1,
        data_couple: vec![100, 200],
        ..Default::default()
    });

    let sent = assert_ok!(registry.start_map_sync(session.name()).await);
    assert_eq!(sent, 3);

    let (_, first) = recv_message(&mut device).await;
    let (_, second) = recv_message(&mut device).await;
    let (_, names) = recv_message(&mut device).await;
    assert_eq!(first, commands::synchronize_hash_data(100));
    assert_eq!(second, commands::synchronize_hash_data(200));
    assert_eq!(names, commands::get_area_name_list(session.name()));
}
