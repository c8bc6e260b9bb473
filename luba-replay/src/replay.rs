//! Feeds a captured notification stream through a [`BleSession`].
//!
//! The capture plays the device side of an in-memory transport; the
//! session on the other side decodes, reassembles and dispatches
//! exactly as it would on a live link.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use luba_core::{
    BincodeCodec, BleSession, ChannelTransport, DeviceEnd, FrameCodec, HashList, LubaError,
    MapSyncPlanner, MowingDevice, SessionStats, SyncRequest,
};
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use crate::config::ReplayConfig;

/// How the capture file is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    /// Frames back to back, exactly as they came off the wire.
    Raw,
    /// One notification per line, hex encoded. Blank lines and lines
    /// starting with `#` are skipped.
    Hex,
}

/// What the replay left behind.
#[derive(Debug, Clone)]
pub struct ReplaySummary {
    pub stats: SessionStats,
    pub anomalies: u64,
    pub fed: usize,
    pub map: HashList,
    pub plan: Vec<SyncRequest>,
}

impl fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "notifications fed:   {}", self.fed)?;
        writeln!(
            f,
            "frames:              {} ({} dropped, {} acks)",
            self.stats.frames, self.stats.dropped_frames, self.stats.acks
        )?;
        writeln!(
            f,
            "messages:            {} ({} undecodable)",
            self.stats.messages, self.stats.decode_errors
        )?;
        writeln!(f, "sequence anomalies:  {}", self.anomalies)?;
        writeln!(f, "declared hashes:     {}", self.map.hashlist().len())?;
        writeln!(
            f,
            "geometry:            {} area, {} obstacle, {} path",
            self.map.area.len(),
            self.map.obstacle.len(),
            self.map.path.len()
        )?;
        writeln!(f, "missing root frames: {:?}", self.map.missing_hash_frame())?;
        writeln!(f, "missing hashes:      {:?}", self.map.missing_hashlist())?;
        writeln!(f, "synced:              {}", self.map.is_synced())?;
        if !self.plan.is_empty() {
            writeln!(f, "planned requests:")?;
            for request in &self.plan {
                writeln!(f, "  {request}")?;
            }
        }
        Ok(())
    }
}

/// Replay `capture` starting from `warm` (or an empty map).
pub async fn replay<R>(
    capture: R,
    format: CaptureFormat,
    config: &ReplayConfig,
    warm: Option<HashList>,
) -> Result<ReplaySummary, LubaError>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (transport, device) = ChannelTransport::pair(config.link.queue_depth.max(1));
    let model = MowingDevice {
        map: warm.unwrap_or_default(),
        ..Default::default()
    };

    let mut session = BleSession::new(
        config.map.device_name.clone(),
        Arc::new(transport),
        Arc::new(BincodeCodec),
        model.shared(),
        config.to_post_config(),
    );
    session.state_mut().on_common_data(|chunk| {
        info!(
            hash = chunk.hash,
            frame = chunk.current_frame,
            of = chunk.total_frame,
            "geometry chunk"
        );
        Ok(())
    });

    let stream = session.connect()?;
    let feeder = tokio::spawn(feed(capture, format, device));
    let stats = session.run(stream).await;

    let fed = feeder
        .await
        .map_err(|e| LubaError::Other(format!("capture reader panicked: {e}")))??;

    let device = session.device();
    let map = device
        .read()
        .map_err(|_| LubaError::Other("device model lock poisoned".into()))?
        .map
        .clone();

    let planner = match config.max_requests() {
        Some(n) => MapSyncPlanner::with_limit(n),
        None => MapSyncPlanner::new(),
    };
    let plan = planner.plan(&map);

    Ok(ReplaySummary {
        stats,
        anomalies: session.anomalies(),
        fed,
        map,
        plan,
    })
}

// Push every notification in the capture, then drop the device end so
// the session's stream ends.
async fn feed<R>(capture: R, format: CaptureFormat, device: DeviceEnd) -> Result<usize, LubaError>
where
    R: AsyncRead + Unpin,
{
    let mut fed = 0;
    match format {
        CaptureFormat::Raw => {
            let mut frames = FramedRead::new(capture, FrameCodec::new());
            while let Some(frame) = frames.next().await {
                device.notify_frame(&frame?).await?;
                fed += 1;
            }
        }
        CaptureFormat::Hex => {
            let mut lines = FramedRead::new(capture, LinesCodec::new());
            while let Some(line) = lines.next().await {
                let line = line.map_err(|e| LubaError::Other(e.to_string()))?;
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                match hex::decode(line) {
                    Ok(buf) => {
                        device.notify(buf).await?;
                        fed += 1;
                    }
                    Err(e) => warn!("skipping capture line: {e}"),
                }
            }
        }
    }
    debug!(fed, "capture exhausted");
    device.disconnect();
    Ok(fed)
}
