//! Hash-indexed cache of the mower's map geometry.
//!
//! The device describes its persisted map in two levels:
//!
//! ```text
//! RootHashList ─┬─ frame 1: [h1, h2, h3]
//!               └─ frame 2: [h4]
//!
//! h1 ──► FrameList { total_frame: 3, [chunk 1, chunk 2, chunk 3] }
//! h2 ──► FrameList { total_frame: 1, [chunk 1] }
//! ...
//! ```
//!
//! The root enumerates which content hashes are currently valid; every
//! hash then needs all of its chunk frames collected. [`HashList`]
//! tracks what has arrived, computes what is still missing, and drops
//! geometry the device no longer declares. The device is the only
//! source of truth, so pruning runs on every root update.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LubaError;
use crate::message::{
    AreaHashName, CommDataCouple, ContentHash, NavGetCommDataAck, NavGetHashListAck, PathType,
};

// ── FrameList / RootHashList ─────────────────────────────────────

/// Chunks collected for one content hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameList {
    pub total_frame: i32,
    pub data: Vec<NavGetCommDataAck>,
}

impl FrameList {
    /// Frame indices in `1..=total_frame` not yet received.
    pub fn missing_frames(&self) -> Vec<i32> {
        find_missing_frames(self.total_frame, self.data.iter().map(|c| c.current_frame))
    }

    pub fn is_complete(&self) -> bool {
        self.missing_frames().is_empty()
    }

    /// Vertices of all received chunks, in frame order.
    pub fn points(&self) -> Vec<CommDataCouple> {
        let mut chunks: Vec<&NavGetCommDataAck> = self.data.iter().collect();
        chunks.sort_by_key(|c| c.current_frame);
        chunks
            .into_iter()
            .flat_map(|c| c.data_couple.iter().copied())
            .collect()
    }
}

/// The device's inventory of valid content hashes, one entry per
/// transfer frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootHashList {
    pub total_frame: i32,
    pub data: Vec<NavGetHashListAck>,
}

impl RootHashList {
    pub fn missing_frames(&self) -> Vec<i32> {
        find_missing_frames(self.total_frame, self.data.iter().map(|a| a.current_frame))
    }
}

fn find_missing_frames(total_frame: i32, present: impl Iterator<Item = i32>) -> Vec<i32> {
    let present: BTreeSet<i32> = present.collect();
    (1..=total_frame).filter(|n| !present.contains(n)).collect()
}

// ── HashList ─────────────────────────────────────────────────────

/// The reconciled map cache.
///
/// Invariant: once a root frame has arrived, every key of `area`,
/// `obstacle` and `path` is declared by the current `root_hash_list`.
/// Before that, chunks are cached as they come and the first root
/// update prunes whatever it does not declare.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashList {
    pub root_hash_list: RootHashList,
    pub area: BTreeMap<ContentHash, FrameList>,
    pub path: BTreeMap<ContentHash, FrameList>,
    pub obstacle: BTreeMap<ContentHash, FrameList>,
    pub area_name: Vec<AreaHashName>,
}

impl HashList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one root frame and prune geometry no longer declared.
    ///
    /// A frame whose `current_frame` was seen before replaces the old
    /// entry, so redelivery is idempotent.
    pub fn update_root_hash_list(&mut self, ack: NavGetHashListAck) {
        self.root_hash_list.total_frame = ack.total_frame;

        match self
            .root_hash_list
            .data
            .iter_mut()
            .find(|entry| entry.current_frame == ack.current_frame)
        {
            Some(entry) => *entry = ack,
            None => self.root_hash_list.data.push(ack),
        }

        self.prune();
    }

    /// Accept one geometry chunk.
    ///
    /// Returns `false` when the chunk was already present, its category
    /// is unknown, or a root is known and does not declare its hash, so
    /// callers can skip redundant change notifications.
    pub fn update(&mut self, chunk: NavGetCommDataAck) -> bool {
        let Ok(category) = chunk.category() else {
            debug!(path_type = chunk.path_type, "ignoring chunk with unknown category");
            return false;
        };
        if !self.is_declared(chunk.hash) {
            debug!(hash = chunk.hash, "ignoring chunk for undeclared hash");
            return false;
        }

        if category == PathType::Area && !self.area_name.iter().any(|n| n.hash == chunk.hash) {
            let name = format!("area {}", self.area_name.len() + 1);
            self.area_name.push(AreaHashName {
                name,
                hash: chunk.hash,
            });
        }

        let frames = self.category_mut(category);
        match frames.get_mut(&chunk.hash) {
            None => {
                frames.insert(
                    chunk.hash,
                    FrameList {
                        total_frame: chunk.total_frame,
                        data: vec![chunk],
                    },
                );
                true
            }
            Some(list) if list.data.contains(&chunk) => false,
            Some(list) => {
                list.data.push(chunk);
                true
            }
        }
    }

    /// Root transfer frames not yet received.
    pub fn missing_hash_frame(&self) -> Vec<i32> {
        self.root_hash_list.missing_frames()
    }

    /// Chunk frames not yet received for one hash.
    ///
    /// Empty when nothing at all has arrived for the hash; use
    /// [`missing_hashlist`](Self::missing_hashlist) to find those.
    pub fn missing_frame(&self, category: PathType, hash: ContentHash) -> Vec<i32> {
        self.category(category)
            .get(&hash)
            .map(FrameList::missing_frames)
            .unwrap_or_default()
    }

    /// Every hash declared by the current root, in root order.
    pub fn hashlist(&self) -> Vec<ContentHash> {
        self.root_hash_list
            .data
            .iter()
            .flat_map(|entry| entry.data_couple.iter().copied())
            .collect()
    }

    /// Whether `hash` may be cached. Everything is accepted until the
    /// first root frame arrives.
    pub fn is_declared(&self, hash: ContentHash) -> bool {
        self.root_hash_list.total_frame == 0
            || self
                .root_hash_list
                .data
                .iter()
                .any(|entry| entry.data_couple.contains(&hash))
    }

    /// Declared hashes with no chunk received in any category.
    pub fn missing_hashlist(&self) -> Vec<ContentHash> {
        self.hashlist()
            .into_iter()
            .filter(|h| {
                !self.area.contains_key(h)
                    && !self.path.contains_key(h)
                    && !self.obstacle.contains_key(h)
            })
            .collect()
    }

    /// Hashes that have some chunks but not all of them.
    pub fn incomplete(&self) -> Vec<(PathType, ContentHash, Vec<i32>)> {
        [PathType::Area, PathType::Obstacle, PathType::Path]
            .into_iter()
            .flat_map(|category| {
                self.category(category)
                    .iter()
                    .filter_map(move |(hash, list)| {
                        let missing = list.missing_frames();
                        (!missing.is_empty()).then_some((category, *hash, missing))
                    })
            })
            .collect()
    }

    /// Whether every declared hash is fully collected.
    pub fn is_synced(&self) -> bool {
        self.root_hash_list.total_frame > 0
            && self.missing_hash_frame().is_empty()
            && self.missing_hashlist().is_empty()
            && self.incomplete().is_empty()
    }

    /// Replace the area labels wholesale.
    pub fn set_area_names(&mut self, names: Vec<AreaHashName>) {
        self.area_name = names;
    }

    pub fn area_label(&self, hash: ContentHash) -> Option<&str> {
        self.area_name
            .iter()
            .find(|n| n.hash == hash)
            .map(|n| n.name.as_str())
    }

    pub fn category(&self, category: PathType) -> &BTreeMap<ContentHash, FrameList> {
        match category {
            PathType::Area => &self.area,
            PathType::Obstacle => &self.obstacle,
            PathType::Path => &self.path,
        }
    }

    fn category_mut(&mut self, category: PathType) -> &mut BTreeMap<ContentHash, FrameList> {
        match category {
            PathType::Area => &mut self.area,
            PathType::Obstacle => &mut self.obstacle,
            PathType::Path => &mut self.path,
        }
    }

    /// Drop everything, e.g. when the owner starts a fresh sync.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn prune(&mut self) {
        let declared: BTreeSet<ContentHash> = self.hashlist().into_iter().collect();
        let before = self.area.len() + self.path.len() + self.obstacle.len();

        self.area.retain(|h, _| declared.contains(h));
        self.path.retain(|h, _| declared.contains(h));
        self.obstacle.retain(|h, _| declared.contains(h));

        let pruned = before - (self.area.len() + self.path.len() + self.obstacle.len());
        if pruned > 0 {
            debug!(pruned, "pruned geometry no longer declared by the device");
        }
    }

    // ── Persistence ──────────────────────────────────────────────

    pub fn to_json(&self) -> Result<String, LubaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, LubaError> {
        serde_json::from_str(text).map_err(|e| LubaError::Decode(e.to_string()))
    }

    /// Write the cache for a later warm start.
    pub fn save(&self, path: &Path) -> Result<(), LubaError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, LubaError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
