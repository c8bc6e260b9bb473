//! Plans the requests that move a [`HashList`] toward completeness.

use std::fmt;

use crate::commands;
use crate::hash_list::HashList;
use crate::message::{ContentHash, LubaMessage, PathType};

/// One outstanding piece of map data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequest {
    /// Nothing is known yet; ask for the root list.
    RootList,
    /// One missing root frame.
    RootFrame { total_frame: i32, current_frame: i32 },
    /// A declared hash with no chunk received.
    Hash(ContentHash),
    /// One missing chunk of a partially received hash.
    Chunk {
        category: PathType,
        hash: ContentHash,
        total_frame: i32,
        current_frame: i32,
    },
}

impl SyncRequest {
    pub fn to_message(self) -> LubaMessage {
        match self {
            SyncRequest::RootList => commands::get_hash_list(),
            SyncRequest::RootFrame {
                total_frame,
                current_frame,
            } => commands::get_hash_response(total_frame, current_frame),
            SyncRequest::Hash(hash) => commands::synchronize_hash_data(hash),
            SyncRequest::Chunk {
                category,
                hash,
                total_frame,
                current_frame,
            } => commands::get_regional_data(category, hash, total_frame, current_frame),
        }
    }
}

impl fmt::Display for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncRequest::RootList => write!(f, "root list"),
            SyncRequest::RootFrame {
                total_frame,
                current_frame,
            } => write!(f, "root frame {current_frame}/{total_frame}"),
            SyncRequest::Hash(hash) => write!(f, "hash {hash}"),
            SyncRequest::Chunk {
                category,
                hash,
                total_frame,
                current_frame,
            } => write!(f, "{category} {hash} frame {current_frame}/{total_frame}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapSyncPlanner {
    /// Cap on requests returned per call; `None` returns everything.
    pub max_requests: Option<usize>,
}

impl MapSyncPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_requests: usize) -> Self {
        Self {
            max_requests: Some(max_requests),
        }
    }

    /// Outstanding requests in priority order: root frames, then whole
    /// hashes, then the gaps in partially received hashes.
    pub fn plan(&self, map: &HashList) -> Vec<SyncRequest> {
        if map.root_hash_list.total_frame == 0 {
            return vec![SyncRequest::RootList];
        }

        let total_frame = map.root_hash_list.total_frame;
        let roots = map
            .missing_hash_frame()
            .into_iter()
            .map(|current_frame| SyncRequest::RootFrame {
                total_frame,
                current_frame,
            });

        let hashes = map.missing_hashlist().into_iter().map(SyncRequest::Hash);

        let chunks = map
            .incomplete()
            .into_iter()
            .flat_map(|(category, hash, missing)| {
                let total_frame = map
                    .category(category)
                    .get(&hash)
                    .map(|list| list.total_frame)
                    .unwrap_or_default();
                missing.into_iter().map(move |current_frame| SyncRequest::Chunk {
                    category,
                    hash,
                    total_frame,
                    current_frame,
                })
            });

        let all = roots.chain(hashes).chain(chunks);
        match self.max_requests {
            Some(n) => all.take(n).collect(),
            None => all.collect(),
        }
    }

    /// [`plan`](Self::plan) rendered as ready-to-send messages.
    pub fn next_requests(&self, map: &HashList) -> Vec<LubaMessage> {
        self.plan(map)
            .into_iter()
            .map(SyncRequest::to_message)
            .collect()
    }
}
