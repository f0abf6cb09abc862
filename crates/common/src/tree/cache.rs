//! The current-snapshot slot.
//!
//! Readers call [`SnapshotCache::current`] once per request and keep the
//! returned `Arc` for the whole request. The refresh task is the only writer
//! and replaces the slot in a single atomic store, so a reader always sees
//! one complete generation.

use std::sync::Arc;
use std::time::UNIX_EPOCH;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use super::snapshot::TreeSnapshot;

pub struct SnapshotCache {
    current: ArcSwap<TreeSnapshot>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("generation", &self.generation())
            .finish()
    }
}

impl SnapshotCache {
    /// Start with the empty generation-0 snapshot.
    pub fn new() -> Self {
        Self::with_snapshot(TreeSnapshot::empty())
    }

    pub fn with_snapshot(snapshot: TreeSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// The snapshot current at the time of the call. Never blocks.
    pub fn current(&self) -> Arc<TreeSnapshot> {
        self.current.load_full()
    }

    /// Replace the current snapshot and hand back the one it replaced.
    pub fn publish(&self, snapshot: impl Into<Arc<TreeSnapshot>>) -> Arc<TreeSnapshot> {
        let snapshot = snapshot.into();
        let generation = snapshot.generation();
        let previous = self.current.swap(snapshot);
        tracing::debug!(
            generation,
            previous = previous.generation(),
            "published snapshot"
        );
        previous
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation()
    }

    /// Counters for the published snapshot, as printed by `ldbfs stats`.
    pub fn stats(&self) -> CacheStats {
        CacheStats::of(&self.current.load())
    }
}

/// Size and age of one snapshot generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub generation: u64,
    pub directories: usize,
    pub files: usize,
    pub records: usize,
    /// Sum of all file content lengths
    pub content_bytes: u64,
    /// Build time of the current snapshot (Unix timestamp)
    pub built_at: u64,
}

impl CacheStats {
    pub fn of(snapshot: &TreeSnapshot) -> Self {
        Self {
            generation: snapshot.generation(),
            directories: snapshot.directory_count(),
            files: snapshot.file_count(),
            records: snapshot.record_count(),
            content_bytes: snapshot.content_bytes(),
            built_at: snapshot
                .built_at()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }
}
