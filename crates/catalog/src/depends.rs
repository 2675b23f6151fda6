use std::collections::BTreeSet;

use runtime::Metrics;
use scene::NodeId;
use tracing::debug;

/// Tiles whose content referenced catalog keys that were not yet available.
///
/// Retries are unbounded; every reprocessing of a tile bumps its
/// `depends.retry.<node>` counter so stuck tiles can be spotted.
#[derive(Debug, Default)]
pub struct DependencyResolver {
    pending: BTreeSet<NodeId>,
    metrics: Metrics,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_pending(&mut self, tile: NodeId) {
        if self.pending.insert(tile) {
            debug!(%tile, "tile waiting on catalog content");
            self.metrics.inc_counter("depends.marked", 1);
        }
    }

    pub fn is_pending(&self, tile: NodeId) -> bool {
        self.pending.contains(&tile)
    }

    pub fn pending(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.pending.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Snapshots and clears the pending set; the caller reprocesses each
    /// returned tile once.
    pub fn begin_pass(&mut self) -> Vec<NodeId> {
        let snapshot: Vec<NodeId> = std::mem::take(&mut self.pending).into_iter().collect();
        for tile in &snapshot {
            self.metrics.inc_counter(Self::retry_counter(*tile), 1);
        }
        self.metrics.inc_counter("depends.passes", 1);
        snapshot
    }

    /// How many times `tile` has been reprocessed.
    pub fn retries(&self, tile: NodeId) -> u64 {
        self.metrics.counter(&Self::retry_counter(tile))
    }

    /// Drops all state for a disposed tile.
    pub fn forget(&mut self, tile: NodeId) {
        self.pending.remove(&tile);
        self.metrics.reset_counter(&Self::retry_counter(tile));
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn retry_counter(tile: NodeId) -> String {
        format!("depends.retry.{}", tile.0)
    }
}
