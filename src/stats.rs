//! Running statistics over the exported logs.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    abi::EventKind,
    types::{BlockNumber, LogEntry},
};

/// Snapshot of the aggregated statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    first_block: Option<BlockNumber>,
    last_block: Option<BlockNumber>,
    total: u64,
    counts: [u64; EventKind::ALL.len()],
    unclassified: u64,
}

impl Stats {
    /// Lowest block seen so far.
    pub fn first_block(&self) -> Option<BlockNumber> {
        self.first_block
    }

    /// Highest block seen so far.
    pub fn last_block(&self) -> Option<BlockNumber> {
        self.last_block
    }

    /// Number of logs seen.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts[kind.index()]
    }

    /// Logs whose first topic matched no known event.
    pub fn unclassified(&self) -> u64 {
        self.unclassified
    }

    fn record(&mut self, block: BlockNumber, kind: Option<EventKind>) {
        self.first_block = Some(self.first_block.map_or(block, |first| first.min(block)));
        self.last_block = Some(self.last_block.map_or(block, |last| last.max(block)));
        self.total += 1;
        match kind {
            Some(kind) => self.counts[kind.index()] += 1,
            None => self.unclassified += 1,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    stats: Stats,
    last_price_update: Option<LogEntry>,
}

/// Thread-safe aggregator of [`Stats`] which also keeps the most recent
/// `PriceUpdate` log.
///
/// Updates are serialized by a single lock, snapshots are consistent copies.
#[derive(Debug, Default)]
pub struct StatsCache {
    inner: Mutex<Inner>,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, entry: &LogEntry, kind: Option<EventKind>) {
        let mut inner = self.lock();
        inner.stats.record(entry.block_number(), kind);
        if kind == Some(EventKind::PriceUpdate) {
            inner.last_price_update = Some(entry.clone());
        }
    }

    pub fn snapshot(&self) -> Stats {
        self.lock().stats.clone()
    }

    pub fn last_price_update(&self) -> Option<LogEntry> {
        self.lock().last_price_update.clone()
    }

    // Updates leave the data consistent between statements, a panicking
    // holder can not leave it torn.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
