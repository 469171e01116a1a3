use std::num::NonZeroU64;

use crate::types::BlockNumber;

/// Inclusive block range queried with a single RPC call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Chunk {
    from: BlockNumber,
    to: BlockNumber,
}

impl Chunk {
    pub fn new(from: BlockNumber, to: BlockNumber) -> Self {
        debug_assert!(from <= to);
        Self { from, to }
    }

    pub fn from(&self) -> BlockNumber {
        self.from
    }

    pub fn to(&self) -> BlockNumber {
        self.to
    }

    /// Number of blocks covered.
    pub fn blocks(&self) -> u64 {
        (self.to - self.from).saturating_add(1)
    }
}

/// Ascending, gapless partition of `[start, end]` into chunks of at most
/// `limit` blocks. Empty if `start > end`.
pub fn chunks(start: BlockNumber, end: BlockNumber, limit: NonZeroU64) -> Chunks {
    Chunks {
        next: (start <= end).then_some(start),
        end,
        limit: limit.get(),
    }
}

/// Number of chunks [`chunks`] yields for the range.
pub fn chunk_count(start: BlockNumber, end: BlockNumber, limit: NonZeroU64) -> u64 {
    if start > end {
        return 0;
    }
    (end - start) / limit.get() + 1
}

/// Iterator returned by [`chunks`].
#[derive(Clone, Debug)]
pub struct Chunks {
    next: Option<BlockNumber>,
    end: BlockNumber,
    limit: u64,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let from = self.next?;
        let to = from.saturating_add(self.limit - 1).min(self.end);
        self.next = (to < self.end).then(|| to + 1);
        Some(Chunk::new(from, to))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn limit(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    fn ranges(start: u64, end: u64, n: u64) -> Vec<(u64, u64)> {
        chunks(start, end, limit(n)).map(|c| (c.from(), c.to())).collect()
    }

    #[test]
    fn test_chunks_last_shorter() {
        assert_eq!(ranges(100, 104, 2), vec![(100, 101), (102, 103), (104, 104)]);
    }

    #[test]
    fn test_chunks_exact_multiple() {
        assert_eq!(ranges(100, 1099, 500), vec![(100, 599), (600, 1099)]);
    }

    #[test]
    fn test_chunks_single_block() {
        assert_eq!(ranges(42, 42, 5), vec![(42, 42)]);
        assert_eq!(ranges(42, 42, 1), vec![(42, 42)]);
    }

    #[test]
    fn test_chunks_empty() {
        assert!(ranges(100, 99, 5).is_empty());
        assert_eq!(chunk_count(100, 99, limit(5)), 0);
    }

    #[test]
    fn test_chunks_near_max_block() {
        assert_eq!(
            ranges(u64::MAX - 4, u64::MAX, 2),
            vec![
                (u64::MAX - 4, u64::MAX - 3),
                (u64::MAX - 2, u64::MAX - 1),
                (u64::MAX, u64::MAX)
            ]
        );
        assert_eq!(ranges(0, u64::MAX, u64::MAX), vec![(0, u64::MAX - 1), (u64::MAX, u64::MAX)]);
    }

    proptest! {
        #[test]
        fn prop_chunks_partition_range(start in 0u64..1_000_000, len in 0u64..5_000, n in 1u64..700) {
            let end = start + len;
            let chunks: Vec<_> = chunks(start, end, limit(n)).collect();

            prop_assert_eq!(chunks.len() as u64, chunk_count(start, end, limit(n)));
            prop_assert_eq!(chunks.first().map(Chunk::from), Some(start));
            prop_assert_eq!(chunks.last().map(Chunk::to), Some(end));
            for chunk in &chunks {
                prop_assert!(chunk.from() <= chunk.to());
                prop_assert!(chunk.blocks() <= n);
            }
            for pair in chunks.windows(2) {
                prop_assert_eq!(pair[0].to() + 1, pair[1].from());
            }
            prop_assert_eq!(chunks.iter().map(Chunk::blocks).sum::<u64>(), len + 1);
        }
    }
}
