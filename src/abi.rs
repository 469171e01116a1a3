//! Postage stamp contract events and topic classification.

use std::{collections::HashMap, fmt};

use alloy::{primitives::B256, sol_types::SolEvent};
use itertools::Itertools;

use crate::types::LogEntry;

pub mod postage {
    alloy::sol!(
        #[derive(Debug)]
        contract PostageStamp {
            event BatchCreated(
                bytes32 indexed batchId,
                uint256 totalAmount,
                uint256 normalisedBalance,
                address owner,
                uint8 depth,
                uint8 bucketDepth,
                bool immutableFlag
            );
            event BatchTopUp(bytes32 indexed batchId, uint256 topupAmount, uint256 normalisedBalance);
            event BatchDepthIncrease(bytes32 indexed batchId, uint8 newDepth, uint256 normalisedBalance);
            event PriceUpdate(uint256 price);
            event Paused(address account);
        }
    );
}

use postage::PostageStamp;

/// Kind of the exported event, derived from the first log topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    BatchCreated,
    BatchTopUp,
    BatchDepthIncrease,
    PriceUpdate,
    Paused,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::BatchCreated,
        EventKind::BatchTopUp,
        EventKind::BatchDepthIncrease,
        EventKind::PriceUpdate,
        EventKind::Paused,
    ];

    /// Topic hash of the event signature in the postage stamp ABI.
    pub fn signature_hash(self) -> B256 {
        match self {
            EventKind::BatchCreated => PostageStamp::BatchCreated::SIGNATURE_HASH,
            EventKind::BatchTopUp => PostageStamp::BatchTopUp::SIGNATURE_HASH,
            EventKind::BatchDepthIncrease => PostageStamp::BatchDepthIncrease::SIGNATURE_HASH,
            EventKind::PriceUpdate => PostageStamp::PriceUpdate::SIGNATURE_HASH,
            EventKind::Paused => PostageStamp::Paused::SIGNATURE_HASH,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::BatchCreated => "BatchCreated",
            EventKind::BatchTopUp => "BatchTopUp",
            EventKind::BatchDepthIncrease => "BatchDepthIncrease",
            EventKind::PriceUpdate => "PriceUpdate",
            EventKind::Paused => "Paused",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static lookup from event signature hash to [`EventKind`].
///
/// Built once and shared by the fetcher, it also provides the topic
/// set used to filter the log queries.
#[derive(Clone, Debug)]
pub struct EventTable {
    kinds: HashMap<B256, EventKind>,
}

impl EventTable {
    /// Table of all the postage stamp events of interest.
    pub fn postage_stamp() -> Self {
        Self::new(EventKind::ALL.map(|kind| (kind.signature_hash(), kind)))
    }

    pub fn new(entries: impl IntoIterator<Item = (B256, EventKind)>) -> Self {
        Self {
            kinds: entries.into_iter().collect(),
        }
    }

    pub fn kind(&self, topic: &B256) -> Option<EventKind> {
        self.kinds.get(topic).copied()
    }

    /// Classifies the log by its first topic.
    pub fn classify(&self, entry: &LogEntry) -> Option<EventKind> {
        entry.topics().first().and_then(|topic| self.kind(topic))
    }

    /// Topic hashes to filter log queries with, in a stable order.
    pub fn topics(&self) -> Vec<B256> {
        self.kinds
            .iter()
            .sorted_by_key(|(_, kind)| **kind)
            .map(|(topic, _)| *topic)
            .collect()
    }
}

impl Default for EventTable {
    fn default() -> Self {
        Self::postage_stamp()
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, Bytes, TxHash, b256, keccak256};

    use super::*;

    #[test]
    fn test_signature_hashes() {
        assert_eq!(
            EventKind::PriceUpdate.signature_hash(),
            keccak256("PriceUpdate(uint256)")
        );
        assert_eq!(
            EventKind::BatchTopUp.signature_hash(),
            keccak256("BatchTopUp(bytes32,uint256,uint256)")
        );
        assert_eq!(
            EventKind::BatchCreated.signature_hash(),
            keccak256("BatchCreated(bytes32,uint256,uint256,address,uint8,uint8,bool)")
        );
    }

    #[test]
    fn test_classify() {
        let table = EventTable::postage_stamp();
        let entry = |topics| LogEntry::new(Address::ZERO, 1, TxHash::ZERO, 0, topics, Bytes::new());

        assert_eq!(
            table.classify(&entry(vec![EventKind::BatchDepthIncrease.signature_hash()])),
            Some(EventKind::BatchDepthIncrease)
        );
        assert_eq!(table.classify(&entry(vec![])), None);
        assert_eq!(
            table.classify(&entry(vec![b256!(
                "0x1111111111111111111111111111111111111111111111111111111111111111"
            )])),
            None
        );
    }

    #[test]
    fn test_topics_cover_all_kinds() {
        let topics = EventTable::postage_stamp().topics();
        assert_eq!(topics.len(), EventKind::ALL.len());
        assert_eq!(topics[0], EventKind::BatchCreated.signature_hash());
        assert_eq!(topics[4], EventKind::Paused.signature_hash());
    }
}
