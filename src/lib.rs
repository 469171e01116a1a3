//! Postage stamp event log exporter.
//!
//! # Overview
//!
//! Retrieves a historical range of contract event logs from a JSON-RPC node,
//! streams them to a newline-delimited JSON file as they arrive and keeps
//! running statistics over the stream.
//!
//! The pipeline is built from the following pieces:
//!
//! * [`source::RateLimitedSource`] throttles every RPC call to the configured
//!   request budget and serializes access to the connection.
//! * [`fetch::ChunkedFetcher`] splits the requested block range into chunks,
//!   queries them in ascending order and pushes every log into a bounded
//!   channel.
//! * [`persist::StreamPersister`] drains the channel into the output file,
//!   one JSON object per line.
//! * [`stats::StatsCache`] aggregates block bounds and per-event counters.
//! * [`export::Exporter`] runs producer and consumer side by side, reports
//!   progress and handles errors and cancellation (Ctrl+C), compressing the
//!   output when asked to.
//!
//! # Limitations
//!
//! * RPC failures are not retried, a failed chunk aborts the whole export
//!   and the remaining range has to be requested again.
//!
//! * There is no checkpointing across process restarts.
//!
//! # Testing
//!
//! [`testing`] module provides a scripted in-memory [`source::LogSource`] to
//! exercise the pipeline without a node.

pub mod abi;
pub mod compress;
pub mod error;
pub mod export;
pub mod fetch;
pub mod persist;
pub mod source;
pub mod stats;
pub mod testing;
pub mod types;

use alloy::primitives::{Address, address};

#[derive(Clone, Debug)]
/// Chain the postage stamp contract is deployed on.
pub struct Chain {
    chain_id: u64,
    postage_stamp: Address,
    deployed_at_block: u64,
}

impl Chain {
    /// Gnosis Chain mainnet.
    pub fn gnosis() -> Self {
        Self {
            chain_id: 100,
            postage_stamp: address!("0x45a1502382541Cd610CC9068e88727426b696293"),
            deployed_at_block: 31306381,
        }
    }

    /// Swarm testnet on Sepolia.
    pub fn testnet() -> Self {
        Self {
            chain_id: 11155111,
            postage_stamp: address!("0xcdfdc3752caaa826fe62531e0000c40546ec56a6"),
            deployed_at_block: 6596277,
        }
    }

    pub fn custom(chain_id: u64, postage_stamp: Address, deployed_at_block: u64) -> Self {
        Self {
            chain_id,
            postage_stamp,
            deployed_at_block,
        }
    }

    /// Looks up a known chain by its ID.
    pub fn by_id(chain_id: u64) -> Option<Self> {
        [Self::gnosis(), Self::testnet()]
            .into_iter()
            .find(|chain| chain.chain_id == chain_id)
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn postage_stamp(&self) -> Address {
        self.postage_stamp
    }

    pub fn deployed_at_block(&self) -> u64 {
        self.deployed_at_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_lookup() {
        let chain = Chain::by_id(100).unwrap();
        assert_eq!(chain.chain_id(), 100);
        assert_eq!(chain.postage_stamp(), Chain::gnosis().postage_stamp());

        let testnet = Chain::by_id(11155111).unwrap();
        assert_eq!(testnet.postage_stamp(), Chain::testnet().postage_stamp());
        assert_eq!(testnet.deployed_at_block(), 6596277);
        assert_ne!(testnet.postage_stamp(), chain.postage_stamp());

        assert!(Chain::by_id(1).is_none());
    }
}
