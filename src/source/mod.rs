//! RPC log source and its rate-limited wrapper.
//!
//! [`LogSource`] is the call contract the pipeline needs from a node:
//! filtered logs, the current head block and the chain ID. [`ProviderSource`]
//! implements it on top of any alloy [`Provider`].
//!
//! [`RateLimitedSource`] serializes all calls through a single slot and a
//! [`RateLimiter`] so that one client instance never exceeds its request
//! budget, no matter how many tasks share it.

mod limited;
mod limiter;

use std::future::Future;

use alloy::{
    primitives::{Address, B256},
    providers::Provider,
    rpc::types::Filter,
};

use crate::{
    error::SourceError,
    types::{BlockNumber, LogEntry},
};

pub use limited::RateLimitedSource;
pub use limiter::{RateBudget, RateLimiter};

/// Log filter for a single inclusive block range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub topics: Vec<B256>,
    pub from_block: BlockNumber,
    pub to_block: BlockNumber,
}

impl LogQuery {
    pub fn to_filter(&self) -> Filter {
        Filter::new()
            .address(self.address)
            .event_signature(self.topics.clone())
            .from_block(self.from_block)
            .to_block(self.to_block)
    }
}

/// Remote source of contract logs.
///
/// Transport, connection management and retries are up to the
/// implementation.
pub trait LogSource: Send + Sync {
    /// Logs matching the query, in the order returned by the node.
    fn filter_logs(
        &self,
        query: &LogQuery,
    ) -> impl Future<Output = Result<Vec<LogEntry>, SourceError>> + Send;

    /// Current head block number.
    fn block_number(&self) -> impl Future<Output = Result<BlockNumber, SourceError>> + Send;

    fn chain_id(&self) -> impl Future<Output = Result<u64, SourceError>> + Send;
}

/// [`LogSource`] backed by an alloy [`Provider`].
#[derive(Clone, Debug)]
pub struct ProviderSource<P> {
    provider: P,
}

impl<P: Provider> ProviderSource<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: Provider> LogSource for ProviderSource<P> {
    async fn filter_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, SourceError> {
        self.provider
            .get_logs(&query.to_filter())
            .await?
            .into_iter()
            .map(LogEntry::try_from)
            .collect()
    }

    async fn block_number(&self) -> Result<BlockNumber, SourceError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn chain_id(&self) -> Result<u64, SourceError> {
        Ok(self.provider.get_chain_id().await?)
    }
}

#[cfg(test)]
mod tests {
    use alloy::{
        primitives::address,
        providers::{ProviderBuilder, mock::Asserter},
    };

    use super::*;
    use crate::abi::EventKind;

    fn query() -> LogQuery {
        LogQuery {
            address: address!("0x1111111111111111111111111111111111111111"),
            topics: vec![EventKind::PriceUpdate.signature_hash()],
            from_block: 10,
            to_block: 19,
        }
    }

    #[test]
    fn test_query_filter() {
        let filter = query().to_filter();
        assert_eq!(filter.get_from_block(), Some(10));
        assert_eq!(filter.get_to_block(), Some(19));
    }

    #[tokio::test]
    async fn test_provider_source() {
        let asserter = Asserter::new();
        asserter.push_success(&serde_json::json!("0x64")); // chain id
        asserter.push_success(&serde_json::json!("0x64")); // block number
        asserter.push_success(&serde_json::json!([{
            "address": "0x1111111111111111111111111111111111111111",
            "topics": [EventKind::PriceUpdate.signature_hash()],
            "data": "0x",
            "blockNumber": "0xc",
            "transactionHash": "0xbeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee",
            "transactionIndex": "0x0",
            "blockHash": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "logIndex": "0x2",
            "removed": false
        }]));

        let source = ProviderSource::new(ProviderBuilder::new().connect_mocked_client(asserter));

        assert_eq!(source.chain_id().await.unwrap(), 100);
        assert_eq!(source.block_number().await.unwrap(), 100);
        let logs = source.filter_logs(&query()).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number(), 12);
        assert_eq!(logs[0].log_index(), 2);
    }

    #[tokio::test]
    async fn test_provider_source_error() {
        let asserter = Asserter::new();
        asserter.push_failure_msg("boom");

        let source = ProviderSource::new(ProviderBuilder::new().connect_mocked_client(asserter));

        assert!(source.filter_logs(&query()).await.is_err());
    }
}
