//! In-memory testing environment and test utilities.
//!
//! [`FakeSource`] is a scripted [`LogSource`]: responses are registered per
//! block range, either as a list of logs, a failure or a call that never
//! completes. Ranges without a script are answered by the default generator
//! ([`FakeSource::logs_per_chunk`]) or with no logs at all.
//!
//! [`log_at`] and [`log_of`] build logs emitted by [`ADDRESS`].

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use alloy::primitives::{Address, B256, Bytes, TxHash, U256, address};
use dashmap::DashMap;

use crate::{
    abi::EventKind,
    error::SourceError,
    source::{LogQuery, LogSource},
    types::{BlockNumber, LogEntry},
};

/// Contract address used by the test logs.
pub const ADDRESS: Address = address!("0x0000000000000000000000000000000000000abc");

/// Chain ID reported by [`FakeSource`].
pub const CHAIN_ID: u64 = 1337;

#[derive(Clone, Debug)]
enum Response {
    Logs(Vec<LogEntry>),
    Fail(SourceError),
    Hang,
}

#[derive(Clone, Debug, Default)]
pub struct FakeSource {
    head: BlockNumber,
    per_chunk: usize,
    responses: Arc<DashMap<(BlockNumber, BlockNumber), Response>>,
    queries: Arc<Mutex<Vec<(BlockNumber, BlockNumber)>>>,
    head_calls: Arc<AtomicUsize>,
}

impl FakeSource {
    /// Source with the chain head at `head` and no logs.
    pub fn new(head: BlockNumber) -> Self {
        Self {
            head,
            ..Default::default()
        }
    }

    /// Answers every unscripted range with `count` logs, spread over the
    /// range in ascending block order.
    pub fn logs_per_chunk(mut self, count: usize) -> Self {
        self.per_chunk = count;
        self
    }

    pub fn respond(&self, from: BlockNumber, to: BlockNumber, logs: Vec<LogEntry>) {
        self.responses.insert((from, to), Response::Logs(logs));
    }

    pub fn fail(&self, from: BlockNumber, to: BlockNumber, error: SourceError) {
        self.responses.insert((from, to), Response::Fail(error));
    }

    /// Query for the range never completes.
    pub fn hang(&self, from: BlockNumber, to: BlockNumber) {
        self.responses.insert((from, to), Response::Hang);
    }


    /// Ranges queried so far, in call order.
    pub fn queries(&self) -> Vec<(BlockNumber, BlockNumber)> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of head block requests.
    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    fn generate(&self, from: BlockNumber, to: BlockNumber) -> Vec<LogEntry> {
        (0..self.per_chunk)
            .map(|i| {
                let block = from.saturating_add(i as u64).min(to);
                log_at(block, i as u64)
            })
            .collect()
    }
}

impl LogSource for FakeSource {
    async fn filter_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, SourceError> {
        let range = (query.from_block, query.to_block);
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(range);

        let response = self.responses.get(&range).map(|r| r.value().clone());
        match response {
            Some(Response::Logs(logs)) => Ok(logs),
            Some(Response::Fail(error)) => Err(error),
            Some(Response::Hang) => std::future::pending().await,
            None => Ok(self.generate(query.from_block, query.to_block)),
        }
    }

    async fn block_number(&self) -> Result<BlockNumber, SourceError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.head)
    }

    async fn chain_id(&self) -> Result<u64, SourceError> {
        Ok(CHAIN_ID)
    }
}

/// `BatchTopUp` log at the given block.
pub fn log_at(block: BlockNumber, log_index: u64) -> LogEntry {
    log_of(EventKind::BatchTopUp, block, log_index)
}

pub fn log_of(kind: EventKind, block: BlockNumber, log_index: u64) -> LogEntry {
    LogEntry::new(
        ADDRESS,
        block,
        TxHash::from(U256::from(block)),
        log_index,
        vec![kind.signature_hash(), B256::from(U256::from(log_index))],
        Bytes::from(U256::from(block).to_be_bytes_vec()),
    )
}
