//! Chunked fetcher implementation.

use std::{num::NonZeroU64, sync::Arc};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    chunk::{self, Chunk},
    types::{ErrorReceiver, LogReceiver},
};
use crate::{
    abi::EventTable,
    error::Error,
    source::{LogQuery, LogSource, RateLimitedSource},
    stats::StatsCache,
    types::{BlockNumber, FetchRequest, LogEntry},
};

/// Capacity of the log channel, a slow consumer blocks the fetch beyond it.
pub const DEFAULT_CHANNEL_SIZE: usize = 100;

/// Default maximum number of blocks per log query.
pub const DEFAULT_BLOCK_RANGE_LIMIT: u64 = 5;

/// Default RPC request budget per second.
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 15;

/// Fetcher configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchConfig {
    /// Maximum number of blocks covered by one log query.
    pub block_range_limit: u64,

    /// RPC request budget, 0 disables rate limiting.
    pub requests_per_second: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            block_range_limit: DEFAULT_BLOCK_RANGE_LIMIT,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }
}

/// Streams the logs of a block range chunk by chunk.
///
/// All fetches of one fetcher share the rate-limited source and therefore
/// its request budget.
#[derive(Debug)]
pub struct ChunkedFetcher<S> {
    source: Arc<RateLimitedSource<S>>,
    events: Arc<EventTable>,
    stats: Arc<StatsCache>,
    block_range_limit: NonZeroU64,
}

impl<S: LogSource + 'static> ChunkedFetcher<S> {
    /// Fetcher over `source` with the configured request budget.
    pub fn new(source: S, config: FetchConfig) -> Result<Self, Error> {
        Self::with_source(
            RateLimitedSource::per_second(source, config.requests_per_second),
            config.block_range_limit,
        )
    }

    pub fn with_source(
        source: RateLimitedSource<S>,
        block_range_limit: u64,
    ) -> Result<Self, Error> {
        let block_range_limit = NonZeroU64::new(block_range_limit).ok_or_else(|| {
            Error::Validation("block range limit must be at least 1".to_string())
        })?;
        Ok(Self {
            source: Arc::new(source),
            events: Arc::new(EventTable::postage_stamp()),
            stats: Arc::new(StatsCache::default()),
            block_range_limit,
        })
    }

    /// Replaces the event table used for topic filtering and classification.
    pub fn with_events(mut self, events: EventTable) -> Self {
        self.events = Arc::new(events);
        self
    }

    /// Aggregates into the given cache instead of a private one.
    pub fn with_stats(mut self, stats: Arc<StatsCache>) -> Self {
        self.stats = stats;
        self
    }

    pub fn source(&self) -> &RateLimitedSource<S> {
        &self.source
    }

    pub fn stats(&self) -> &Arc<StatsCache> {
        &self.stats
    }

    pub fn block_range_limit(&self) -> u64 {
        self.block_range_limit.get()
    }

    /// Starts fetching the requested range in a background task.
    ///
    /// Logs are pushed to the returned [`LogReceiver`] in ascending chunk
    /// order. A failure, including cancellation, is reported once on the
    /// [`ErrorReceiver`] and stops the fetch; both receivers are closed when
    /// the task ends. A dropped [`LogReceiver`] stops the fetch quietly.
    pub fn fetch(
        &self,
        token: CancellationToken,
        request: FetchRequest,
    ) -> (LogReceiver, ErrorReceiver) {
        let (logs_tx, logs_rx) = mpsc::channel(DEFAULT_CHANNEL_SIZE);
        let (errors_tx, errors_rx) = mpsc::channel(1);

        let task = FetchTask {
            source: self.source.clone(),
            events: self.events.clone(),
            stats: self.stats.clone(),
            block_range_limit: self.block_range_limit,
            token,
            logs: logs_tx,
        };
        tokio::spawn(async move {
            if let Err(err) = task.run(request).await {
                if err.is_cancelled() {
                    debug!("fetch cancelled");
                } else {
                    warn!(%err, "fetch failed");
                }
                // the only message ever sent, capacity is available
                _ = errors_tx.try_send(err);
            }
        });

        (LogReceiver::new(logs_rx), ErrorReceiver::new(errors_rx))
    }
}

struct FetchTask<S> {
    source: Arc<RateLimitedSource<S>>,
    events: Arc<EventTable>,
    stats: Arc<StatsCache>,
    block_range_limit: NonZeroU64,
    token: CancellationToken,
    logs: mpsc::Sender<LogEntry>,
}

impl<S: LogSource> FetchTask<S> {
    async fn run(self, request: FetchRequest) -> Result<(), Error> {
        let (start, end) = self.resolve(&request).await?;

        info!(
            from = start,
            to = end,
            chunks = chunk::chunk_count(start, end, self.block_range_limit),
            "fetching logs"
        );

        let topics = self.events.topics();
        for chunk in chunk::chunks(start, end, self.block_range_limit) {
            if self.token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let query = LogQuery {
                address: request.address(),
                topics: topics.clone(),
                from_block: chunk.from(),
                to_block: chunk.to(),
            };
            if !self.fetch_chunk(chunk, &query).await? {
                debug!("log receiver dropped, stopping fetch");
                return Ok(());
            }
        }

        debug!(from = start, to = end, "all chunks fetched");
        Ok(())
    }

    /// Validates the request and resolves its end block.
    async fn resolve(&self, request: &FetchRequest) -> Result<(BlockNumber, BlockNumber), Error> {
        request.validate()?;
        let head = if request.ends_at_head() {
            let head = self.source.block_number(&self.token).await?;
            debug!(head, "resolved end block to chain head");
            head
        } else {
            request.end_block()
        };
        request.resolve(head)
    }

    /// Queries one chunk and emits its logs, returns `false` once the
    /// receiver is gone.
    async fn fetch_chunk(&self, chunk: Chunk, query: &LogQuery) -> Result<bool, Error> {
        debug!(from = chunk.from(), to = chunk.to(), "querying logs");

        let logs = match self.source.query(&self.token, query).await {
            Ok(logs) => logs,
            Err(Error::Source(source)) => return Err(Error::ChunkQuery { chunk, source }),
            Err(err) => return Err(err),
        };

        for log in logs {
            let permit = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(Error::Cancelled),
                permit = self.logs.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return Ok(false),
                },
            };
            self.stats.update(&log, self.events.classify(&log));
            permit.send(log);
        }
        Ok(true)
    }
}
