//! Chunked log fetching.
//!
//! Splits a block range into chunks of at most `block_range_limit` blocks,
//! queries them in ascending order through a [`crate::source::RateLimitedSource`]
//! and streams the logs into a bounded channel.
//!
//! # Architecture
//!
//! - [`chunks`] - Pure range partitioning
//! - [`ChunkedFetcher`] - Spawns the producer task and hands out the receivers
//! - [`LogReceiver`] / [`ErrorReceiver`] - Output streams of one fetch
//!
//! A fetch moves from validation (end block resolved against the chain head
//! when 0) through one query per chunk to exactly one of: completed,
//! failed or cancelled. Only the last two report on the [`ErrorReceiver`].
//! Any chunk failure aborts the whole fetch, nothing is retried.
//!
//! # Example
//!
//! ```ignore
//! use batch_export::{fetch::{ChunkedFetcher, FetchConfig}, source::ProviderSource, types::FetchRequest};
//!
//! let fetcher = ChunkedFetcher::new(ProviderSource::new(provider), FetchConfig::default())?;
//! let (mut logs, mut errors) = fetcher.fetch(token, FetchRequest::new(address, 31306381, 0));
//!
//! while let Some(log) = logs.recv().await {
//!     println!("{} #{}", log.block_number(), log.log_index());
//! }
//!
//! if let Some(err) = errors.recv().await {
//!     eprintln!("fetch failed: {err}");
//! }
//! ```

mod chunk;
mod fetcher;
mod types;

pub use chunk::{Chunk, Chunks, chunk_count, chunks};
pub use fetcher::{
    ChunkedFetcher, DEFAULT_BLOCK_RANGE_LIMIT, DEFAULT_CHANNEL_SIZE, DEFAULT_REQUESTS_PER_SECOND,
    FetchConfig,
};
pub use types::{ErrorReceiver, LogReceiver};
