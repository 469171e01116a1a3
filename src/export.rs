//! Export coordinator.
//!
//! [`Exporter`] runs a [`ChunkedFetcher`] and a [`StreamPersister`] side by
//! side on one cancellation token and turns their signals into a single
//! outcome. The first terminal condition wins:
//!
//! - the fetch completes: the persister drains the stream, the output is
//!   compressed if configured and an [`ExportSummary`] is returned
//! - the fetch fails: the persister flushes what was already sent and the
//!   fetch error is returned, nothing is compressed
//! - the token fires: the in-flight write completes, the partial output is
//!   compressed and [`Error::Cancelled`] is returned
//! - the persister fails: the fetch is stopped and the persister error is
//!   returned

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::{
    io::AsyncWrite,
    task::JoinHandle,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    compress::Compression,
    error::Error,
    fetch::ChunkedFetcher,
    persist::{PersistSummary, StreamPersister},
    source::LogSource,
    stats::Stats,
    types::FetchRequest,
};

/// Default output file.
pub const DEFAULT_OUTPUT: &str = "export.ndjson";

/// Default interval between progress reports.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportConfig {
    /// NDJSON output file, truncated at the start of a run.
    pub output: PathBuf,

    /// Compression applied to the output once persisting stopped.
    pub compression: Option<Compression>,

    /// Interval between progress reports.
    pub heartbeat: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            compression: None,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }
}

/// Result of a completed export.
#[derive(Clone, Debug)]
pub struct ExportSummary {
    /// Number of persisted logs.
    pub records: u64,

    /// Bytes written to the output file.
    pub bytes: u64,

    pub stats: Stats,

    pub output: PathBuf,

    /// Compressed artifact, if compression is enabled.
    pub compressed: Option<PathBuf>,
}

enum Outcome {
    Completed,
    Failed(Error),
    Cancelled,
}

type PersistHandle = JoinHandle<Result<PersistSummary, Error>>;

/// Drives a complete export run.
#[derive(Debug)]
pub struct Exporter<S> {
    fetcher: ChunkedFetcher<S>,
    config: ExportConfig,
}

impl<S: LogSource + 'static> Exporter<S> {
    pub fn new(fetcher: ChunkedFetcher<S>, config: ExportConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn fetcher(&self) -> &ChunkedFetcher<S> {
        &self.fetcher
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Exports the logs of `request` into the configured output file.
    ///
    /// Statistics in the summary are taken from the fetcher's cache, which
    /// accumulates over every run of the same fetcher.
    pub async fn run(
        &self,
        token: CancellationToken,
        request: FetchRequest,
    ) -> Result<ExportSummary, Error> {
        if self.config.heartbeat.is_zero() {
            return Err(Error::Validation(
                "heartbeat interval must be positive".to_string(),
            ));
        }

        let persister = StreamPersister::create(&self.config.output).await?;
        self.drive(token, request, persister).await
    }

    /// Runs fetch and persister against `persister`'s sink, the configured
    /// output path is only used for compression.
    async fn drive<W>(
        &self,
        token: CancellationToken,
        request: FetchRequest,
        persister: StreamPersister<W>,
    ) -> Result<ExportSummary, Error>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        // stopped on its own when the persister fails
        let fetch_token = token.child_token();
        let (logs, mut errors) = self.fetcher.fetch(fetch_token.clone(), request);
        let mut persist: PersistHandle = tokio::spawn(persister.run(token.clone(), logs));

        let period = self.config.heartbeat;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        let mut persisted = None;

        let outcome = loop {
            tokio::select! {
                biased;
                err = errors.recv() => break match err {
                    None => Outcome::Completed,
                    Some(err) if err.is_cancelled() => Outcome::Cancelled,
                    Some(err) => Outcome::Failed(err),
                },
                _ = token.cancelled() => break Outcome::Cancelled,
                result = &mut persist, if persisted.is_none() => {
                    match result.unwrap_or_else(|err| Err(Error::from(err))) {
                        Err(err) if !err.is_cancelled() => {
                            fetch_token.cancel();
                            error!(%err, "persisting logs failed, stopping export");
                            return Err(err);
                        }
                        result => persisted = Some(result),
                    }
                }
                _ = heartbeat.tick() => {
                    let stats = self.fetcher.stats().snapshot();
                    info!(
                        logs = stats.total(),
                        first_block = stats.first_block(),
                        last_block = stats.last_block(),
                        "still retrieving logs..."
                    );
                }
            }
        };

        match outcome {
            Outcome::Completed => match join(persist, persisted).await {
                Ok(summary) => self.complete(summary).await,
                Err(err) if err.is_cancelled() => self.cancel(Err(err)).await,
                Err(err) => Err(err),
            },
            Outcome::Failed(err) => {
                if let Err(persist_err) = join(persist, persisted).await {
                    warn!(%persist_err, "persister stopped after fetch failure");
                }
                Err(err)
            }
            Outcome::Cancelled => {
                info!("export cancelled, waiting for logs to be saved...");
                let persisted = join(persist, persisted).await;
                self.cancel(persisted).await
            }
        }
    }

    async fn complete(&self, persisted: PersistSummary) -> Result<ExportSummary, Error> {
        let output = self.config.output.clone();
        info!(
            records = persisted.records,
            output = %output.display(),
            "all logs have been saved"
        );
        if let Some(last) = self.fetcher.stats().last_price_update() {
            info!(block = last.block_number(), "last price update");
        }

        let compressed = match self.config.compression {
            Some(algo) => Some(compress(algo, &output).await?),
            None => None,
        };

        Ok(ExportSummary {
            records: persisted.records,
            bytes: persisted.bytes,
            stats: self.fetcher.stats().snapshot(),
            output,
            compressed,
        })
    }

    /// Compresses whatever was persisted before the cancellation.
    async fn cancel(
        &self,
        persisted: Result<PersistSummary, Error>,
    ) -> Result<ExportSummary, Error> {
        match persisted {
            Ok(summary) => info!(records = summary.records, "all logs have been saved"),
            Err(err) if err.is_cancelled() => {}
            Err(err) => warn!(%err, "persister stopped with error"),
        }

        if let Some(algo) = self.config.compression
            && let Err(err) = compress(algo, &self.config.output).await
        {
            error!(%err, "failed to compress partial output");
        }
        Err(Error::Cancelled)
    }
}

/// Result of the persister task, which may already have been collected.
async fn join(
    persist: PersistHandle,
    persisted: Option<Result<PersistSummary, Error>>,
) -> Result<PersistSummary, Error> {
    match persisted {
        Some(result) => result,
        None => persist.await?,
    }
}

async fn compress(algo: Compression, input: &Path) -> Result<PathBuf, Error> {
    let input = input.to_path_buf();
    let output = algo.output_path(&input);
    let path = output.clone();
    let bytes = tokio::task::spawn_blocking(move || algo.compress_file(&input, &path)).await??;
    info!(%algo, bytes, output = %output.display(), "file compressed");
    Ok(output)
}
