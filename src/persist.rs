//! NDJSON persistence of the log stream.

use std::path::Path;

use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::{Error, PersistError},
    fetch::LogReceiver,
    types::LogEntry,
};

/// Records and bytes written by a [`StreamPersister`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub records: u64,
    pub bytes: u64,
}

/// Writes every received log as one JSON object per line.
///
/// Each line is written and flushed before the next log is received, so a
/// log taken off the stream is never lost or half-written, even on
/// cancellation.
#[derive(derive_more::Debug)]
pub struct StreamPersister<W> {
    #[debug(skip)]
    writer: W,
    summary: PersistSummary,
}

impl StreamPersister<File> {
    /// Creates the output file, truncating any previous content.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref();
        let file = File::create(path)
            .await
            .map_err(|source| PersistError::Create {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(file))
    }
}

impl<W: AsyncWrite + Unpin> StreamPersister<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            summary: PersistSummary::default(),
        }
    }

    /// Drains `logs` into the sink until the stream closes.
    ///
    /// Fails with [`Error::Cancelled`] if the token fires first, every log
    /// received up to that point has been written.
    pub async fn run(
        mut self,
        token: CancellationToken,
        mut logs: LogReceiver,
    ) -> Result<PersistSummary, Error> {
        loop {
            let log = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(records = self.summary.records, "persisting cancelled");
                    return Err(Error::Cancelled);
                }
                log = logs.recv() => log,
            };
            let Some(log) = log else {
                debug!(records = self.summary.records, "log stream closed");
                return Ok(self.summary);
            };
            self.write(&log).await?;
        }
    }

    /// Appends a single log line.
    pub async fn write(&mut self, log: &LogEntry) -> Result<(), PersistError> {
        let mut line = serde_json::to_vec(log)?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(PersistError::Write)?;
        self.writer.flush().await.map_err(PersistError::Write)?;
        self.summary.records += 1;
        self.summary.bytes += line.len() as u64;
        Ok(())
    }

    pub fn summary(&self) -> PersistSummary {
        self.summary
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
