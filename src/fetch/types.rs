//! Fetch output streams.

use futures::{Stream, stream};
use tokio::sync::mpsc;

use crate::{error::Error, types::LogEntry};

/// Receiver of fetched logs, closed once the fetch terminates.
#[derive(Debug)]
pub struct LogReceiver {
    inner: mpsc::Receiver<LogEntry>,
}

impl LogReceiver {
    pub(crate) fn new(inner: mpsc::Receiver<LogEntry>) -> Self {
        Self { inner }
    }

    /// Receives the next log, or `None` if the stream is closed.
    pub async fn recv(&mut self) -> Option<LogEntry> {
        self.inner.recv().await
    }

    /// Number of logs buffered and not received yet.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn into_stream(self) -> impl Stream<Item = LogEntry> {
        stream::unfold(self, |mut rx| async move {
            let log = rx.recv().await?;
            Some((log, rx))
        })
    }
}

/// Receiver of the terminal fetch error.
///
/// Yields at most one error. Closed without an error when the fetch
/// completed.
#[derive(Debug)]
pub struct ErrorReceiver {
    inner: mpsc::Receiver<Error>,
}

impl ErrorReceiver {
    pub(crate) fn new(inner: mpsc::Receiver<Error>) -> Self {
        Self { inner }
    }

    pub async fn recv(&mut self) -> Option<Error> {
        self.inner.recv().await
    }
}
