use std::{fmt::Display, io, path::PathBuf};

use alloy::transports;

use crate::fetch::Chunk;

/// Terminal outcome of a failed or interrupted export.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("failed to retrieve logs for range {}-{}: {source}", .chunk.from(), .chunk.to())]
    ChunkQuery {
        chunk: Chunk,
        #[source]
        source: SourceError,
    },

    #[error("export cancelled")]
    Cancelled,

    #[error("persist error: {0}")]
    Persist(#[from] PersistError),

    #[error("compression error: {0}")]
    Compress(#[from] CompressError),

    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Error returned by the RPC log source.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SourceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unexpected empty RPC response")]
    NullResp,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed log: {0}")]
    MalformedLog(String),
}

impl<E: Display> From<transports::RpcError<E>> for SourceError {
    fn from(value: transports::RpcError<E>) -> Self {
        match value {
            transports::RpcError::ErrorResp(ref resp) => {
                let msg = resp.message.to_ascii_lowercase();
                if (resp.code == -32600 || resp.code == -32601 || resp.code == -32602)
                    && (msg.contains("invalid") || msg.contains("not found"))
                {
                    Self::InvalidRequest(msg)
                } else {
                    Self::Transport(value.to_string())
                }
            }
            transports::RpcError::NullResp => Self::NullResp,
            _ => Self::Transport(value.to_string()),
        }
    }
}

/// Failure to create or write the output file.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("error creating file {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error writing log: {0}")]
    Write(#[source] io::Error),

    #[error("error encoding log: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure of the post-export compression step.
#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    #[error("unsupported compression algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("failed to open input file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create output file {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to compress data: {0}")]
    Io(#[from] io::Error),
}
