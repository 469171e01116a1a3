//! Error types for the batch export tool.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Export error: {0}")]
    Export(#[from] batch_export::error::Error),

    #[error("No postage stamp deployment known for chain ID {0}, use --address and --start")]
    UnknownChain(u64),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Export(err) if err.is_cancelled())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
