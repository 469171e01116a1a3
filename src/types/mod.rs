mod log;
mod request;

pub use log::LogEntry;
pub use request::FetchRequest;

/// Block number on the source chain.
pub type BlockNumber = u64;
