use alloy::{
    primitives::{Address, B256, BlockHash, Bytes, TxHash},
    rpc::types::Log,
};
use serde::{Deserialize, Serialize};

use super::BlockNumber;
use crate::error::SourceError;

/// Contract event log as exported, one per output line.
///
/// Logs are produced by the source and never modified afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    block_number: BlockNumber,
    transaction_hash: TxHash,
    transaction_index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    block_hash: Option<BlockHash>,
    log_index: u64,
    #[serde(default)]
    removed: bool,
}

impl LogEntry {
    pub fn new(
        address: Address,
        block_number: BlockNumber,
        transaction_hash: TxHash,
        log_index: u64,
        topics: Vec<B256>,
        data: Bytes,
    ) -> Self {
        Self {
            address,
            topics,
            data,
            block_number,
            transaction_hash,
            transaction_index: 0,
            block_hash: None,
            log_index,
            removed: false,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn block_number(&self) -> BlockNumber {
        self.block_number
    }

    pub fn block_hash(&self) -> Option<BlockHash> {
        self.block_hash
    }

    pub fn transaction_hash(&self) -> TxHash {
        self.transaction_hash
    }

    pub fn transaction_index(&self) -> u64 {
        self.transaction_index
    }

    pub fn log_index(&self) -> u64 {
        self.log_index
    }

    /// Topic hashes, the first one identifies the event.
    pub fn topics(&self) -> &[B256] {
        &self.topics
    }

    /// ABI-encoded non-indexed event arguments.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn removed(&self) -> bool {
        self.removed
    }
}

impl TryFrom<Log> for LogEntry {
    type Error = SourceError;

    /// Pending logs lack the block context and are rejected.
    fn try_from(log: Log) -> Result<Self, Self::Error> {
        let block_number = log
            .block_number
            .ok_or_else(|| SourceError::MalformedLog("missing block number".to_string()))?;
        let transaction_hash = log
            .transaction_hash
            .ok_or_else(|| SourceError::MalformedLog("missing transaction hash".to_string()))?;
        let log_index = log
            .log_index
            .ok_or_else(|| SourceError::MalformedLog("missing log index".to_string()))?;
        let (topics, data) = log.inner.data.split();
        Ok(Self {
            address: log.inner.address,
            topics,
            data,
            block_number,
            transaction_hash,
            transaction_index: log.transaction_index.unwrap_or_default(),
            block_hash: log.block_hash,
            log_index,
            removed: log.removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{LogData, address, b256, bytes};

    use super::*;

    fn rpc_log() -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: address!("0x1111111111111111111111111111111111111111"),
                data: LogData::new_unchecked(
                    vec![b256!(
                        "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
                    )],
                    bytes!("0x0102"),
                ),
            },
            block_hash: None,
            block_number: Some(50),
            block_timestamp: None,
            transaction_hash: Some(b256!(
                "0xbeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee"
            )),
            transaction_index: Some(3),
            log_index: Some(7),
            removed: false,
        }
    }

    #[test]
    fn test_from_rpc_log() {
        let entry = LogEntry::try_from(rpc_log()).unwrap();
        assert_eq!(entry.block_number(), 50);
        assert_eq!(entry.transaction_index(), 3);
        assert_eq!(entry.log_index(), 7);
        assert_eq!(entry.topics().len(), 1);
        assert_eq!(entry.data(), &bytes!("0x0102"));
    }

    #[test]
    fn test_pending_log_rejected() {
        let mut log = rpc_log();
        log.block_number = None;
        assert!(matches!(
            LogEntry::try_from(log),
            Err(SourceError::MalformedLog(_))
        ));
    }

    #[test]
    fn test_json_line_layout() {
        let entry = LogEntry::try_from(rpc_log()).unwrap();
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["address"], "0x1111111111111111111111111111111111111111");
        assert_eq!(json["blockNumber"], 50);
        assert_eq!(json["logIndex"], 7);
        assert_eq!(json["data"], "0x0102");
        assert_eq!(json["removed"], false);
        assert!(json.get("blockHash").is_none());

        let line = serde_json::to_string(&entry).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(serde_json::from_str::<LogEntry>(&line).unwrap(), entry);
    }
}
