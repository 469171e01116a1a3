use alloy::primitives::Address;

use super::BlockNumber;
use crate::error::Error;

/// Block range of contract logs to export.
///
/// An `end_block` of 0 stands for the chain head, resolved once when the
/// fetch starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    address: Address,
    start_block: BlockNumber,
    end_block: BlockNumber,
}

impl FetchRequest {
    pub fn new(address: Address, start_block: BlockNumber, end_block: BlockNumber) -> Self {
        Self {
            address,
            start_block,
            end_block,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn start_block(&self) -> BlockNumber {
        self.start_block
    }

    pub fn end_block(&self) -> BlockNumber {
        self.end_block
    }

    /// Whether the end of the range has to be resolved to the chain head.
    pub fn ends_at_head(&self) -> bool {
        self.end_block == 0
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.address.is_zero() {
            return Err(Error::Validation("contract address is required".to_string()));
        }
        Ok(())
    }

    /// Inclusive block range with the end resolved against `head`.
    pub(crate) fn resolve(&self, head: BlockNumber) -> Result<(BlockNumber, BlockNumber), Error> {
        let end = if self.ends_at_head() {
            head
        } else {
            self.end_block
        };
        if self.start_block > end {
            return Err(Error::Validation(format!(
                "start block ({}) cannot be greater than end block ({end})",
                self.start_block
            )));
        }
        Ok((self.start_block, end))
    }
}
