// Block Size Limits
// =================
//
// Governance can change the block size while the node runs. The derived
// limits are kept together in one owned value and only change through
// `update_block_size`, so every reader sees a consistent set.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::constants::WITNESS_SCALE_FACTOR;

/// Block size in bytes before any governance update.
pub const DEFAULT_BLOCK_SIZE: u32 = 2_000_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimitsError {
    #[error("block size must be non-zero")]
    ZeroBlockSize,
    #[error("block size {0} overflows the scaled limits")]
    Overflow(u32),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSizeLimits {
    pub witness_scale_factor: u64,
    pub max_block_size: u32,
    /// The maximum allowed size for a serialized block, in bytes (only for buffer size limits)
    pub max_block_ser_size: u64,
    /// The maximum allowed weight for a block, see BIP-141 (network rule)
    pub max_block_weight: u64,
    pub max_block_sigops: u64,
    pub max_tx_sigops: u64,
    pub max_proto_msg_length: u64,
}

impl BlockSizeLimits {
    pub fn new(witness_scale_factor: u64) -> Self {
        let mut limits = Self {
            witness_scale_factor,
            max_block_size: 0,
            max_block_ser_size: 0,
            max_block_weight: 0,
            max_block_sigops: 0,
            max_tx_sigops: 0,
            max_proto_msg_length: 0,
        };
        limits.apply(DEFAULT_BLOCK_SIZE, witness_scale_factor * u64::from(DEFAULT_BLOCK_SIZE));
        limits
    }

    pub fn update_block_size(&mut self, new_block_size: u32) -> Result<(), LimitsError> {
        if new_block_size == 0 {
            return Err(LimitsError::ZeroBlockSize);
        }
        let scaled = self
            .witness_scale_factor
            .checked_mul(u64::from(new_block_size))
            .ok_or(LimitsError::Overflow(new_block_size))?;
        self.apply(new_block_size, scaled);
        info!(
            block_size = new_block_size,
            max_block_weight = self.max_block_weight,
            "updated block size limits"
        );
        Ok(())
    }

    fn apply(&mut self, block_size: u32, scaled: u64) {
        self.max_block_size = block_size;
        self.max_block_ser_size = scaled;
        self.max_block_weight = scaled;
        self.max_block_sigops = scaled / 50;
        self.max_tx_sigops = self.max_block_sigops / 5;
        self.max_proto_msg_length = scaled;
    }

    /// 60 is the lower bound for the size of a valid serialized transaction
    pub fn min_transaction_weight(&self) -> u64 {
        self.witness_scale_factor * 60
    }

    /// 10 is the lower bound for the size of a serialized transaction
    pub fn min_serializable_transaction_weight(&self) -> u64 {
        self.witness_scale_factor * 10
    }
}

impl Default for BlockSizeLimits {
    fn default() -> Self {
        Self::new(WITNESS_SCALE_FACTOR)
    }
}
