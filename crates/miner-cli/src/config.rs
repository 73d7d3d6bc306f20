//! Run configuration.
//!
//! Loaded from a TOML file, then overridden by command-line flags. Every
//! field has a default, so an empty file (or no file) is a valid config.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use miner_core::block::{current_timestamp, BLOCK_VERSION};
use miner_core::coinbase::block_subsidy;
use miner_core::hash::{txid_from_display_hex, Hash256};
use miner_core::{MinerError, Target};
use serde::{Deserialize, Serialize};

/// Target used when neither `target` nor `bits` is configured.
pub const DEFAULT_TARGET: &str =
    "0000ffff00000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MinerConfig {
    pub mempool: MempoolConfig,
    pub output: OutputConfig,
    pub block: BlockConfig,
    pub mining: MiningConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MempoolConfig {
    /// Directory of `*.json` transaction records.
    pub dir: PathBuf,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        MempoolConfig {
            dir: PathBuf::from("./mempool"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Where the block report is written.
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            path: PathBuf::from("./output.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockConfig {
    pub version: i32,
    /// Previous block hash in display (reversed) order.
    pub prev_block_hash: String,
    /// Header timestamp; the current time when unset.
    pub timestamp: Option<u32>,
    /// Height used to derive the subsidy when `subsidy` is unset.
    pub height: u32,
    pub subsidy: Option<u64>,
    /// Hex script the coinbase pays to.
    pub payout_script: String,
    /// Full target as 64 hex digits.
    pub target: Option<String>,
    /// Compact target. Mutually exclusive with `target`.
    pub bits: Option<u32>,
}

impl Default for BlockConfig {
    fn default() -> Self {
        BlockConfig {
            version: BLOCK_VERSION,
            prev_block_hash: "00".repeat(32),
            timestamp: None,
            height: 0,
            subsidy: None,
            // OP_TRUE
            payout_script: "51".to_string(),
            target: None,
            bits: None,
        }
    }
}

impl BlockConfig {
    pub fn target(&self) -> Result<Target, MinerError> {
        match (&self.target, self.bits) {
            (Some(_), Some(_)) => Err(MinerError::InvalidParameter {
                field: "block.target",
                reason: "set either target or bits, not both".to_string(),
            }),
            (Some(value), None) => Ok(Target::from_hex(value)?),
            (None, Some(bits)) => Ok(Target::from_compact(bits)?),
            (None, None) => Ok(Target::from_hex(DEFAULT_TARGET)?),
        }
    }

    /// Previous block hash in internal byte order.
    pub fn prev_block_hash(&self) -> Result<Hash256, MinerError> {
        txid_from_display_hex(&self.prev_block_hash).map_err(|err| MinerError::InvalidParameter {
            field: "block.prev_block_hash",
            reason: err.to_string(),
        })
    }

    pub fn payout_script(&self) -> Result<Vec<u8>, MinerError> {
        hex::decode(&self.payout_script).map_err(|err| MinerError::InvalidParameter {
            field: "block.payout_script",
            reason: err.to_string(),
        })
    }

    pub fn subsidy(&self) -> u64 {
        self.subsidy.unwrap_or_else(|| block_subsidy(self.height))
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp.unwrap_or_else(current_timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MiningConfig {
    /// Worker threads; all available cores when unset.
    pub workers: Option<usize>,
    pub max_timestamp_rolls: u32,
    /// Cancel the search after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        MiningConfig {
            workers: None,
            max_timestamp_rolls: miner_core::miner::DEFAULT_MAX_TIMESTAMP_ROLLS,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Check input signatures. Turn off for mempool dumps without real ones.
    pub verify_signatures: bool,
    /// Fail instead of mining a coinbase-only block.
    pub require_transactions: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            verify_signatures: true,
            require_transactions: false,
        }
    }
}

impl MinerConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }
}
