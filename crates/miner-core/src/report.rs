//! Text rendering of a mined block.
//!
//! Layout, one item per line:
//!
//! ```text
//! encoding: 1
//! version: 20000000
//! prev_block_hash: <64 hex>
//! merkle_root: <64 hex>
//! timestamp: <8 hex>
//! bits: <8 hex>
//! nonce: <8 hex>
//! hash: <64 hex>
//! header: <160 hex>
//! coinbase: <hex>
//! txids: <count>
//! <txid>
//! ...
//! ```
//!
//! Integer fields are big-endian hex of their value. Header hashes are the
//! bytes as they appear in the header, and `hash` is the digest in the order
//! it is compared against the target. Txids use display (reversed) order,
//! coinbase first.

use std::fmt;

use crate::block::{BlockHeader, BlockTemplate};
use crate::encode::ENCODING_VERSION;
use crate::hash::{txid_to_display_hex, Hash256};
use crate::miner::Solution;

/// A solved block ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReport {
    pub header: BlockHeader,
    pub hash: Hash256,
    pub coinbase_hex: String,
    /// Txids in block order, coinbase first.
    pub txids: Vec<Hash256>,
}

impl BlockReport {
    /// Combine a template with the solution found for its header.
    pub fn new(template: &BlockTemplate, solution: &Solution) -> Self {
        let mut header = template.header;
        solution.apply(&mut header);

        BlockReport {
            header,
            hash: solution.hash,
            coinbase_hex: template.coinbase.serialize_hex(),
            txids: template.txids(),
        }
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = &self.header;
        writeln!(f, "encoding: {}", ENCODING_VERSION)?;
        writeln!(f, "version: {:08x}", header.version as u32)?;
        writeln!(f, "prev_block_hash: {}", hex::encode(header.prev_block_hash))?;
        writeln!(f, "merkle_root: {}", hex::encode(header.merkle_root))?;
        writeln!(f, "timestamp: {:08x}", header.timestamp)?;
        writeln!(f, "bits: {:08x}", header.bits)?;
        writeln!(f, "nonce: {:08x}", header.nonce)?;
        writeln!(f, "hash: {}", hex::encode(self.hash))?;
        writeln!(f, "header: {}", hex::encode(header.serialize()))?;
        writeln!(f, "coinbase: {}", self.coinbase_hex)?;
        writeln!(f, "txids: {}", self.txids.len())?;
        for txid in &self.txids {
            writeln!(f, "{}", txid_to_display_hex(txid))?;
        }
        Ok(())
    }
}
