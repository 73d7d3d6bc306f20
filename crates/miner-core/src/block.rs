//! Block header construction and block template assembly.

use crate::coinbase::{total_fees, CoinbaseBuilder};
use crate::difficulty::Target;
use crate::encode::{write_varint, Encodable};
use crate::error::TemplateError;
use crate::hash::{double_sha256, Hash256};
use crate::merkle::compute_merkle_root;
use crate::transaction::{BlockTransaction, CoinbaseTransaction};
use crate::validation::ValidTx;

/// Block version with BIP9 versionbits.
pub const BLOCK_VERSION: i32 = 0x20000000;

/// Size of a block header in bytes.
pub const BLOCK_HEADER_SIZE: usize = 80;

/// A block header (80 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    /// Hash of the previous block (internal byte order).
    pub prev_block_hash: Hash256,
    /// Merkle root of all transactions.
    pub merkle_root: Hash256,
    /// Block timestamp (Unix time).
    pub timestamp: u32,
    /// Difficulty target in compact "bits" format.
    pub bits: u32,
    /// Nonce for proof of work.
    pub nonce: u32,
}

impl BlockHeader {
    /// Create a new block header with nonce 0.
    pub fn new(
        version: i32,
        prev_block_hash: Hash256,
        merkle_root: Hash256,
        timestamp: u32,
        bits: u32,
    ) -> Self {
        BlockHeader {
            version,
            prev_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce: 0,
        }
    }

    /// Serialize the block header to 80 bytes.
    pub fn serialize(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        header[..76].copy_from_slice(&self.serialize_without_nonce());
        header[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        header
    }

    /// Serialize the header without the nonce (76 bytes).
    /// Used for efficient mining where we only change the nonce.
    pub fn serialize_without_nonce(&self) -> [u8; 76] {
        let mut header = [0u8; 76];

        header[0..4].copy_from_slice(&self.version.to_le_bytes());
        header[4..36].copy_from_slice(&self.prev_block_hash);
        header[36..68].copy_from_slice(&self.merkle_root);
        header[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        header[72..76].copy_from_slice(&self.bits.to_le_bytes());

        header
    }

    /// Compute the block hash (double SHA256).
    pub fn hash(&self) -> Hash256 {
        double_sha256(&self.serialize())
    }
}

impl Encodable for BlockHeader {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.serialize());
    }
}

/// Fixed header fields chosen before assembly.
#[derive(Debug, Clone, Copy)]
pub struct TemplateParams {
    pub version: i32,
    pub prev_block_hash: Hash256,
    pub timestamp: u32,
    /// Target the header hash must meet; the header carries its compact form.
    pub target: Target,
}

/// A complete block template ready for mining.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// Header with nonce 0 and the final merkle root.
    pub header: BlockHeader,
    /// Target the search compares against: exactly what `header.bits`
    /// expands to.
    pub target: Target,
    pub coinbase: CoinbaseTransaction,
    /// Validated transactions in acceptance order.
    pub transactions: Vec<ValidTx>,
}

impl BlockTemplate {
    /// Assemble a template around an already built coinbase.
    ///
    /// The coinbase comes first, then `transactions` in the given order.
    /// The merkle root is computed here, once. The requested target is
    /// rounded down to what the header's compact bits can express, so every
    /// solution is valid under its own header.
    pub fn assemble(
        params: TemplateParams,
        coinbase: CoinbaseTransaction,
        transactions: Vec<ValidTx>,
    ) -> Self {
        let txids: Vec<Hash256> = std::iter::once(coinbase.txid())
            .chain(transactions.iter().map(ValidTx::txid))
            .collect();
        let merkle_root = compute_merkle_root(&txids);
        let bits = params.target.to_compact();

        let header = BlockHeader::new(
            params.version,
            params.prev_block_hash,
            merkle_root,
            params.timestamp,
            bits,
        );

        BlockTemplate {
            header,
            target: params.target.to_representable(),
            coinbase,
            transactions,
        }
    }

    /// Build the coinbase for `transactions` and assemble the template.
    pub fn build(
        params: TemplateParams,
        coinbase_builder: &CoinbaseBuilder,
        subsidy: u64,
        transactions: Vec<ValidTx>,
    ) -> Result<Self, TemplateError> {
        let coinbase = coinbase_builder.build(subsidy, &transactions)?;
        Ok(Self::assemble(params, coinbase, transactions))
    }

    /// Fees collected by the template's transactions.
    pub fn total_fees(&self) -> u64 {
        // The coinbase build already proved this sum fits.
        total_fees(&self.transactions).unwrap_or(u64::MAX)
    }

    /// Transaction ids in block order, coinbase first.
    pub fn txids(&self) -> Vec<Hash256> {
        std::iter::once(self.coinbase.txid())
            .chain(self.transactions.iter().map(ValidTx::txid))
            .collect()
    }

    /// Transactions in block order, coinbase first.
    pub fn block_transactions(&self) -> Vec<BlockTransaction> {
        std::iter::once(BlockTransaction::Coinbase(self.coinbase.clone()))
            .chain(
                self.transactions
                    .iter()
                    .map(|valid| BlockTransaction::Regular(valid.transaction().clone())),
            )
            .collect()
    }

    /// Serialize the complete block: header, count, transactions.
    pub fn serialize_block(&self) -> Vec<u8> {
        let mut block = Vec::with_capacity(BLOCK_HEADER_SIZE + 256);
        self.header.encode_to(&mut block);
        write_varint((self.transactions.len() + 1) as u64, &mut block);
        self.coinbase.encode_to(&mut block);
        for valid in &self.transactions {
            valid.transaction().encode_to(&mut block);
        }
        block
    }
}

/// Get the current Unix timestamp, saturating at `u32::MAX` after 2106.
pub fn current_timestamp() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| header_timestamp(d.as_secs()))
        .unwrap_or(0)
}

fn header_timestamp(secs: u64) -> u32 {
    u32::try_from(secs).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::merkle_root;
    use crate::miner::{CancelToken, Miner};
    use crate::signature::SkipVerification;
    use crate::transaction::{Transaction, TxInput, TxOutput, SEQUENCE_FINAL};
    use crate::validation::Validator;

    fn params() -> TemplateParams {
        TemplateParams {
            version: BLOCK_VERSION,
            prev_block_hash: [0x12; 32],
            timestamp: 1_700_000_000,
            target: Target::from_compact(0x1d00ffff).unwrap(),
        }
    }

    fn valid(prev: u8, fee: u64) -> ValidTx {
        let tx = Transaction {
            version: 1,
            inputs: vec![TxInput {
                prev_txid: [prev; 32],
                prev_index: 0,
                script_sig: Vec::new(),
                sequence: SEQUENCE_FINAL,
                prevout: TxOutput { value: 1_000 + fee, script_pubkey: vec![0x51] },
            }],
            outputs: vec![TxOutput { value: 1_000, script_pubkey: vec![0x51] }],
            locktime: 0,
        };
        Validator::new(SkipVerification).validate_transaction(tx).unwrap()
    }

    #[test]
    fn test_block_header_serialization() {
        let prev_hash = [0x12u8; 32];
        let merkle_root = [0x34u8; 32];

        let mut header = BlockHeader::new(BLOCK_VERSION, prev_hash, merkle_root, 1700000000, 0x17034219);
        header.nonce = 0xDEADBEEF;

        let serialized = header.serialize();

        // Verify version (0x20000000 in little-endian)
        assert_eq!(&serialized[0..4], &[0x00, 0x00, 0x00, 0x20]);
        assert_eq!(&serialized[4..36], &prev_hash[..]);
        assert_eq!(&serialized[36..68], &merkle_root[..]);
        assert_eq!(&serialized[72..76], &0x17034219u32.to_le_bytes());

        // Verify nonce (0xDEADBEEF in little-endian)
        assert_eq!(&serialized[76..80], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(&serialized[..76], &header.serialize_without_nonce()[..]);
        assert_eq!(header.encoded(), serialized.to_vec());
    }

    #[test]
    fn test_nonce_changes_hash() {
        let mut header = BlockHeader::new(1, [0u8; 32], [0u8; 32], 0, 0x1d00ffff);
        let before = header.hash();
        header.nonce = 1;
        assert_ne!(before, header.hash());
    }

    #[test]
    fn test_coinbase_only_template() {
        let builder = CoinbaseBuilder::new(vec![0x51]);
        let template = BlockTemplate::build(params(), &builder, 2_500_000, Vec::new()).unwrap();

        assert_eq!(template.header.merkle_root, template.coinbase.txid());
        assert_eq!(template.header.bits, 0x1d00ffff);
        assert_eq!(template.header.nonce, 0);
        assert_eq!(template.coinbase.value(), 2_500_000);
        assert_eq!(template.total_fees(), 0);
    }

    #[test]
    fn test_solution_is_valid_under_header_bits() {
        let builder = CoinbaseBuilder::new(vec![0x51]);
        for target in [Target::MAX, format!("0{}", "f".repeat(63)).parse().unwrap()] {
            let template = BlockTemplate::build(
                TemplateParams { target, ..params() },
                &builder,
                50,
                Vec::new(),
            )
            .unwrap();
            let from_bits = Target::from_compact(template.header.bits).unwrap();
            assert_eq!(template.target, from_bits);
            assert!(template.target <= target);

            let solution = Miner::new(2)
                .mine(&template.header, &template.target, &CancelToken::new())
                .unwrap();
            let mut solved = template.header;
            solution.apply(&mut solved);
            assert!(from_bits.is_met_by(&solved.hash()));
        }
    }

    #[test]
    fn test_timestamp_saturates() {
        assert_eq!(header_timestamp(1_700_000_000), 1_700_000_000);
        assert_eq!(header_timestamp(u32::MAX as u64), u32::MAX);
        assert_eq!(header_timestamp(u32::MAX as u64 + 1), u32::MAX);
        assert!(current_timestamp() > 1_600_000_000);
    }

    #[test]
    fn test_template_orders_coinbase_first() {
        let builder = CoinbaseBuilder::new(vec![0x51]);
        let txs = vec![valid(1, 100), valid(2, 200)];
        let template = BlockTemplate::build(params(), &builder, 2_500_000, txs.clone()).unwrap();

        assert_eq!(template.coinbase.value(), 2_500_300);
        assert_eq!(template.total_fees(), 300);

        let txids = template.txids();
        assert_eq!(txids[0], template.coinbase.txid());
        assert_eq!(txids[1], txs[0].txid());
        assert_eq!(txids[2], txs[1].txid());

        let block_txs = template.block_transactions();
        assert!(block_txs[0].is_coinbase());
        assert_eq!(merkle_root(&block_txs), template.header.merkle_root);
    }

    #[test]
    fn test_serialize_block() {
        let builder = CoinbaseBuilder::new(vec![0x51]);
        let template =
            BlockTemplate::build(params(), &builder, 50, vec![valid(1, 10)]).unwrap();

        let block = template.serialize_block();
        assert_eq!(&block[..80], &template.header.serialize()[..]);
        assert_eq!(block[80], 2);
        let coinbase = template.coinbase.encoded();
        assert_eq!(&block[81..81 + coinbase.len()], &coinbase[..]);
    }
}
