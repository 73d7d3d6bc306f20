//! Core logic for building and mining a proof-of-work block template.
//!
//! This crate provides pure Rust implementations of:
//! - Mempool transaction records, decoding and validation
//! - Legacy ECDSA signature verification (P2PKH and P2PK)
//! - Fee accounting and coinbase construction
//! - Merkle root computation and inclusion proofs
//! - Difficulty target conversion and numeric comparison
//! - Block header construction and a parallel, cancellable nonce search
//! - Rendering of the solved block

pub mod block;
pub mod coinbase;
pub mod difficulty;
pub mod encode;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod miner;
pub mod report;
pub mod signature;
pub mod stats;
pub mod transaction;
pub mod validation;

pub use block::{BlockHeader, BlockTemplate, TemplateParams};
pub use coinbase::{block_subsidy, build_coinbase, CoinbaseBuilder};
pub use difficulty::{bits_to_target, hash_meets_target, Target};
pub use error::{
    DifficultyError, MineError, MinerError, RejectionReason, Result, SignatureError,
    TemplateError,
};
pub use hash::{double_sha256, Hash256};
pub use merkle::{compute_merkle_root, MerkleProof, MerkleTree};
pub use miner::{CancelToken, HashCounter, Miner, Solution};
pub use report::BlockReport;
pub use signature::{EcdsaVerifier, SignatureVerifier, SkipVerification};
pub use stats::MiningStats;
pub use transaction::{CoinbaseTransaction, Transaction, TxRecord};
pub use validation::{ValidTx, ValidationReport, Validator};
