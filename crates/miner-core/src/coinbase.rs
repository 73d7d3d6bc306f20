//! Fee accounting and coinbase transaction construction.
//!
//! The coinbase is the first transaction in a block. It has no inputs and a
//! single output paying the block subsidy plus every fee collected from the
//! block's transactions.

use crate::error::TemplateError;
use crate::transaction::{CoinbaseTransaction, Transaction, TxOutput};
use crate::validation::ValidTx;

/// Initial subsidy: 50 coins.
pub const INITIAL_SUBSIDY: u64 = 5_000_000_000;

/// Blocks between subsidy halvings.
pub const HALVING_INTERVAL: u32 = 210_000;

/// Calculate block subsidy in satoshis for a given height.
///
/// The subsidy halves every 210,000 blocks, starting at 50 BTC.
pub fn block_subsidy(height: u32) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    if halvings >= 64 {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}

/// Fee of a single transaction, `None` when outputs exceed inputs.
pub fn transaction_fee(tx: &Transaction) -> Option<u64> {
    tx.fee()
}

/// Sum of fees over validated transactions, `None` on overflow.
pub fn total_fees(valid: &[ValidTx]) -> Option<u64> {
    valid
        .iter()
        .try_fold(0u64, |acc, tx| acc.checked_add(tx.fee()))
}

/// Builder for constructing coinbase transactions.
#[derive(Debug, Clone)]
pub struct CoinbaseBuilder {
    /// Script the reward is paid to.
    payout_script: Vec<u8>,
    version: i32,
    locktime: u32,
}

impl CoinbaseBuilder {
    /// Create a new coinbase builder paying to `payout_script`.
    pub fn new(payout_script: Vec<u8>) -> Self {
        CoinbaseBuilder {
            payout_script,
            version: 1,
            locktime: 0,
        }
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn with_locktime(mut self, locktime: u32) -> Self {
        self.locktime = locktime;
        self
    }

    /// Build the coinbase paying `subsidy` plus the fees of `valid`.
    ///
    /// Pure: the same inputs always give the same transaction.
    pub fn build(
        &self,
        subsidy: u64,
        valid: &[ValidTx],
    ) -> Result<CoinbaseTransaction, TemplateError> {
        let reward = total_fees(valid)
            .and_then(|fees| fees.checked_add(subsidy))
            .ok_or(TemplateError::RewardOverflow)?;

        Ok(CoinbaseTransaction {
            version: self.version,
            output: TxOutput {
                value: reward,
                script_pubkey: self.payout_script.clone(),
            },
            locktime: self.locktime,
        })
    }
}

/// Build a coinbase with default version and locktime.
pub fn build_coinbase(
    valid: &[ValidTx],
    subsidy: u64,
    payout_script: &[u8],
) -> Result<CoinbaseTransaction, TemplateError> {
    CoinbaseBuilder::new(payout_script.to_vec()).build(subsidy, valid)
}
